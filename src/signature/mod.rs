//! Learns and persists per-location route signatures used to sanity-check
//! coast-down validation against a site's historical envelope.

pub mod store;

pub use store::{RouteSignature, SignatureEnvelope, SignatureStore};
