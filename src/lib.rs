//! TireTune - tire-pressure optimization analysis core for cycling ride data
//!
//! Reduces constant-power, lap-efficiency, and coast-down ride recordings to
//! a recommended front/rear tire pressure per bike type, with a confidence
//! tag and a persisted per-location rolling-resistance baseline.

pub mod align;
pub mod coastdown;
pub mod confidence;
pub mod config;
pub mod energy;
pub mod error;
pub mod geodesy;
pub mod ingest;
pub mod protocol;
pub mod regression;
pub mod result;
pub mod segments;
pub mod signature;

pub use config::{AnalysisConfig, BikeType, PressureUnit};
pub use error::CoreError;
pub use ingest::{ingest, IngestedSession};
pub use protocol::Pipeline;
pub use result::{AnalysisResult, Protocol, RecommendedPressures};
