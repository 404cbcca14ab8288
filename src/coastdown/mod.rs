//! Coast-down window detection and gate trimming.

pub mod extractor;
pub mod trim;

pub use extractor::{extract, find_end, find_start, validate, CoastDescent, ValidationFailure};
pub use trim::{trim_to_gate, DescentSegment};
