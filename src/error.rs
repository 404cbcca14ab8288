//! Error types shared across the analysis pipeline.

use thiserror::Error;

/// Failures while reading and parsing a ride-data ingest file.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("ingest source not found: {0}")]
    NotFound(String),

    #[error("ingest source contained no usable lines")]
    Empty,

    #[error("io error reading ingest source: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while aligning runs across laps (not enough matching laps/runs
/// survived clustering and gating to proceed with a protocol).
#[derive(Debug, Error)]
pub enum AlignError {
    #[error("{stage}: need at least {required} usable runs, found {found}")]
    InsufficientRuns {
        stage: &'static str,
        required: usize,
        found: usize,
    },
}

/// Internal regression failures. `regress` never returns these to its
/// caller; it encodes them into a `RegressionResult` instead.
#[derive(Debug, Error)]
pub enum RegressionError {
    #[error("quadratic fit is singular")]
    SingularFit,

    #[error("vertex falls outside the sampled pressure range")]
    InvalidVertex,
}

/// Failures reading or writing the persisted route-signature store. These
/// are never propagated out of the store's public functions; the store logs
/// and degrades to "no signature" / "store unchanged" instead.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signature store io error: {0}")]
    Io(#[from] rusqlite::Error),

    #[error("signature store contained malformed data: {0}")]
    Parse(String),
}

/// Top-level error for the pipeline facade.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Align(#[from] AlignError),

    #[error(transparent)]
    Signature(#[from] SignatureError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_runs_names_stage_and_counts() {
        let err = AlignError::InsufficientRuns {
            stage: "constant_power",
            required: 3,
            found: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("constant_power"));
        assert!(msg.contains('3'));
        assert!(msg.contains('1'));
    }

    #[test]
    fn core_error_wraps_ingest_error() {
        let err: CoreError = IngestError::Empty.into();
        assert!(matches!(err, CoreError::Ingest(IngestError::Empty)));
    }
}
