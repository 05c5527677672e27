//! Error types for the run pipeline.
//!
//! Everything in [`RunError`] is a broken contract with a collaborator (the
//! store, the filesystem, or the external script's output). Failures the
//! pipeline is expected to report back to the user travel inside the
//! output envelope as [`crate::model::AnalysisError`] instead.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{ActiveTurn, AnalysisId};

#[derive(Debug, Error)]
pub enum RunError {
    /// No analysis record exists for the requested id.
    #[error("analysis not found: {0}")]
    AnalysisNotFound(AnalysisId),

    /// The analysis configuration lacks the `python.project` entry.
    #[error("malformed analysis config: {0}")]
    MalformedConfig(String),

    /// A read or write against the durable store failed.
    #[error("database error: {0}")]
    Database(String),

    /// The requested turn does not exist in the conversation record.
    #[error("turn {turn} is out of range for a conversation with {len} messages")]
    TurnOutOfRange { turn: ActiveTurn, len: usize },

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The relocated text artifact could not be read back.
    #[error("failed to read text artifact {}: {source}", path.display())]
    UnreadableText {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The relocated structured artifact is not a JSON object.
    #[error("failed to decode JSON artifact {}: {source}", path.display())]
    MalformedData {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for run pipeline operations.
pub type RunResult<T> = Result<T, RunError>;

impl RunError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<surrealdb::Error> for RunError {
    fn from(err: surrealdb::Error) -> Self {
        Self::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let id: AnalysisId = "6f1c2a8e-3b7d-4a52-9c1e-0d4b2f7a9e31".parse().unwrap();
        let err = RunError::AnalysisNotFound(id);
        assert_eq!(
            err.to_string(),
            "analysis not found: 6f1c2a8e-3b7d-4a52-9c1e-0d4b2f7a9e31"
        );

        let err = RunError::TurnOutOfRange {
            turn: ActiveTurn::new(2),
            len: 1,
        };
        assert_eq!(
            err.to_string(),
            "turn 2 is out of range for a conversation with 1 messages"
        );
    }

    #[test]
    fn test_io_error_keeps_source() {
        use std::error::Error as _;

        let err = RunError::io(
            "/tmp/missing",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/missing"));
        assert!(err.source().is_some());
    }
}
