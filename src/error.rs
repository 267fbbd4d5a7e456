// Typed errors crossing component boundaries. Internal I/O uses anyhow.

use std::path::PathBuf;
use thiserror::Error;

/// Worker could not be started. Fatal at startup.
#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("worker path {} is not a directory", .0.display())]
    InvalidWorkerPath(PathBuf),

    #[error("worker manifest {} not found", .0.display())]
    ManifestMissing(PathBuf),

    #[error("failed to read worker manifest {}: {source}", .path.display())]
    ManifestUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("worker manifest {} is invalid: {source}", .path.display())]
    ManifestInvalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to launch worker: {0}")]
    Launch(#[from] std::io::Error),
}

/// Client-facing query failures; each maps to an HTTP status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("History for {0} is not yet available")]
    NotYetAvailable(String),

    #[error("No history found for {0}")]
    NotFound(String),

    #[error("Invalid date '{0}', expected DD-MM-YYYY")]
    InvalidDate(String),

    #[error("History for {0} could not be read")]
    Corrupted(String),

    #[error("Service is not currently running")]
    ServiceUnavailable,
}

impl QueryError {
    pub fn status(&self) -> u16 {
        match self {
            QueryError::NotYetAvailable(_) => 425,
            QueryError::NotFound(_) => 404,
            QueryError::InvalidDate(_) => 400,
            QueryError::Corrupted(_) => 500,
            QueryError::ServiceUnavailable => 500,
        }
    }

    /// Both "today" and "no file" are history-unavailable conditions.
    pub fn is_history_unavailable(&self) -> bool {
        matches!(
            self,
            QueryError::NotYetAvailable(_) | QueryError::NotFound(_)
        )
    }
}
