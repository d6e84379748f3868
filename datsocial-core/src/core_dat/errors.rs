//! Dat layer errors

use thiserror::Error;

/// Errors from dat creation, replication and access
#[derive(Debug, Error)]
pub enum DatError {
    /// The dat could not be reached within the retry window; transient,
    /// the caller may retry the whole operation.
    #[error("dat unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("dat handle is closed")]
    Closed,

    #[error("corrupt dat content: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}
