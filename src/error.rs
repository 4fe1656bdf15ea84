//! gowon-markov error types

use std::path::PathBuf;

/// gowon-markov error types
#[derive(Debug, thiserror::Error)]
pub enum MarkovError {
    // Startup errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("could not connect to broker after {attempts} attempts: {reason}")]
    Connect { attempts: u32, reason: String },

    // Session errors
    #[error("transport error: {0}")]
    Transport(String),

    /// Any inbound payload that is not a well-formed request: invalid
    /// UTF-8, invalid JSON, or JSON of the wrong shape.
    #[error("could not parse message: {0}")]
    Parse(#[from] serde_json::Error),

    // Model errors
    #[error("failed to load model from {path:?}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("could not create sentence after {attempts} attempts")]
    Generation { attempts: usize },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MarkovError {
    /// Whether the error should terminate the process.
    ///
    /// Only configuration errors and an exhausted connect sequence are
    /// fatal; everything else is logged and the bot keeps serving.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MarkovError::Configuration(_) | MarkovError::Connect { .. }
        )
    }
}

/// Result type alias for gowon-markov operations
pub type Result<T> = std::result::Result<T, MarkovError>;
