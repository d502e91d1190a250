//! Error types for Dumpdex

use thiserror::Error;

/// Result type alias for Dumpdex operations
pub type Result<T> = std::result::Result<T, DumpdexError>;

/// Main error type for Dumpdex
///
/// Only failures that end a run live here. Per-line and per-batch problems
/// are recovered where they happen and never surface as a `DumpdexError`.
#[derive(Error, Debug)]
pub enum DumpdexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input source error while reading line {line}: {source}")]
    InputSource {
        line: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(String),
}

impl DumpdexError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a schema error
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }
}
