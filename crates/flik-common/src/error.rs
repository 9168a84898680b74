//! Error types shared across the Flik workspace

use thiserror::Error;

/// Result type alias for Flik operations
pub type Result<T> = std::result::Result<T, FlikError>;

/// Main error type for shared Flik code
#[derive(Error, Debug)]
pub enum FlikError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown pipeline: {0}")]
    UnknownPipeline(String),

    #[error("Unknown run state: {0}")]
    UnknownRunState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
