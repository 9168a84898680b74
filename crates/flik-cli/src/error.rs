//! Error types for the Flik CLI
//!
//! Messages are user-facing and say what to check next.

use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// The server answered with an error body
    #[error("Server rejected the request ({status}): {message}")]
    Api { status: u16, message: String },

    /// HTTP request failed
    #[error("Network request failed: {0}. Check that the Flik server is running and the server URL is correct.")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("Failed to parse server response: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check FLIK_SERVER_URL or --server-url.")]
    Config(String),

    /// Generic anyhow error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
