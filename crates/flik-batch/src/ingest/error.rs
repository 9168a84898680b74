//! Error taxonomy for the ingestion pipelines

use thiserror::Error;
use uuid::Uuid;

/// Who refused the call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaSource {
    /// The provider answered with its request-limit marker
    Provider,
    /// Our own daily budget is spent
    DailyBudget,
}

impl std::fmt::Display for QuotaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaSource::Provider => f.write_str("provider limit"),
            QuotaSource::DailyBudget => f.write_str("daily budget"),
        }
    }
}

pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Halts the run cleanly; reported as HALTED_QUOTA
    #[error("API quota exceeded ({origin})")]
    QuotaExceeded { origin: QuotaSource },

    #[error("Fetch failed: {0}")]
    TransientFetch(String),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("Unknown content type: {0}")]
    UnknownContentType(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Job '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Run {0} not found")]
    RunNotFound(Uuid),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stored state is corrupt: {0}")]
    CorruptState(String),

    #[error("Notification failed: {0}")]
    Notification(String),
}

impl IngestError {
    pub fn quota(origin: QuotaSource) -> Self {
        Self::QuotaExceeded { origin }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, IngestError::QuotaExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_detection() {
        assert!(IngestError::quota(QuotaSource::Provider).is_quota());
        assert!(!IngestError::TransientFetch("timeout".into()).is_quota());
    }

    #[test]
    fn test_quota_message_names_origin() {
        let err = IngestError::quota(QuotaSource::DailyBudget);
        assert_eq!(err.to_string(), "API quota exceeded (daily budget)");
    }
}
