//! API endpoint URL builders

use flik_common::types::PipelineKind;
use uuid::Uuid;

/// Build run launch URL
pub fn start_run_url(base_url: &str, kind: PipelineKind) -> String {
    format!("{}/api/v1/pipelines/{}/runs", base_url, kind)
}

/// Build run status URL
pub fn run_url(base_url: &str, run_id: Uuid) -> String {
    format!("{}/api/v1/runs/{}", base_url, run_id)
}

/// Build run list URL
pub fn runs_url(base_url: &str) -> String {
    format!("{}/api/v1/runs", base_url)
}

/// Build call budget URL
pub fn rate_limit_url(base_url: &str) -> String {
    format!("{}/api/v1/rate-limit", base_url)
}

/// Build health check URL
pub fn health_url(base_url: &str) -> String {
    format!("{}/health", base_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_run_url() {
        assert_eq!(
            start_run_url("http://localhost:8080", PipelineKind::Enrichment),
            "http://localhost:8080/api/v1/pipelines/enrichment/runs"
        );
    }

    #[test]
    fn test_run_url() {
        let id = Uuid::nil();
        assert_eq!(
            run_url("http://localhost:8080", id),
            "http://localhost:8080/api/v1/runs/00000000-0000-0000-0000-000000000000"
        );
    }
}
