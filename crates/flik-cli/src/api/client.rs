//! HTTP API client for the Flik batch server

use crate::api::endpoints;
use crate::error::{CliError, Result};
use flik_common::types::{
    PipelineKind, RateLimitStatus, RunHandle, RunList, RunStatus, StartRunRequest,
};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use uuid::Uuid;

/// Default timeout for API requests in seconds.
/// Can be overridden via FLIK_API_TIMEOUT_SECS.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

/// API client for the Flik batch server
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(CliError::config("server URL is empty"));
        }

        let timeout_secs = std::env::var("FLIK_API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_API_TIMEOUT_SECS);

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check server health
    pub async fn health_check(&self) -> Result<bool> {
        let url = endpoints::health_url(&self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Launch a run; the server answers before the run finishes
    pub async fn start_run(&self, kind: PipelineKind, request: &StartRunRequest) -> Result<RunHandle> {
        let url = endpoints::start_run_url(&self.base_url, kind);
        let response = self.client.post(&url).json(request).send().await?;
        parse(response).await
    }

    pub async fn get_run(&self, run_id: Uuid) -> Result<RunStatus> {
        let url = endpoints::run_url(&self.base_url, run_id);
        let response = self.client.get(&url).send().await?;
        parse(response).await
    }

    pub async fn list_runs(&self, job_name: Option<&str>, limit: u32) -> Result<RunList> {
        let url = endpoints::runs_url(&self.base_url);
        let mut query = vec![("limit", limit.to_string())];
        if let Some(job_name) = job_name {
            query.push(("job_name", job_name.to_string()));
        }

        let response = self.client.get(&url).query(&query).send().await?;
        parse(response).await
    }

    pub async fn rate_limit(&self) -> Result<RateLimitStatus> {
        let url = endpoints::rate_limit_url(&self.base_url);
        let response = self.client.get(&url).send().await?;
        parse(response).await
    }
}

/// Decode a success body, or turn `{"error": {"message"}}` into [`CliError::Api`]
async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let bytes = response.bytes().await?;

    if status.is_success() {
        return Ok(serde_json::from_slice(&bytes)?);
    }

    let message = serde_json::from_slice::<serde_json::Value>(&bytes)
        .ok()
        .and_then(|body| body["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(&bytes).trim().to_string());

    Err(CliError::api(status.as_u16(), message))
}
