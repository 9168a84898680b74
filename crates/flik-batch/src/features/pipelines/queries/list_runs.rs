//! List runs query
//!
//! Most recent runs first, optionally narrowed to one job name.

use flik_common::types::RunList;
use mediator::Request;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::ingest::JobOrchestrator;

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRunsQuery {
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl ListRunsQuery {
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

impl Request<Result<RunList, AppError>> for ListRunsQuery {}

pub async fn handle(orchestrator: JobOrchestrator, query: ListRunsQuery) -> Result<RunList, AppError> {
    let job_name = query.job_name.as_deref().filter(|name| !name.is_empty());
    let runs = orchestrator.list(job_name, query.limit()).await?;
    Ok(RunList { runs })
}
