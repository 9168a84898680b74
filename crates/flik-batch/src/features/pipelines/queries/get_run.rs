//! Get run query

use flik_common::types::RunStatus;
use mediator::Request;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::ingest::JobOrchestrator;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRunQuery {
    pub run_id: Uuid,
}

impl Request<Result<RunStatus, AppError>> for GetRunQuery {}

pub async fn handle(orchestrator: JobOrchestrator, query: GetRunQuery) -> Result<RunStatus, AppError> {
    Ok(orchestrator.status(query.run_id).await?)
}
