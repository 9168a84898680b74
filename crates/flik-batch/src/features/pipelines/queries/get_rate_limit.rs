//! Today's outbound call budget

use flik_common::types::RateLimitStatus;
use mediator::Request;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::ingest::JobOrchestrator;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetRateLimitQuery;

impl Request<Result<RateLimitStatus, AppError>> for GetRateLimitQuery {}

pub async fn handle(
    orchestrator: JobOrchestrator,
    _query: GetRateLimitQuery,
) -> Result<RateLimitStatus, AppError> {
    Ok(orchestrator.rate_limit().await?)
}
