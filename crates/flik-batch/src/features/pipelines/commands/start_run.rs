//! Start run command
//!
//! Validates the launch parameters and hands the run to the orchestrator.
//! The caller gets the run id back while the run is still in progress.

use flik_common::types::{PipelineKind, RunHandle, StartRunRequest};
use mediator::Request;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::ingest::JobOrchestrator;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRunCommand {
    /// Pipeline name from the path, e.g. `collection`
    pub kind: String,
    #[serde(flatten)]
    pub request: StartRunRequest,
}

impl Request<Result<RunHandle, AppError>> for StartRunCommand {}

impl StartRunCommand {
    /// Unknown pipeline names are reported as not found
    pub fn pipeline_kind(&self) -> Result<PipelineKind, AppError> {
        self.kind
            .parse()
            .map_err(|_| AppError::NotFound(format!("Pipeline '{}' not found", self.kind)))
    }
}

pub async fn handle(orchestrator: JobOrchestrator, command: StartRunCommand) -> Result<RunHandle, AppError> {
    let kind = command.pipeline_kind()?;
    let handle = orchestrator.start(kind, &command.request).await?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_kind_parsing() {
        let command = StartRunCommand {
            kind: "migration".to_string(),
            request: StartRunRequest::default(),
        };
        assert_eq!(command.pipeline_kind().unwrap(), PipelineKind::Migration);

        let command = StartRunCommand {
            kind: "reindex".to_string(),
            request: StartRunRequest::default(),
        };
        assert!(matches!(command.pipeline_kind(), Err(AppError::NotFound(_))));
    }
}
