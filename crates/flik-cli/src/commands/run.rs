//! `flik run` command implementation

use crate::api::ApiClient;
use crate::error::Result;
use crate::output::render_handle;
use crate::RunCommand;
use flik_common::types::{PipelineKind, StartRunRequest};

/// Map the subcommand onto the launch request the server expects
pub fn to_request(command: &RunCommand) -> (PipelineKind, StartRunRequest) {
    match command {
        RunCommand::Collection {
            area,
            content_type,
            page_size,
            service_key,
        } => (
            PipelineKind::Collection,
            StartRunRequest {
                area_code: Some(area.clone()),
                content_type: Some(content_type.clone()),
                page_size: *page_size,
                service_key: service_key.clone(),
                limit: None,
            },
        ),
        RunCommand::Enrichment { limit } => (
            PipelineKind::Enrichment,
            StartRunRequest {
                limit: *limit,
                ..Default::default()
            },
        ),
        RunCommand::Migration { content_type } => (
            PipelineKind::Migration,
            StartRunRequest {
                content_type: content_type.clone(),
                ..Default::default()
            },
        ),
        RunCommand::Places { content_type, limit } => (
            PipelineKind::Places,
            StartRunRequest {
                content_type: content_type.clone(),
                limit: *limit,
                ..Default::default()
            },
        ),
        RunCommand::Images { limit } => (
            PipelineKind::Images,
            StartRunRequest {
                limit: *limit,
                ..Default::default()
            },
        ),
    }
}

pub async fn run(server_url: String, command: &RunCommand) -> Result<()> {
    let client = ApiClient::new(server_url)?;
    let (kind, request) = to_request(command);

    tracing::debug!(pipeline = %kind, ?request, "Launching run");
    let handle = client.start_run(kind, &request).await?;

    println!("{}", render_handle(&handle));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_request() {
        let (kind, request) = to_request(&RunCommand::Migration {
            content_type: Some("39".to_string()),
        });
        assert_eq!(kind, PipelineKind::Migration);
        assert_eq!(request.content_type.as_deref(), Some("39"));
        assert!(request.area_code.is_none());
    }

    #[test]
    fn test_enrichment_request() {
        let (kind, request) = to_request(&RunCommand::Enrichment { limit: Some(200) });
        assert_eq!(kind, PipelineKind::Enrichment);
        assert_eq!(request.limit, Some(200));
    }

    #[test]
    fn test_backfill_requests() {
        let (kind, request) = to_request(&RunCommand::Places {
            content_type: Some("12".to_string()),
            limit: None,
        });
        assert_eq!(kind, PipelineKind::Places);
        assert_eq!(request.content_type.as_deref(), Some("12"));
        assert!(request.limit.is_none());

        let (kind, request) = to_request(&RunCommand::Images { limit: Some(300) });
        assert_eq!(kind, PipelineKind::Images);
        assert_eq!(request.limit, Some(300));
        assert!(request.content_type.is_none());
    }
}
