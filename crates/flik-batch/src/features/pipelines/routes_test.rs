//! Integration tests for pipeline routes
//!
//! Runs against in-memory stores and a scripted tourism API.

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        Router,
    };
    use flik_common::types::PipelineKind;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::features::pipelines::pipelines_routes;
    use crate::ingest::content_type::ContentType;
    use crate::ingest::orchestrator::PipelineContext;
    use crate::ingest::testing::{listing, FakeTourismApi};
    use crate::ingest::{IngestConfig, JobOrchestrator};

    fn orchestrator(daily_limit: u32) -> (JobOrchestrator, Arc<FakeTourismApi>) {
        let mut config = IngestConfig::default();
        config.rate_limit.daily_limit = daily_limit;
        let rate_limiter = PipelineContext::memory_rate_limiter(&config);
        let api = Arc::new(FakeTourismApi::with_limiter(rate_limiter.clone()));
        let ctx = PipelineContext::in_memory(api.clone(), rate_limiter, config);
        (JobOrchestrator::new(ctx), api)
    }

    fn create_test_router(orchestrator: JobOrchestrator) -> Router {
        pipelines_routes().with_state(orchestrator)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_start_collection_is_accepted() {
        let (orchestrator, _api) = orchestrator(1000);
        let app = create_test_router(orchestrator);

        let response = app
            .oneshot(post_json(
                "/pipelines/collection/runs",
                json!({"area_code": "1", "content_type": "32"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["job_name"], "collection:32:1");
        assert_eq!(body["state"], "RUNNING");
        assert!(Uuid::parse_str(body["run_id"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_unknown_pipeline_is_not_found() {
        let (orchestrator, _api) = orchestrator(1000);
        let app = create_test_router(orchestrator);

        let response = app
            .oneshot(post_json("/pipelines/reindex/runs", json!({})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_parameters_are_rejected() {
        let (orchestrator, _api) = orchestrator(1000);
        let app = create_test_router(orchestrator);

        let response = app
            .clone()
            .oneshot(post_json(
                "/pipelines/collection/runs",
                json!({"area_code": "99", "content_type": "32"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(post_json(
                "/pipelines/collection/runs",
                json!({"area_code": "1", "content_type": "25"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["status"], 400);
    }

    #[tokio::test]
    async fn test_running_job_name_conflicts() {
        let (orchestrator, _api) = orchestrator(1000);
        orchestrator
            .context()
            .runs
            .try_begin(Uuid::new_v4(), "enrichment", PipelineKind::Enrichment, json!({}))
            .await
            .unwrap();
        let app = create_test_router(orchestrator);

        let response = app
            .oneshot(post_json("/pipelines/enrichment/runs", json!({})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_get_run_reports_stages() {
        let (orchestrator, api) = orchestrator(1000);
        api.set_listing(
            ContentType::TouristAttraction,
            "1",
            vec![listing(ContentType::TouristAttraction, "126508", "경복궁", "1")],
        );
        let request = flik_common::types::StartRunRequest {
            area_code: Some("1".to_string()),
            content_type: Some("12".to_string()),
            ..Default::default()
        };
        let finished = orchestrator
            .run_to_completion(PipelineKind::Collection, &request)
            .await
            .unwrap();
        let app = create_test_router(orchestrator);

        let response = app
            .oneshot(get(&format!("/runs/{}", finished.run_id)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["state"], "COMPLETED");
        assert_eq!(body["kind"], "collection");
        assert_eq!(body["stages"][0]["name"], "collect");
        assert_eq!(body["stages"][0]["write_count"], 1);
    }

    #[tokio::test]
    async fn test_get_run_not_found() {
        let (orchestrator, _api) = orchestrator(1000);
        let app = create_test_router(orchestrator);

        let response = app
            .clone()
            .oneshot(get(&format!("/runs/{}", Uuid::new_v4())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.oneshot(get("/runs/not-a-uuid")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_runs_filters_by_job_name() {
        let (orchestrator, _api) = orchestrator(1000);
        orchestrator
            .run_to_completion(PipelineKind::Migration, &Default::default())
            .await
            .unwrap();
        orchestrator
            .run_to_completion(PipelineKind::Enrichment, &Default::default())
            .await
            .unwrap();
        let app = create_test_router(orchestrator);

        let response = app
            .clone()
            .oneshot(get("/runs?job_name=migration&limit=5"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let runs = body["runs"].as_array().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0]["job_name"], "migration");

        let response = app.oneshot(get("/runs")).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["runs"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_snapshot() {
        let (orchestrator, _api) = orchestrator(300);
        let app = create_test_router(orchestrator);

        let response = app.oneshot(get("/rate-limit")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["daily_limit"], 300);
        assert_eq!(body["used"], 0);
        assert_eq!(body["remaining"], 300);
        assert_eq!(body["can_request"], true);
    }
}
