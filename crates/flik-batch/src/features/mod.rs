//! Feature modules implementing the Flik batch API
//!
//! Each feature is a vertical slice with its own commands, queries and
//! routes. Commands and queries implement the mediator pattern using the
//! `mediator` crate.
//!
//! # Features
//!
//! - **pipelines**: launch collection, enrichment and migration runs, read
//!   run status and the daily call budget

pub mod pipelines;

use axum::Router;

use crate::ingest::JobOrchestrator;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    pub orchestrator: JobOrchestrator,
}

/// Creates the API router with all feature routes mounted
pub fn router(state: FeatureState) -> Router<()> {
    Router::new().merge(pipelines::pipelines_routes().with_state(state.orchestrator))
}
