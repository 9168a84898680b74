//! Tourism data ingestion
//!
//! - **gateway**: provider client behind the daily call budget (**rate_limiter**)
//! - **cursor**: per (content type, area) paging position, advanced only after writes
//! - **stage**: the chunked read → process → write loop
//! - **collect** / **enrich**: listing collection and detail backfill stages
//! - **places**: Google Places rating backfill with its own call budget
//! - **raw_store** / **run_store**: persistence for raw rows and the run log
//! - **orchestrator**: named pipelines and their launch/status operations
//! - **scheduler**: periodic launches of every pipeline
//! - **notify**: run notifications

pub mod collect;
pub mod config;
pub mod content_type;
pub mod cursor;
pub mod enrich;
pub mod error;
pub mod field_mapping;
pub mod gateway;
pub mod notify;
pub mod orchestrator;
pub mod places;
pub mod rate_limiter;
pub mod raw_store;
pub mod record;
pub mod run_store;
pub mod scheduler;
pub mod stage;

#[cfg(test)]
pub mod testing;

pub use config::IngestConfig;
pub use content_type::ContentType;
pub use error::{IngestError, IngestResult, QuotaSource};
pub use orchestrator::{JobOrchestrator, PipelineContext, PipelineDefinition};
pub use rate_limiter::RateLimiter;
pub use scheduler::Scheduler;
