//! Flik batch library
//!
//! Collects tourism listings from the Korea Tourism Organization open API,
//! enriches them with detail and category lookups, and migrates the result
//! into a single normalized `spots` table.
//!
//! # Overview
//!
//! - **ingest**: chunked stages, the daily call budget, resumable cursors,
//!   the run log, notifications, the orchestrator and the scheduler
//! - **migration**: raw rows to [`migration::NormalizedSpot`] and the bulk
//!   insert into `spots`
//! - **features**: HTTP slices for launching runs and reading their status
//! - **db**: connection pool, embedded migrations and health check
//!
//! # Example
//!
//! ```no_run
//! use flik_batch::{config::Config, db, ingest::{JobOrchestrator, PipelineContext}};
//! use flik_common::types::{PipelineKind, StartRunRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let pool = sqlx::PgPool::connect(&config.database.url).await?;
//!     db::run_migrations(&pool).await?;
//!
//!     let orchestrator = JobOrchestrator::new(PipelineContext::postgres(pool, config.ingest)?);
//!     let status = orchestrator
//!         .run_to_completion(PipelineKind::Migration, &StartRunRequest::default())
//!         .await?;
//!     println!("{} rows written", status.total_written());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod ingest;
pub mod middleware;
pub mod migration;

// Re-export commonly used types
pub use error::AppError;
