//! Pipeline run log with per-job-name mutual exclusion

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flik_common::types::{PipelineKind, RunState, RunStatus, StageReport};
use sqlx::{types::Json, PgPool};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::error::{IngestError, IngestResult};

/// Message recorded on runs left RUNNING by a previous process
pub const INTERRUPTED_DESCRIPTION: &str = "Interrupted by server restart";

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a RUNNING row, or fail with `AlreadyRunning` if the job name
    /// already has one. Check and insert are a single atomic step.
    async fn try_begin(
        &self,
        run_id: Uuid,
        job_name: &str,
        kind: PipelineKind,
        params: serde_json::Value,
    ) -> IngestResult<RunStatus>;

    async fn update_stages(&self, run_id: Uuid, stages: &[StageReport]) -> IngestResult<()>;

    async fn finish(
        &self,
        run_id: Uuid,
        state: RunState,
        stages: &[StageReport],
        exit_description: Option<&str>,
    ) -> IngestResult<()>;

    async fn get(&self, run_id: Uuid) -> IngestResult<Option<RunStatus>>;

    /// Most recent runs first
    async fn list(&self, job_name: Option<&str>, limit: u32) -> IngestResult<Vec<RunStatus>>;

    /// Mark every RUNNING row as FAILED; returns how many were changed
    async fn fail_interrupted(&self) -> IngestResult<u64>;
}

#[derive(sqlx::FromRow)]
struct RunRow {
    run_id: Uuid,
    job_name: String,
    kind: String,
    state: String,
    stages: Json<Vec<StageReport>>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    exit_description: Option<String>,
}

impl TryFrom<RunRow> for RunStatus {
    type Error = IngestError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        Ok(RunStatus {
            run_id: row.run_id,
            job_name: row.job_name,
            kind: row
                .kind
                .parse()
                .map_err(|e: flik_common::FlikError| IngestError::CorruptState(e.to_string()))?,
            state: row
                .state
                .parse()
                .map_err(|e: flik_common::FlikError| IngestError::CorruptState(e.to_string()))?,
            stages: row.stages.0,
            started_at: row.started_at,
            ended_at: row.ended_at,
            exit_description: row.exit_description,
        })
    }
}

const RUN_COLUMNS: &str =
    "run_id, job_name, kind, state, stages, started_at, ended_at, exit_description";

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn try_begin(
        &self,
        run_id: Uuid,
        job_name: &str,
        kind: PipelineKind,
        params: serde_json::Value,
    ) -> IngestResult<RunStatus> {
        let sql = format!(
            r#"
            INSERT INTO pipeline_runs (run_id, job_name, kind, params, state, stages, started_at)
            VALUES ($1, $2, $3, $4, $5, '[]'::jsonb, NOW())
            RETURNING {}
            "#,
            RUN_COLUMNS
        );

        let row = sqlx::query_as::<_, RunRow>(&sql)
            .bind(run_id)
            .bind(job_name)
            .bind(kind.as_str())
            .bind(params)
            .bind(RunState::Running.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    IngestError::AlreadyRunning(job_name.to_string())
                } else {
                    IngestError::Persistence(e)
                }
            })?;

        row.try_into()
    }

    async fn update_stages(&self, run_id: Uuid, stages: &[StageReport]) -> IngestResult<()> {
        sqlx::query("UPDATE pipeline_runs SET stages = $1 WHERE run_id = $2")
            .bind(Json(stages))
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn finish(
        &self,
        run_id: Uuid,
        state: RunState,
        stages: &[StageReport],
        exit_description: Option<&str>,
    ) -> IngestResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE pipeline_runs
            SET state = $1, stages = $2, exit_description = $3, ended_at = NOW()
            WHERE run_id = $4
            "#,
        )
        .bind(state.as_str())
        .bind(Json(stages))
        .bind(exit_description)
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(IngestError::RunNotFound(run_id));
        }
        Ok(())
    }

    async fn get(&self, run_id: Uuid) -> IngestResult<Option<RunStatus>> {
        let sql = format!("SELECT {} FROM pipeline_runs WHERE run_id = $1", RUN_COLUMNS);
        let row = sqlx::query_as::<_, RunRow>(&sql)
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(RunStatus::try_from).transpose()
    }

    async fn list(&self, job_name: Option<&str>, limit: u32) -> IngestResult<Vec<RunStatus>> {
        let sql = format!(
            r#"
            SELECT {} FROM pipeline_runs
            WHERE ($1::text IS NULL OR job_name = $1)
            ORDER BY started_at DESC
            LIMIT $2
            "#,
            RUN_COLUMNS
        );
        let rows = sqlx::query_as::<_, RunRow>(&sql)
            .bind(job_name)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(RunStatus::try_from).collect()
    }

    async fn fail_interrupted(&self) -> IngestResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE pipeline_runs
            SET state = $1, exit_description = $2, ended_at = NOW()
            WHERE state = $3
            "#,
        )
        .bind(RunState::Failed.as_str())
        .bind(INTERRUPTED_DESCRIPTION)
        .bind(RunState::Running.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Default)]
pub struct MemoryRunStore {
    runs: Mutex<Vec<RunStatus>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn try_begin(
        &self,
        run_id: Uuid,
        job_name: &str,
        kind: PipelineKind,
        _params: serde_json::Value,
    ) -> IngestResult<RunStatus> {
        let mut runs = self.runs.lock().await;
        if runs
            .iter()
            .any(|r| r.job_name == job_name && r.state == RunState::Running)
        {
            return Err(IngestError::AlreadyRunning(job_name.to_string()));
        }

        let status = RunStatus {
            run_id,
            job_name: job_name.to_string(),
            kind,
            state: RunState::Running,
            stages: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
            exit_description: None,
        };
        runs.push(status.clone());
        Ok(status)
    }

    async fn update_stages(&self, run_id: Uuid, stages: &[StageReport]) -> IngestResult<()> {
        let mut runs = self.runs.lock().await;
        let run = runs
            .iter_mut()
            .find(|r| r.run_id == run_id)
            .ok_or(IngestError::RunNotFound(run_id))?;
        run.stages = stages.to_vec();
        Ok(())
    }

    async fn finish(
        &self,
        run_id: Uuid,
        state: RunState,
        stages: &[StageReport],
        exit_description: Option<&str>,
    ) -> IngestResult<()> {
        let mut runs = self.runs.lock().await;
        let run = runs
            .iter_mut()
            .find(|r| r.run_id == run_id)
            .ok_or(IngestError::RunNotFound(run_id))?;
        run.state = state;
        run.stages = stages.to_vec();
        run.exit_description = exit_description.map(str::to_string);
        run.ended_at = Some(Utc::now());
        Ok(())
    }

    async fn get(&self, run_id: Uuid) -> IngestResult<Option<RunStatus>> {
        Ok(self
            .runs
            .lock()
            .await
            .iter()
            .find(|r| r.run_id == run_id)
            .cloned())
    }

    async fn list(&self, job_name: Option<&str>, limit: u32) -> IngestResult<Vec<RunStatus>> {
        Ok(self
            .runs
            .lock()
            .await
            .iter()
            .rev()
            .filter(|r| job_name.map_or(true, |name| r.job_name == name))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn fail_interrupted(&self) -> IngestResult<u64> {
        let mut runs = self.runs.lock().await;
        let mut changed = 0;
        for run in runs.iter_mut().filter(|r| r.state == RunState::Running) {
            run.state = RunState::Failed;
            run.exit_description = Some(INTERRUPTED_DESCRIPTION.to_string());
            run.ended_at = Some(Utc::now());
            changed += 1;
        }
        Ok(changed)
    }
}
