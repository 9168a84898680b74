//! Wire types shared by the batch server and the CLI

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::FlikError;

/// The fixed set of pipelines the batch server knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    /// Paged listing fetch with inline enrichment, per (content type, area)
    Collection,
    /// Detail backfill over already collected raw rows
    Enrichment,
    /// Raw tables to the normalized `spots` table
    Migration,
    /// Google Places rating and review backfill over raw rows
    Places,
    /// Provider image gallery backfill over `spots`
    Images,
}

impl PipelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::Collection => "collection",
            PipelineKind::Enrichment => "enrichment",
            PipelineKind::Migration => "migration",
            PipelineKind::Places => "places",
            PipelineKind::Images => "images",
        }
    }
}

impl std::str::FromStr for PipelineKind {
    type Err = FlikError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "collection" | "collect" => Ok(PipelineKind::Collection),
            "enrichment" | "enrich" => Ok(PipelineKind::Enrichment),
            "migration" | "migrate" => Ok(PipelineKind::Migration),
            "places" | "google-places" => Ok(PipelineKind::Places),
            "images" | "spot-images" => Ok(PipelineKind::Images),
            other => Err(FlikError::UnknownPipeline(other.to_string())),
        }
    }
}

impl std::fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a whole pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Running,
    Completed,
    HaltedQuota,
    Failed,
    /// Launch refused because the same job was still in flight. Never persisted.
    Skipped,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Running => "RUNNING",
            RunState::Completed => "COMPLETED",
            RunState::HaltedQuota => "HALTED_QUOTA",
            RunState::Failed => "FAILED",
            RunState::Skipped => "SKIPPED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Running)
    }
}

impl std::str::FromStr for RunState {
    type Err = FlikError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(RunState::Running),
            "COMPLETED" => Ok(RunState::Completed),
            "HALTED_QUOTA" => Ok(RunState::HaltedQuota),
            "FAILED" => Ok(RunState::Failed),
            "SKIPPED" => Ok(RunState::Skipped),
            other => Err(FlikError::UnknownRunState(other.to_string())),
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single read/transform/write stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageState {
    #[default]
    NotStarted,
    Reading,
    Transforming,
    Writing,
    Exhausted,
    HaltedQuota,
    Failed,
}

impl StageState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageState::Exhausted | StageState::HaltedQuota | StageState::Failed
        )
    }
}

/// Counters accumulated by one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StageStats {
    /// Items handed out by the reader
    pub read_count: u64,
    /// Items persisted by the writer
    pub write_count: u64,
    /// Items dropped because they failed validation or enrichment returned nothing
    pub skip_count: u64,
    /// Items dropped because they did not belong to the requested slice
    pub filter_count: u64,
    /// Chunks committed
    pub commit_count: u64,
    /// Outbound API calls attempted
    pub api_calls: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl StageStats {
    /// Create stats stamped with the current time
    pub fn new() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn complete(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    pub fn inc_read(&mut self) {
        self.read_count += 1;
    }

    pub fn inc_skipped(&mut self) {
        self.skip_count += 1;
    }

    pub fn inc_filtered(&mut self) {
        self.filter_count += 1;
    }

    pub fn add_written(&mut self, n: u64) {
        self.write_count += n;
        self.commit_count += 1;
    }

    pub fn add_api_calls(&mut self, n: u64) {
        self.api_calls += n;
    }

    /// Fold another stage's counters into this one
    pub fn merge(self, other: Self) -> Self {
        Self {
            read_count: self.read_count + other.read_count,
            write_count: self.write_count + other.write_count,
            skip_count: self.skip_count + other.skip_count,
            filter_count: self.filter_count + other.filter_count,
            commit_count: self.commit_count + other.commit_count,
            api_calls: self.api_calls + other.api_calls,
            started_at: self.started_at.or(other.started_at),
            ended_at: other.ended_at.or(self.ended_at),
        }
    }

    /// Share of read items that ended up written, as a percentage
    pub fn write_rate(&self) -> f64 {
        if self.read_count > 0 {
            (self.write_count as f64 / self.read_count as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Status of one stage inside a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub name: String,
    pub state: StageState,
    #[serde(flatten)]
    pub stats: StageStats,
}

/// Parameters accepted when launching a pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRunRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Returned right after a launch is accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    pub run_id: Uuid,
    pub job_name: String,
    pub state: RunState,
}

/// Full status of a run, live or finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub run_id: Uuid,
    pub job_name: String,
    pub kind: PipelineKind,
    pub state: RunState,
    pub stages: Vec<StageReport>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub exit_description: Option<String>,
}

impl RunStatus {
    /// Total rows written across all stages
    pub fn total_written(&self) -> u64 {
        self.stages.iter().map(|s| s.stats.write_count).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunList {
    pub runs: Vec<RunStatus>,
}

/// Snapshot of today's outbound call budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub day: String,
    pub used: u32,
    pub remaining: u32,
    pub daily_limit: u32,
    pub can_request: bool,
}
