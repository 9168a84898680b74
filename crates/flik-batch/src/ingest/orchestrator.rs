//! Pipeline orchestration
//!
//! A pipeline is an ordered list of [`StageDescriptor`]s produced by
//! [`PipelineDefinition::build`]. The [`JobOrchestrator`] turns each
//! descriptor into a concrete [`ChunkStage`] against the shared
//! [`PipelineContext`], runs the stages in order on one tokio task and records
//! the outcome in the run log.
//!
//! At most one run per job name is RUNNING at a time. The run store enforces
//! this when the run row is inserted.

use flik_common::types::{
    PipelineKind, RateLimitStatus, RunHandle, RunState, RunStatus, StageReport, StageState,
    StartRunRequest,
};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::collect::{CollectionProcessor, PageReader, RawRecordWriter};
use super::config::{IngestConfig, MIGRATION_CHUNK_SIZE};
use super::content_type::{is_known_area, ContentType};
use super::cursor::{CursorStore, MemoryCursorStore, PgCursorStore, ResumableCursor};
use super::enrich::{
    Backlog, DetailIntroProcessor, DetailWriter, LabelDetailProcessor, LabelWriter, PendingReader,
};
use super::error::{IngestError, IngestResult};
use super::gateway::{ApiGateway, TourismApi};
use super::notify::{
    completion_message, dispatch, empty_result_message, quota_message, DiscordNotifier,
    LogNotifier, Notifier,
};
use super::places::{
    GooglePlacesGateway, PlaceCandidateReader, PlacesApi, PlacesProcessor, PlacesWriter,
    PLACES_CHUNK_SIZE, PLACES_CONTENT_TYPES,
};
use super::rate_limiter::{
    MemoryRateBudgetStore, PgRateBudgetStore, RateBudgetStore, RateLimiter, PLACES_BUDGET_KEY_PREFIX,
};
use super::raw_store::{MemoryRawStore, PgRawStore, RawStore};
use super::run_store::{MemoryRunStore, PgRunStore, RunStore};
use super::stage::{ChunkStage, Stage};
use crate::migration::images::{SpotImageProcessor, SpotImageReader, SpotImageWriter, IMAGE_CHUNK_SIZE};
use crate::migration::pipeline::{EligibleReader, SpotProcessor, SpotWriter};
use crate::migration::spot_store::{MemorySpotStore, PgSpotStore, SpotStore};

/// Largest page a collection launch may ask for
pub const MAX_PAGE_SIZE: u32 = 1000;

/// What a stage does, with its resolved parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageKind {
    Collect {
        content_type: ContentType,
        area_code: String,
        page_size: u32,
    },
    DetailIntro {
        limit: u32,
    },
    LabelDetail {
        limit: u32,
    },
    Migrate {
        content_type: ContentType,
    },
    Places {
        content_type: ContentType,
        limit: u32,
    },
    SpotImages {
        limit: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDescriptor {
    pub name: String,
    pub kind: StageKind,
}

impl StageDescriptor {
    fn new(name: impl Into<String>, kind: StageKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A validated launch: job name, stages in order and the parameters to record
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    pub kind: PipelineKind,
    pub job_name: String,
    pub stages: Vec<StageDescriptor>,
    /// Per-launch provider key; never persisted
    pub service_key: Option<String>,
    pub params: serde_json::Value,
}

fn required<'a>(value: &'a Option<String>, name: &str) -> IngestResult<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| IngestError::invalid(format!("{} is required", name)))
}

fn positive_limit(limit: u32) -> IngestResult<u32> {
    if limit == 0 {
        return Err(IngestError::invalid("limit must be greater than 0"));
    }
    Ok(limit)
}

impl PipelineDefinition {
    pub fn build(
        kind: PipelineKind,
        request: &StartRunRequest,
        config: &IngestConfig,
    ) -> IngestResult<Self> {
        let (job_name, stages) = match kind {
            PipelineKind::Collection => {
                let area_code = required(&request.area_code, "area_code")?;
                if !is_known_area(area_code) {
                    return Err(IngestError::invalid(format!("unknown area_code '{}'", area_code)));
                }
                let content_type = ContentType::from_code(required(&request.content_type, "content_type")?)?;

                let page_size = request.page_size.unwrap_or(config.pipeline.default_page_size);
                if page_size == 0 || page_size > MAX_PAGE_SIZE {
                    return Err(IngestError::invalid(format!(
                        "page_size must be between 1 and {}",
                        MAX_PAGE_SIZE
                    )));
                }

                let job_name = format!("collection:{}:{}", content_type.code(), area_code);
                let stage = StageDescriptor::new(
                    "collect",
                    StageKind::Collect {
                        content_type,
                        area_code: area_code.to_string(),
                        page_size,
                    },
                );
                (job_name, vec![stage])
            },
            PipelineKind::Enrichment => {
                let limit = positive_limit(request.limit.unwrap_or(config.pipeline.enrich_limit))?;
                (
                    "enrichment".to_string(),
                    vec![
                        StageDescriptor::new("detail-intro", StageKind::DetailIntro { limit }),
                        StageDescriptor::new("label-detail", StageKind::LabelDetail { limit }),
                    ],
                )
            },
            PipelineKind::Migration => {
                let selected = match request.content_type.as_deref() {
                    Some(code) => Some(ContentType::from_code(code)?),
                    None => None,
                };
                let job_name = match selected {
                    Some(ct) => format!("migration:{}", ct.code()),
                    None => "migration".to_string(),
                };
                let types: Vec<ContentType> = match selected {
                    Some(ct) => vec![ct],
                    None => ContentType::ALL.to_vec(),
                };
                let stages = types
                    .into_iter()
                    .map(|ct| {
                        StageDescriptor::new(
                            format!("migrate:{}", ct.code()),
                            StageKind::Migrate { content_type: ct },
                        )
                    })
                    .collect();
                (job_name, stages)
            },
            PipelineKind::Places => {
                if config.places.api_key.is_none() {
                    return Err(IngestError::invalid("GOOGLE_PLACES_API_KEY is not configured"));
                }
                let limit = positive_limit(request.limit.unwrap_or(config.places.stage_limit))?;
                let selected = match request.content_type.as_deref() {
                    Some(code) => {
                        let ct = ContentType::from_code(code)?;
                        if !PLACES_CONTENT_TYPES.contains(&ct) {
                            return Err(IngestError::invalid(format!(
                                "content_type {} has no Google Places backfill",
                                ct.code()
                            )));
                        }
                        Some(ct)
                    },
                    None => None,
                };
                let job_name = match selected {
                    Some(ct) => format!("places:{}", ct.code()),
                    None => "places".to_string(),
                };
                let types: Vec<ContentType> = match selected {
                    Some(ct) => vec![ct],
                    None => PLACES_CONTENT_TYPES.to_vec(),
                };
                let stages = types
                    .into_iter()
                    .map(|ct| {
                        StageDescriptor::new(
                            format!("places:{}", ct.code()),
                            StageKind::Places { content_type: ct, limit },
                        )
                    })
                    .collect();
                (job_name, stages)
            },
            PipelineKind::Images => {
                let limit = positive_limit(request.limit.unwrap_or(config.pipeline.image_limit))?;
                (
                    "images".to_string(),
                    vec![StageDescriptor::new("spot-images", StageKind::SpotImages { limit })],
                )
            },
        };

        let service_key = request
            .service_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);

        let recorded = StartRunRequest {
            service_key: None,
            ..request.clone()
        };

        Ok(Self {
            kind,
            job_name,
            stages,
            service_key,
            params: serde_json::to_value(recorded)?,
        })
    }
}

/// Everything a pipeline run needs, built once at startup
pub struct PipelineContext {
    pub api: Arc<dyn TourismApi>,
    pub rate_limiter: Arc<RateLimiter>,
    /// Present only when a Google Places key is configured
    pub places: Option<Arc<dyn PlacesApi>>,
    pub places_rate_limiter: Arc<RateLimiter>,
    pub cursors: Arc<dyn CursorStore>,
    pub raw: Arc<dyn RawStore>,
    pub spots: Arc<dyn SpotStore>,
    pub runs: Arc<dyn RunStore>,
    pub notifier: Arc<dyn Notifier>,
    pub config: IngestConfig,
}

impl PipelineContext {
    /// Postgres-backed stores and the live provider gateway
    pub fn postgres(pool: PgPool, config: IngestConfig) -> IngestResult<Self> {
        let budgets: Arc<dyn RateBudgetStore> = Arc::new(PgRateBudgetStore::new(pool.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(
            budgets.clone(),
            config.rate_limit.daily_limit,
            config.rate_limit.utc_offset_hours,
        ));
        let places_rate_limiter = Arc::new(places_limiter(budgets, &config));

        let places: Option<Arc<dyn PlacesApi>> = match &config.places.api_key {
            Some(key) => Some(Arc::new(GooglePlacesGateway::new(
                config.places.base_url.clone(),
                key.clone(),
                config.places_timeout(),
                places_rate_limiter.clone(),
            )?) as Arc<dyn PlacesApi>),
            None => None,
        };

        let api = ApiGateway::new(
            config.tourism.base_url.clone(),
            config.tourism.service_key.clone(),
            config.api_timeout(),
            rate_limiter.clone(),
        )?;

        let notifier: Arc<dyn Notifier> = match &config.notification.discord_webhook_url {
            Some(url) => Arc::new(DiscordNotifier::new(url.clone())?),
            None => Arc::new(LogNotifier),
        };

        Ok(Self {
            api: Arc::new(api),
            rate_limiter,
            places,
            places_rate_limiter,
            cursors: Arc::new(PgCursorStore::new(pool.clone())),
            raw: Arc::new(PgRawStore::new(pool.clone())),
            spots: Arc::new(PgSpotStore::new(pool.clone())),
            runs: Arc::new(PgRunStore::new(pool)),
            notifier,
            config,
        })
    }

    /// In-memory stores around the given provider client. No Places client
    /// is attached.
    pub fn in_memory(api: Arc<dyn TourismApi>, rate_limiter: Arc<RateLimiter>, config: IngestConfig) -> Self {
        let places_rate_limiter = Arc::new(places_limiter(Arc::new(MemoryRateBudgetStore::new()), &config));
        Self {
            api,
            rate_limiter,
            places: None,
            places_rate_limiter,
            cursors: Arc::new(MemoryCursorStore::new()),
            raw: Arc::new(MemoryRawStore::new()),
            spots: Arc::new(MemorySpotStore::new()),
            runs: Arc::new(MemoryRunStore::new()),
            notifier: Arc::new(LogNotifier),
            config,
        }
    }

    /// Limiter with an in-memory budget, for [`PipelineContext::in_memory`]
    pub fn memory_rate_limiter(config: &IngestConfig) -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(
            Arc::new(MemoryRateBudgetStore::new()),
            config.rate_limit.daily_limit,
            config.rate_limit.utc_offset_hours,
        ))
    }
}

fn places_limiter(store: Arc<dyn RateBudgetStore>, config: &IngestConfig) -> RateLimiter {
    RateLimiter::new(store, config.places.daily_limit, config.rate_limit.utc_offset_hours)
        .with_key_prefix(PLACES_BUDGET_KEY_PREFIX)
}

/// How a run ended
struct RunOutcome {
    state: RunState,
    stages: Vec<StageReport>,
    exit_description: Option<String>,
}

impl RunOutcome {
    fn written(&self) -> u64 {
        self.stages.iter().map(|s| s.stats.write_count).sum()
    }
}

#[derive(Clone)]
pub struct JobOrchestrator {
    ctx: Arc<PipelineContext>,
}

impl JobOrchestrator {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Validate, record the run as RUNNING and execute it in the background
    pub async fn start(&self, kind: PipelineKind, request: &StartRunRequest) -> IngestResult<RunHandle> {
        let definition = PipelineDefinition::build(kind, request, &self.ctx.config)?;
        let run_id = Uuid::new_v4();
        let status = self.begin(run_id, &definition).await?;

        let this = self.clone();
        tokio::spawn(async move {
            // Notification delivery stays detached
            let _ = this.execute(run_id, definition).await;
        });

        Ok(RunHandle {
            run_id,
            job_name: status.job_name,
            state: status.state,
        })
    }

    /// Run in the calling task and return the final status
    pub async fn run_to_completion(
        &self,
        kind: PipelineKind,
        request: &StartRunRequest,
    ) -> IngestResult<RunStatus> {
        let definition = PipelineDefinition::build(kind, request, &self.ctx.config)?;
        let run_id = Uuid::new_v4();
        self.begin(run_id, &definition).await?;

        let notification = self.execute(run_id, definition).await;
        if let Err(e) = notification.await {
            warn!(error = %e, "Notification task panicked");
        }
        self.status(run_id).await
    }

    pub async fn status(&self, run_id: Uuid) -> IngestResult<RunStatus> {
        self.ctx
            .runs
            .get(run_id)
            .await?
            .ok_or(IngestError::RunNotFound(run_id))
    }

    pub async fn list(&self, job_name: Option<&str>, limit: u32) -> IngestResult<Vec<RunStatus>> {
        self.ctx.runs.list(job_name, limit).await
    }

    pub async fn rate_limit(&self) -> IngestResult<RateLimitStatus> {
        self.ctx.rate_limiter.snapshot().await
    }

    /// Fail runs a previous process left RUNNING so their job names are free
    pub async fn recover_interrupted(&self) -> IngestResult<u64> {
        let recovered = self.ctx.runs.fail_interrupted().await?;
        if recovered > 0 {
            warn!(count = recovered, "Marked interrupted runs as failed");
        }
        Ok(recovered)
    }

    async fn begin(&self, run_id: Uuid, definition: &PipelineDefinition) -> IngestResult<RunStatus> {
        let status = self
            .ctx
            .runs
            .try_begin(run_id, &definition.job_name, definition.kind, definition.params.clone())
            .await;

        match &status {
            Ok(_) => info!(run_id = %run_id, job = %definition.job_name, "Run started"),
            Err(IngestError::AlreadyRunning(job)) => {
                info!(job = %job, "Skipping launch, job is already running")
            },
            Err(e) => error!(job = %definition.job_name, error = %e, "Failed to record run"),
        }
        status
    }

    /// Run every stage, record the final state and dispatch the notification
    async fn execute(&self, run_id: Uuid, definition: PipelineDefinition) -> JoinHandle<()> {
        let outcome = self.run_stages(run_id, &definition).await;

        if let Err(e) = self
            .ctx
            .runs
            .finish(
                run_id,
                outcome.state,
                &outcome.stages,
                outcome.exit_description.as_deref(),
            )
            .await
        {
            error!(run_id = %run_id, error = %e, "Failed to record run result");
        }

        info!(
            run_id = %run_id,
            job = %definition.job_name,
            state = %outcome.state,
            written = outcome.written(),
            "Run finished"
        );

        let message = self.notification(definition.kind, &definition.job_name, &outcome).await;
        dispatch(self.ctx.notifier.clone(), message)
    }

    async fn run_stages(&self, run_id: Uuid, definition: &PipelineDefinition) -> RunOutcome {
        let api = match &definition.service_key {
            Some(key) => self
                .ctx
                .api
                .with_service_key(key)
                .unwrap_or_else(|| self.ctx.api.clone()),
            None => self.ctx.api.clone(),
        };

        let mut reports = Vec::with_capacity(definition.stages.len());

        for descriptor in &definition.stages {
            let stage = match self.build_stage(&api, descriptor).await {
                Ok(stage) => stage,
                Err(e) => {
                    error!(run_id = %run_id, stage = %descriptor.name, error = %e, "Failed to prepare stage");
                    return RunOutcome {
                        state: RunState::Failed,
                        stages: reports,
                        exit_description: Some(e.to_string()),
                    };
                },
            };

            let outcome = stage.run().await;
            reports.push(outcome.report());

            if let Err(e) = self.ctx.runs.update_stages(run_id, &reports).await {
                warn!(run_id = %run_id, error = %e, "Failed to record stage progress");
            }

            match outcome.state {
                StageState::HaltedQuota => {
                    return RunOutcome {
                        state: RunState::HaltedQuota,
                        stages: reports,
                        exit_description: outcome.error,
                    }
                },
                StageState::Failed => {
                    return RunOutcome {
                        state: RunState::Failed,
                        stages: reports,
                        exit_description: outcome.error,
                    }
                },
                _ => {},
            }
        }

        RunOutcome {
            state: RunState::Completed,
            stages: reports,
            exit_description: None,
        }
    }

    async fn build_stage(
        &self,
        api: &Arc<dyn TourismApi>,
        descriptor: &StageDescriptor,
    ) -> IngestResult<Box<dyn Stage>> {
        let ctx = &self.ctx;
        let name = descriptor.name.clone();

        let stage: Box<dyn Stage> = match &descriptor.kind {
            StageKind::Collect {
                content_type,
                area_code,
                page_size,
            } => {
                let cursor =
                    ResumableCursor::open(ctx.cursors.clone(), *content_type, area_code.clone(), *page_size)
                        .await?;
                Box::new(ChunkStage::new(
                    name,
                    ctx.config.pipeline.collect_chunk_size,
                    PageReader::new(api.clone(), cursor, *content_type, area_code.clone(), *page_size),
                    CollectionProcessor::new(api.clone(), ctx.raw.clone(), *content_type),
                    RawRecordWriter::new(ctx.raw.clone(), *content_type),
                ))
            },
            StageKind::DetailIntro { limit } => Box::new(ChunkStage::new(
                name,
                ctx.config.pipeline.enrich_chunk_size,
                PendingReader::new(ctx.raw.clone(), Backlog::Detail, *limit),
                DetailIntroProcessor::new(api.clone()),
                DetailWriter::new(ctx.raw.clone()),
            )),
            StageKind::LabelDetail { limit } => Box::new(ChunkStage::new(
                name,
                ctx.config.pipeline.enrich_chunk_size,
                PendingReader::new(ctx.raw.clone(), Backlog::Labels, *limit),
                LabelDetailProcessor::new(api.clone(), ctx.raw.clone()),
                LabelWriter::new(ctx.raw.clone()),
            )),
            StageKind::Migrate { content_type } => Box::new(ChunkStage::new(
                name,
                MIGRATION_CHUNK_SIZE,
                EligibleReader::new(ctx.raw.clone(), *content_type),
                SpotProcessor::new(*content_type),
                SpotWriter::new(ctx.spots.clone()),
            )),
            StageKind::Places { content_type, limit } => {
                let places = ctx
                    .places
                    .clone()
                    .ok_or_else(|| IngestError::invalid("GOOGLE_PLACES_API_KEY is not configured"))?;
                Box::new(ChunkStage::new(
                    name,
                    PLACES_CHUNK_SIZE,
                    PlaceCandidateReader::new(ctx.raw.clone(), *content_type, *limit),
                    PlacesProcessor::new(places),
                    PlacesWriter::new(ctx.raw.clone()),
                ))
            },
            StageKind::SpotImages { limit } => Box::new(ChunkStage::new(
                name,
                IMAGE_CHUNK_SIZE,
                SpotImageReader::new(ctx.spots.clone(), *limit),
                SpotImageProcessor::new(api.clone()),
                SpotImageWriter::new(ctx.spots.clone()),
            )),
        };

        Ok(stage)
    }

    async fn notification(&self, kind: PipelineKind, job_name: &str, outcome: &RunOutcome) -> String {
        let limiter = match kind {
            PipelineKind::Places => &self.ctx.places_rate_limiter,
            _ => &self.ctx.rate_limiter,
        };
        let at = limiter.now();

        match outcome.state {
            RunState::HaltedQuota => {
                let used = limiter.used().await.unwrap_or_else(|e| {
                    warn!(error = %e, "Failed to read call budget");
                    limiter.daily_limit()
                });
                quota_message(job_name, used, limiter.daily_limit(), at)
            },
            RunState::Completed if outcome.written() == 0 => empty_result_message(job_name, at),
            state => completion_message(job_name, state, outcome.written(), at),
        }
    }
}
