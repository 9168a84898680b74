//! Periodic pipeline launcher
//!
//! Each cycle collects every area × content type pair one after another,
//! then runs enrichment, migration and the spot image backfill. After a
//! collection run halts on the call budget, the remaining collections,
//! enrichment and the image backfill are skipped for that cycle. Migration
//! makes no API calls and still runs. Google Places is launched by hand only.

use flik_common::types::{PipelineKind, RunState, StartRunRequest};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use super::config::IngestConfig;
use super::content_type::{ContentType, AREA_CODES};
use super::error::IngestError;
use super::orchestrator::JobOrchestrator;

/// What one cycle did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub collections_run: usize,
    pub collections_skipped: usize,
    pub collections_failed: usize,
    pub halted_on_quota: bool,
    pub enrichment: Option<RunState>,
    pub migration: Option<RunState>,
    pub images: Option<RunState>,
}

pub struct Scheduler {
    orchestrator: JobOrchestrator,
    interval: Duration,
    launch_delay: Duration,
}

impl Scheduler {
    pub fn new(orchestrator: JobOrchestrator, config: &IngestConfig) -> Self {
        Self {
            orchestrator,
            interval: config.scheduler_interval(),
            launch_delay: config.launch_delay(),
        }
    }

    /// Run cycles forever; the first one starts after a full interval
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "Scheduler started");

            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let summary = self.run_cycle().await;
                info!(?summary, "Scheduled cycle finished");
            }
        })
    }

    pub async fn run_cycle(&self) -> CycleSummary {
        let mut summary = CycleSummary::default();

        'collection: for area_code in AREA_CODES {
            for content_type in ContentType::ALL {
                let request = StartRunRequest {
                    area_code: Some(area_code.to_string()),
                    content_type: Some(content_type.code().to_string()),
                    ..Default::default()
                };

                match self
                    .orchestrator
                    .run_to_completion(PipelineKind::Collection, &request)
                    .await
                {
                    Ok(status) => {
                        summary.collections_run += 1;
                        match status.state {
                            RunState::HaltedQuota => {
                                warn!(job = %status.job_name, "Call budget spent, ending collection for this cycle");
                                summary.halted_on_quota = true;
                                break 'collection;
                            },
                            RunState::Failed => summary.collections_failed += 1,
                            _ => {},
                        }
                    },
                    Err(IngestError::AlreadyRunning(_)) => summary.collections_skipped += 1,
                    Err(e) => {
                        error!(area_code, content_type = %content_type, error = %e, "Collection launch failed");
                        summary.collections_failed += 1;
                    },
                }

                if !self.launch_delay.is_zero() {
                    sleep(self.launch_delay).await;
                }
            }
        }

        if !summary.halted_on_quota {
            summary.enrichment = self.launch(PipelineKind::Enrichment).await;
        }
        summary.migration = self.launch(PipelineKind::Migration).await;
        if !summary.halted_on_quota {
            summary.images = self.launch(PipelineKind::Images).await;
        }

        summary
    }

    async fn launch(&self, kind: PipelineKind) -> Option<RunState> {
        match self
            .orchestrator
            .run_to_completion(kind, &StartRunRequest::default())
            .await
        {
            Ok(status) => Some(status.state),
            Err(IngestError::AlreadyRunning(_)) => Some(RunState::Skipped),
            Err(e) => {
                error!(pipeline = %kind, error = %e, "Launch failed");
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::orchestrator::PipelineContext;
    use crate::ingest::raw_store::MemoryRawStore;
    use crate::ingest::record::{CommonDetail, DetailFields};
    use crate::ingest::testing::{listing, FakeTourismApi};
    use std::sync::Arc;

    fn scheduler(daily_limit: u32) -> (Scheduler, Arc<FakeTourismApi>, JobOrchestrator) {
        let mut config = IngestConfig::default();
        config.rate_limit.daily_limit = daily_limit;
        config.scheduler.launch_delay_ms = 0;

        let rate_limiter = PipelineContext::memory_rate_limiter(&config);
        let api = Arc::new(FakeTourismApi::with_limiter(rate_limiter.clone()));
        let mut ctx = PipelineContext::in_memory(api.clone(), rate_limiter, config.clone());
        ctx.raw = Arc::new(MemoryRawStore::with_labels([("SH", "쇼핑")]));
        let orchestrator = JobOrchestrator::new(ctx);

        (Scheduler::new(orchestrator.clone(), &config), api, orchestrator)
    }

    #[tokio::test]
    async fn test_full_cycle_collects_then_migrates() {
        let (scheduler, api, orchestrator) = scheduler(10_000);
        api.set_listing(
            ContentType::Shopping,
            "31",
            vec![
                listing(ContentType::Shopping, "501", "수원 전통시장", "31"),
                listing(ContentType::Shopping, "502", "지동시장", "31"),
            ],
        );
        api.set_images("501", &["http://img/market.jpg"]);
        let mut intro = DetailFields::new();
        intro.insert("saleitem".to_string(), "순대".to_string());
        for id in ["501", "502"] {
            api.set_intro(id, intro.clone());
            api.set_common(
                id,
                CommonDetail {
                    overview: "재래시장".to_string(),
                    content_type_id: "38".to_string(),
                    lcls_systm1: "SH".to_string(),
                    ..Default::default()
                },
            );
        }

        let summary = scheduler.run_cycle().await;

        assert_eq!(summary.collections_run, AREA_CODES.len() * ContentType::ALL.len());
        assert_eq!(summary.collections_failed, 0);
        assert!(!summary.halted_on_quota);
        assert_eq!(summary.enrichment, Some(RunState::Completed));
        assert_eq!(summary.migration, Some(RunState::Completed));
        assert_eq!(summary.images, Some(RunState::Completed));

        assert_eq!(orchestrator.context().spots.count().await.unwrap(), 2);
        let images = orchestrator.list(Some("images"), 10).await.unwrap();
        assert_eq!(images[0].total_written(), 1);
        let runs = orchestrator.list(Some("collection:38:31"), 10).await.unwrap();
        assert_eq!(runs[0].total_written(), 2);
    }

    #[tokio::test]
    async fn test_quota_ends_collection_and_skips_enrichment() {
        // The first pair spends the single call, the second halts
        let (scheduler, _api, orchestrator) = scheduler(1);

        let summary = scheduler.run_cycle().await;

        assert!(summary.halted_on_quota);
        assert_eq!(summary.collections_run, 2);
        assert!(summary.enrichment.is_none());
        assert_eq!(summary.migration, Some(RunState::Completed));
        assert!(summary.images.is_none());
        assert!(orchestrator.list(Some("enrichment"), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_running_pairs_are_skipped() {
        let (scheduler, _api, orchestrator) = scheduler(10_000);
        orchestrator
            .context()
            .runs
            .try_begin(
                uuid::Uuid::new_v4(),
                "collection:12:2",
                PipelineKind::Collection,
                serde_json::json!({}),
            )
            .await
            .unwrap();

        let summary = scheduler.run_cycle().await;
        assert_eq!(summary.collections_skipped, 1);
        assert_eq!(summary.collections_run, AREA_CODES.len() * ContentType::ALL.len() - 1);
    }
}
