//! Ingestion configuration
//!
//! Settings for the tourism API client, the daily call budget, chunking, the
//! Google Places backfill, the in-process scheduler and notifications. Everything is read from
//! environment variables; unset or unparsable values fall back to defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::gateway::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
use super::places::{DEFAULT_PLACES_BASE_URL, DEFAULT_PLACES_TIMEOUT_SECS};

pub const MIN_CHUNK_SIZE: usize = 10;
pub const MAX_CHUNK_SIZE: usize = 50;

/// Rows per bulk insert into `spots`
pub const MIGRATION_CHUNK_SIZE: usize = 500;

/// Tourism API client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TourismApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Default service key; collection runs may override it per launch
    #[serde(default)]
    pub service_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Daily call budget
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Calls allowed per service-zone day (default: 1000)
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    /// Service time zone as an offset from UTC (default: +9)
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

/// Chunking and paging
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineConfig {
    #[serde(default = "default_chunk_size")]
    pub collect_chunk_size: usize,
    #[serde(default = "default_chunk_size")]
    pub enrich_chunk_size: usize,
    /// Rows drained per enrichment stage when the launch gives no limit
    #[serde(default = "default_enrich_limit")]
    pub enrich_limit: u32,
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    /// Spots visited per image backfill when the launch gives no limit
    #[serde(default = "default_image_limit")]
    pub image_limit: u32,
}

/// Google Places rating backfill
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlacesConfig {
    #[serde(default = "default_places_base_url")]
    pub base_url: String,
    /// The places pipeline cannot be launched without a key
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_places_timeout_secs")]
    pub timeout_secs: u64,
    /// Google calls allowed per service-zone day (default: 1000)
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    /// Rows visited per category when the launch gives no limit
    #[serde(default = "default_places_stage_limit")]
    pub stage_limit: u32,
}

/// In-process periodic launcher
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Seconds between cycles (default: 90 days)
    #[serde(default = "default_scheduler_interval")]
    pub interval_secs: u64,
    /// Pause between consecutive collection launches
    #[serde(default = "default_launch_delay_ms")]
    pub launch_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct NotificationConfig {
    /// Discord webhook; notifications go to the log when unset
    #[serde(default)]
    pub discord_webhook_url: Option<String>,
}

/// Main ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct IngestConfig {
    #[serde(default)]
    pub tourism: TourismApiConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub places: PlacesConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_daily_limit() -> u32 {
    1000
}

fn default_utc_offset_hours() -> i32 {
    9
}

fn default_chunk_size() -> usize {
    MIN_CHUNK_SIZE
}

fn default_enrich_limit() -> u32 {
    1000
}

fn default_page_size() -> u32 {
    100
}

fn default_image_limit() -> u32 {
    5000
}

fn default_places_base_url() -> String {
    DEFAULT_PLACES_BASE_URL.to_string()
}

fn default_places_timeout_secs() -> u64 {
    DEFAULT_PLACES_TIMEOUT_SECS
}

fn default_places_stage_limit() -> u32 {
    500
}

fn default_scheduler_interval() -> u64 {
    90 * 24 * 60 * 60 // 90 days
}

fn default_launch_delay_ms() -> u64 {
    1000
}

impl Default for TourismApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            service_key: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            utc_offset_hours: default_utc_offset_hours(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            collect_chunk_size: default_chunk_size(),
            enrich_chunk_size: default_chunk_size(),
            enrich_limit: default_enrich_limit(),
            default_page_size: default_page_size(),
            image_limit: default_image_limit(),
        }
    }
}

impl Default for PlacesConfig {
    fn default() -> Self {
        Self {
            base_url: default_places_base_url(),
            api_key: None,
            timeout_secs: default_places_timeout_secs(),
            daily_limit: default_daily_limit(),
            stage_limit: default_places_stage_limit(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_scheduler_interval(),
            launch_delay_ms: default_launch_delay_ms(),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Chunk sizes outside 10..=50 are pulled back into range
pub fn clamp_chunk_size(size: usize) -> usize {
    size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE)
}

impl IngestConfig {
    /// Load ingestion configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            tourism: TourismApiConfig {
                base_url: env_or("TOURISM_API_BASE_URL", default_base_url()),
                service_key: std::env::var("TOURISM_API_SERVICE_KEY").unwrap_or_default(),
                timeout_secs: env_or("TOURISM_API_TIMEOUT_SECS", default_timeout_secs()),
            },
            rate_limit: RateLimitConfig {
                daily_limit: env_or("RATE_LIMIT_DAILY_LIMIT", default_daily_limit()),
                utc_offset_hours: env_or("RATE_LIMIT_UTC_OFFSET_HOURS", default_utc_offset_hours()),
            },
            pipeline: PipelineConfig {
                collect_chunk_size: clamp_chunk_size(env_or(
                    "PIPELINE_COLLECT_CHUNK_SIZE",
                    default_chunk_size(),
                )),
                enrich_chunk_size: clamp_chunk_size(env_or(
                    "PIPELINE_ENRICH_CHUNK_SIZE",
                    default_chunk_size(),
                )),
                enrich_limit: env_or("PIPELINE_ENRICH_LIMIT", default_enrich_limit()),
                default_page_size: env_or("PIPELINE_DEFAULT_PAGE_SIZE", default_page_size()),
                image_limit: env_or("PIPELINE_IMAGE_LIMIT", default_image_limit()),
            },
            places: PlacesConfig {
                base_url: env_or("GOOGLE_PLACES_BASE_URL", default_places_base_url()),
                api_key: std::env::var("GOOGLE_PLACES_API_KEY")
                    .ok()
                    .map(|key| key.trim().to_string())
                    .filter(|key| !key.is_empty()),
                timeout_secs: env_or("GOOGLE_PLACES_TIMEOUT_SECS", default_places_timeout_secs()),
                daily_limit: env_or("GOOGLE_PLACES_DAILY_LIMIT", default_daily_limit()),
                stage_limit: env_or("GOOGLE_PLACES_STAGE_LIMIT", default_places_stage_limit()),
            },
            scheduler: SchedulerConfig {
                enabled: env_or("SCHEDULER_ENABLED", false),
                interval_secs: env_or("SCHEDULER_INTERVAL_SECS", default_scheduler_interval()),
                launch_delay_ms: env_or("SCHEDULER_LAUNCH_DELAY_MS", default_launch_delay_ms()),
            },
            notification: NotificationConfig {
                discord_webhook_url: std::env::var("DISCORD_WEBHOOK_URL")
                    .ok()
                    .filter(|url| !url.trim().is_empty()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tourism.base_url.trim().is_empty() {
            anyhow::bail!("TOURISM_API_BASE_URL cannot be empty");
        }
        if self.tourism.timeout_secs == 0 {
            anyhow::bail!("TOURISM_API_TIMEOUT_SECS must be greater than 0");
        }
        if !(-12..=14).contains(&self.rate_limit.utc_offset_hours) {
            anyhow::bail!("RATE_LIMIT_UTC_OFFSET_HOURS must be between -12 and 14");
        }
        if self.places.base_url.trim().is_empty() {
            anyhow::bail!("GOOGLE_PLACES_BASE_URL cannot be empty");
        }
        if self.places.timeout_secs == 0 {
            anyhow::bail!("GOOGLE_PLACES_TIMEOUT_SECS must be greater than 0");
        }
        if self.pipeline.default_page_size == 0 {
            anyhow::bail!("PIPELINE_DEFAULT_PAGE_SIZE must be greater than 0");
        }
        if self.scheduler.enabled && self.scheduler.interval_secs == 0 {
            anyhow::bail!("SCHEDULER_INTERVAL_SECS must be greater than 0");
        }
        Ok(())
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.tourism.timeout_secs)
    }

    pub fn places_timeout(&self) -> Duration {
        Duration::from_secs(self.places.timeout_secs)
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.interval_secs)
    }

    pub fn launch_delay(&self) -> Duration {
        Duration::from_millis(self.scheduler.launch_delay_ms)
    }
}
