//! Daily call budget shared by every pipeline that talks to a provider.
//!
//! The budget is one counter per calendar day in the service time zone,
//! keyed `<prefix>:YYYY-MM-DD`; the tourism API and Google Places each
//! have their own prefix. The day boundary is handled by key
//! rotation; nothing resets a counter. Increment and ceiling check happen
//! in one atomic store operation so concurrent pipelines can never push
//! the count past the limit.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use flik_common::types::RateLimitStatus;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::error::{IngestError, IngestResult, QuotaSource};

pub const BUDGET_KEY_PREFIX: &str = "tourism-api";

pub const PLACES_BUDGET_KEY_PREFIX: &str = "google-places";

/// Persistence for the per-day counters
#[async_trait]
pub trait RateBudgetStore: Send + Sync {
    /// Increment `key` if it is below `limit`. Returns the new count when the
    /// increment happened, `None` when the ceiling was already reached.
    async fn try_increment(&self, key: &str, limit: u32) -> IngestResult<Option<u32>>;

    async fn used(&self, key: &str) -> IngestResult<u32>;
}

/// Counters in the `api_rate_budget` table
pub struct PgRateBudgetStore {
    pool: PgPool,
}

impl PgRateBudgetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateBudgetStore for PgRateBudgetStore {
    async fn try_increment(&self, key: &str, limit: u32) -> IngestResult<Option<u32>> {
        let used: Option<i32> = sqlx::query_scalar(
            r#"
            INSERT INTO api_rate_budget (budget_key, used)
            VALUES ($1, 1)
            ON CONFLICT (budget_key) DO UPDATE
                SET used = api_rate_budget.used + 1,
                    updated_at = NOW()
                WHERE api_rate_budget.used < $2
            RETURNING used
            "#,
        )
        .bind(key)
        .bind(limit as i32)
        .fetch_optional(&self.pool)
        .await?;

        Ok(used.map(|u| u.max(0) as u32))
    }

    async fn used(&self, key: &str) -> IngestResult<u32> {
        let used: Option<i32> =
            sqlx::query_scalar("SELECT used FROM api_rate_budget WHERE budget_key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(used.unwrap_or(0).max(0) as u32)
    }
}

/// In-process counters for tests and single-node runs without a database
#[derive(Default)]
pub struct MemoryRateBudgetStore {
    counters: Mutex<HashMap<String, u32>>,
}

impl MemoryRateBudgetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateBudgetStore for MemoryRateBudgetStore {
    async fn try_increment(&self, key: &str, limit: u32) -> IngestResult<Option<u32>> {
        let mut counters = self.counters.lock().await;
        let used = counters.entry(key.to_string()).or_insert(0);
        if *used < limit {
            *used += 1;
            Ok(Some(*used))
        } else {
            Ok(None)
        }
    }

    async fn used(&self, key: &str) -> IngestResult<u32> {
        Ok(self.counters.lock().await.get(key).copied().unwrap_or(0))
    }
}

/// Gate in front of every outbound provider call
pub struct RateLimiter {
    store: Arc<dyn RateBudgetStore>,
    daily_limit: u32,
    offset: FixedOffset,
    key_prefix: &'static str,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateBudgetStore>, daily_limit: u32, utc_offset_hours: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600).unwrap_or_else(|| {
            warn!(utc_offset_hours, "Invalid UTC offset for rate budget, using UTC");
            Utc.fix()
        });

        Self {
            store,
            daily_limit,
            offset,
            key_prefix: BUDGET_KEY_PREFIX,
        }
    }

    /// Count against another provider's budget
    pub fn with_key_prefix(mut self, key_prefix: &'static str) -> Self {
        self.key_prefix = key_prefix;
        self
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    /// Tourism API key for `day`
    pub fn budget_key_for(day: NaiveDate) -> String {
        prefixed_key(BUDGET_KEY_PREFIX, day)
    }

    pub fn key_for(&self, day: NaiveDate) -> String {
        prefixed_key(self.key_prefix, day)
    }

    /// Current time in the service time zone
    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    fn current_key(&self) -> String {
        self.key_for(self.today())
    }

    /// Take one unit of today's budget if any is left. Never errors on an
    /// exhausted budget.
    pub async fn try_acquire(&self) -> IngestResult<bool> {
        if self.daily_limit == 0 {
            return Ok(false);
        }

        let key = self.current_key();
        let acquired = self.store.try_increment(&key, self.daily_limit).await?;
        if let Some(used) = acquired {
            debug!(key = %key, used, limit = self.daily_limit, "Rate budget acquired");
        }
        Ok(acquired.is_some())
    }

    /// Like [`try_acquire`](Self::try_acquire) but an exhausted budget is an error
    pub async fn acquire_or_fail(&self) -> IngestResult<()> {
        if self.try_acquire().await? {
            Ok(())
        } else {
            warn!(budget = self.key_prefix, limit = self.daily_limit, "Daily API budget exhausted");
            Err(IngestError::quota(QuotaSource::DailyBudget))
        }
    }

    pub async fn used(&self) -> IngestResult<u32> {
        self.store.used(&self.current_key()).await
    }

    pub async fn remaining(&self) -> IngestResult<u32> {
        Ok(self.daily_limit.saturating_sub(self.used().await?))
    }

    pub async fn snapshot(&self) -> IngestResult<RateLimitStatus> {
        let day = self.today();
        let used = self.store.used(&self.key_for(day)).await?;
        let remaining = self.daily_limit.saturating_sub(used);

        Ok(RateLimitStatus {
            day: day.format("%Y-%m-%d").to_string(),
            used,
            remaining,
            daily_limit: self.daily_limit,
            can_request: remaining > 0,
        })
    }
}

fn prefixed_key(prefix: &str, day: NaiveDate) -> String {
    format!("{}:{}", prefix, day.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: u32) -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryRateBudgetStore::new()), limit, 9)
    }

    #[tokio::test]
    async fn test_acquire_until_ceiling() {
        let limiter = limiter(3);
        for _ in 0..3 {
            assert!(limiter.try_acquire().await.unwrap());
        }
        assert!(!limiter.try_acquire().await.unwrap());
        assert_eq!(limiter.used().await.unwrap(), 3);
        assert_eq!(limiter.remaining().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_acquire_or_fail_signals_quota() {
        let limiter = limiter(1);
        limiter.acquire_or_fail().await.unwrap();
        let err = limiter.acquire_or_fail().await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::QuotaExceeded {
                origin: QuotaSource::DailyBudget
            }
        ));
    }

    #[tokio::test]
    async fn test_zero_limit_denies_everything() {
        let limiter = limiter(0);
        assert!(!limiter.try_acquire().await.unwrap());
        assert_eq!(limiter.used().await.unwrap(), 0);
        let status = limiter.snapshot().await.unwrap();
        assert!(!status.can_request);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_never_exceed_ceiling() {
        let limiter = Arc::new(limiter(25));
        let mut handles = Vec::new();
        for _ in 0..100 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.try_acquire().await.unwrap() }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 25);
        assert_eq!(limiter.used().await.unwrap(), 25);
    }

    #[tokio::test]
    async fn test_snapshot_reports_budget() {
        let limiter = limiter(10);
        limiter.try_acquire().await.unwrap();
        limiter.try_acquire().await.unwrap();

        let status = limiter.snapshot().await.unwrap();
        assert_eq!(status.used, 2);
        assert_eq!(status.remaining, 8);
        assert_eq!(status.daily_limit, 10);
        assert!(status.can_request);
        assert_eq!(status.day, limiter.today().format("%Y-%m-%d").to_string());
    }

    #[tokio::test]
    async fn test_keys_rotate_per_day() {
        let store = MemoryRateBudgetStore::new();
        let monday = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();

        let key_mon = RateLimiter::budget_key_for(monday);
        assert_eq!(key_mon, "tourism-api:2025-03-03");

        assert_eq!(store.try_increment(&key_mon, 1).await.unwrap(), Some(1));
        assert_eq!(store.try_increment(&key_mon, 1).await.unwrap(), None);
        assert_eq!(
            store
                .try_increment(&RateLimiter::budget_key_for(tuesday), 1)
                .await
                .unwrap(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_prefixed_budgets_share_a_store_without_interfering() {
        let store: Arc<dyn RateBudgetStore> = Arc::new(MemoryRateBudgetStore::new());
        let tourism = RateLimiter::new(store.clone(), 1, 9);
        let places = RateLimiter::new(store, 2, 9).with_key_prefix(PLACES_BUDGET_KEY_PREFIX);

        assert!(tourism.try_acquire().await.unwrap());
        assert!(!tourism.try_acquire().await.unwrap());
        assert!(places.try_acquire().await.unwrap());
        assert!(places.try_acquire().await.unwrap());
        assert!(!places.try_acquire().await.unwrap());

        assert_eq!(tourism.used().await.unwrap(), 1);
        assert_eq!(places.used().await.unwrap(), 2);
        let day = places.today();
        assert_eq!(places.key_for(day), format!("google-places:{}", day.format("%Y-%m-%d")));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_pg_store_respects_ceiling(pool: PgPool) -> sqlx::Result<()> {
        let store = PgRateBudgetStore::new(pool);
        assert_eq!(store.try_increment("tourism-api:2025-01-01", 2).await.unwrap(), Some(1));
        assert_eq!(store.try_increment("tourism-api:2025-01-01", 2).await.unwrap(), Some(2));
        assert_eq!(store.try_increment("tourism-api:2025-01-01", 2).await.unwrap(), None);
        assert_eq!(store.used("tourism-api:2025-01-01").await.unwrap(), 2);
        Ok(())
    }
}
