//! Resume position of the paged listing fetch.
//!
//! One cursor row exists per (content type, area) pair. A page is recorded
//! only after every record it produced has been durably written; until then
//! the advance sits in [`ResumableCursor`] as pending and can be dropped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::content_type::ContentType;
use super::error::{IngestError, IngestResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchCursor {
    pub content_type: ContentType,
    pub area_code: String,
    pub last_page: u32,
    /// Page size used by the fetch that produced `last_page`
    pub page_size: u32,
    /// Listing offset one past the furthest record fetched; never decreases
    pub cumulative_count: u64,
    pub last_call_time: DateTime<Utc>,
}

/// First page to request given the last durable cursor.
///
/// When the page size changed since the last fetch, the position is derived
/// from the cumulative offset so no record is skipped. The page may start
/// before that offset, in which case a few records are fetched again.
pub fn compute_resume_page(last: Option<&FetchCursor>, current_page_size: u32) -> u32 {
    let Some(last) = last else {
        return 1;
    };

    let page_size = u64::from(current_page_size.max(1));
    let by_offset = u32::try_from(last.cumulative_count / page_size + 1)
        .unwrap_or(u32::MAX)
        .max(1);

    if last.page_size == current_page_size {
        return last.last_page.saturating_add(1).max(by_offset);
    }

    by_offset
}

/// Listing offset one past the last record of `page`
pub fn page_end_offset(page: u32, page_size: u32, fetched: u64) -> u64 {
    u64::from(page.saturating_sub(1)) * u64::from(page_size) + fetched
}

#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn get_last(
        &self,
        content_type: ContentType,
        area_code: &str,
    ) -> IngestResult<Option<FetchCursor>>;

    /// Record `page` as fetched; the cumulative offset moves to the end of
    /// that page unless it already lies further on
    async fn save(
        &self,
        content_type: ContentType,
        area_code: &str,
        page: u32,
        page_size: u32,
        fetched: u64,
    ) -> IngestResult<()>;

    /// Put the row back to `to`, or remove it when there was no prior cursor
    async fn rollback(
        &self,
        content_type: ContentType,
        area_code: &str,
        to: Option<&FetchCursor>,
    ) -> IngestResult<()>;
}

#[derive(sqlx::FromRow)]
struct CursorRow {
    content_type_id: String,
    area_code: String,
    last_page: i32,
    page_size: i32,
    cumulative_count: i64,
    last_call_time: DateTime<Utc>,
}

impl TryFrom<CursorRow> for FetchCursor {
    type Error = IngestError;

    fn try_from(row: CursorRow) -> Result<Self, Self::Error> {
        Ok(FetchCursor {
            content_type: ContentType::from_code(&row.content_type_id)?,
            area_code: row.area_code,
            last_page: u32::try_from(row.last_page)
                .map_err(|_| IngestError::CorruptState(format!("negative last_page {}", row.last_page)))?,
            page_size: u32::try_from(row.page_size)
                .map_err(|_| IngestError::CorruptState(format!("negative page_size {}", row.page_size)))?,
            cumulative_count: u64::try_from(row.cumulative_count).map_err(|_| {
                IngestError::CorruptState(format!("negative cumulative_count {}", row.cumulative_count))
            })?,
            last_call_time: row.last_call_time,
        })
    }
}

/// Cursors in the `fetch_cursors` table
pub struct PgCursorStore {
    pool: PgPool,
}

impl PgCursorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CursorStore for PgCursorStore {
    async fn get_last(
        &self,
        content_type: ContentType,
        area_code: &str,
    ) -> IngestResult<Option<FetchCursor>> {
        let row = sqlx::query_as::<_, CursorRow>(
            r#"
            SELECT content_type_id, area_code, last_page, page_size, cumulative_count, last_call_time
            FROM fetch_cursors
            WHERE content_type_id = $1 AND area_code = $2
            "#,
        )
        .bind(content_type.code())
        .bind(area_code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(FetchCursor::try_from).transpose()
    }

    async fn save(
        &self,
        content_type: ContentType,
        area_code: &str,
        page: u32,
        page_size: u32,
        fetched: u64,
    ) -> IngestResult<()> {
        sqlx::query(
            r#"
            INSERT INTO fetch_cursors
                (content_type_id, area_code, last_page, page_size, cumulative_count, last_call_time)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (content_type_id, area_code) DO UPDATE
                SET last_page = EXCLUDED.last_page,
                    page_size = EXCLUDED.page_size,
                    cumulative_count = GREATEST(fetch_cursors.cumulative_count, EXCLUDED.cumulative_count),
                    last_call_time = NOW()
            "#,
        )
        .bind(content_type.code())
        .bind(area_code)
        .bind(page as i32)
        .bind(page_size as i32)
        .bind(page_end_offset(page, page_size, fetched) as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn rollback(
        &self,
        content_type: ContentType,
        area_code: &str,
        to: Option<&FetchCursor>,
    ) -> IngestResult<()> {
        match to {
            Some(cursor) => {
                sqlx::query(
                    r#"
                    INSERT INTO fetch_cursors
                        (content_type_id, area_code, last_page, page_size, cumulative_count, last_call_time)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    ON CONFLICT (content_type_id, area_code) DO UPDATE
                        SET last_page = EXCLUDED.last_page,
                            page_size = EXCLUDED.page_size,
                            cumulative_count = EXCLUDED.cumulative_count,
                            last_call_time = EXCLUDED.last_call_time
                    "#,
                )
                .bind(content_type.code())
                .bind(area_code)
                .bind(cursor.last_page as i32)
                .bind(cursor.page_size as i32)
                .bind(cursor.cumulative_count as i64)
                .bind(cursor.last_call_time)
                .execute(&self.pool)
                .await?;
            },
            None => {
                sqlx::query("DELETE FROM fetch_cursors WHERE content_type_id = $1 AND area_code = $2")
                    .bind(content_type.code())
                    .bind(area_code)
                    .execute(&self.pool)
                    .await?;
            },
        }

        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCursorStore {
    cursors: Mutex<HashMap<(ContentType, String), FetchCursor>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn get_last(
        &self,
        content_type: ContentType,
        area_code: &str,
    ) -> IngestResult<Option<FetchCursor>> {
        Ok(self
            .cursors
            .lock()
            .await
            .get(&(content_type, area_code.to_string()))
            .cloned())
    }

    async fn save(
        &self,
        content_type: ContentType,
        area_code: &str,
        page: u32,
        page_size: u32,
        fetched: u64,
    ) -> IngestResult<()> {
        let mut cursors = self.cursors.lock().await;
        let cursor = cursors
            .entry((content_type, area_code.to_string()))
            .or_insert_with(|| FetchCursor {
                content_type,
                area_code: area_code.to_string(),
                last_page: 0,
                page_size,
                cumulative_count: 0,
                last_call_time: Utc::now(),
            });
        cursor.last_page = page;
        cursor.page_size = page_size;
        cursor.cumulative_count = cursor
            .cumulative_count
            .max(page_end_offset(page, page_size, fetched));
        cursor.last_call_time = Utc::now();
        Ok(())
    }

    async fn rollback(
        &self,
        content_type: ContentType,
        area_code: &str,
        to: Option<&FetchCursor>,
    ) -> IngestResult<()> {
        let mut cursors = self.cursors.lock().await;
        let key = (content_type, area_code.to_string());
        match to {
            Some(cursor) => {
                cursors.insert(key, cursor.clone());
            },
            None => {
                cursors.remove(&key);
            },
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingPage {
    page: u32,
    fetched: u64,
    /// Reader offset one past this page's last record
    end_offset: u64,
}

/// Per-run cursor handle: the last durable state plus advances waiting for
/// their records to be written
pub struct ResumableCursor {
    store: Arc<dyn CursorStore>,
    content_type: ContentType,
    area_code: String,
    page_size: u32,
    committed: Option<FetchCursor>,
    pending: VecDeque<PendingPage>,
}

impl ResumableCursor {
    pub async fn open(
        store: Arc<dyn CursorStore>,
        content_type: ContentType,
        area_code: impl Into<String>,
        page_size: u32,
    ) -> IngestResult<Self> {
        let area_code = area_code.into();
        let committed = store.get_last(content_type, &area_code).await?;

        Ok(Self {
            store,
            content_type,
            area_code,
            page_size,
            committed,
            pending: VecDeque::new(),
        })
    }

    pub fn resume_page(&self) -> u32 {
        compute_resume_page(self.committed.as_ref(), self.page_size)
    }

    pub fn committed(&self) -> Option<&FetchCursor> {
        self.committed.as_ref()
    }

    pub fn pending_pages(&self) -> usize {
        self.pending.len()
    }

    /// Hold an advance for `page`, which produced `fetched` records ending at
    /// reader offset `end_offset`. Only non-empty fetches are staged.
    pub fn stage(&mut self, page: u32, fetched: u64, end_offset: u64) {
        if fetched == 0 {
            return;
        }
        self.pending.push_back(PendingPage {
            page,
            fetched,
            end_offset,
        });
    }

    /// Persist every pending page whose records all lie below `consumed`
    pub async fn commit_through(&mut self, consumed: u64) -> IngestResult<u32> {
        let mut committed_pages = 0;

        while let Some(next) = self.pending.front().copied() {
            if next.end_offset > consumed {
                break;
            }

            self.store
                .save(self.content_type, &self.area_code, next.page, self.page_size, next.fetched)
                .await?;
            self.pending.pop_front();
            committed_pages += 1;

            debug!(
                content_type = %self.content_type,
                area_code = %self.area_code,
                page = next.page,
                fetched = next.fetched,
                "Cursor advanced"
            );
        }

        if committed_pages > 0 {
            self.committed = self.store.get_last(self.content_type, &self.area_code).await?;
        }

        Ok(committed_pages)
    }

    /// Drop pending advances and force the stored row back to the last
    /// committed state
    pub async fn rollback(&mut self) -> IngestResult<()> {
        let dropped = self.pending.len();
        self.pending.clear();

        if let Err(e) = self
            .store
            .rollback(self.content_type, &self.area_code, self.committed.as_ref())
            .await
        {
            warn!(
                content_type = %self.content_type,
                area_code = %self.area_code,
                error = %e,
                "Cursor rollback failed"
            );
            return Err(e);
        }

        info!(
            content_type = %self.content_type,
            area_code = %self.area_code,
            dropped,
            resume_page = self.resume_page(),
            "Cursor rolled back"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(last_page: u32, page_size: u32, cumulative_count: u64) -> FetchCursor {
        FetchCursor {
            content_type: ContentType::Accommodation,
            area_code: "1".to_string(),
            last_page,
            page_size,
            cumulative_count,
            last_call_time: Utc::now(),
        }
    }

    #[test]
    fn test_resume_without_cursor_starts_at_one() {
        assert_eq!(compute_resume_page(None, 100), 1);
    }

    #[test]
    fn test_resume_same_page_size() {
        assert_eq!(compute_resume_page(Some(&cursor(5, 100, 500)), 100), 6);
    }

    #[test]
    fn test_resume_changed_page_size_uses_cumulative_count() {
        assert_eq!(compute_resume_page(Some(&cursor(5, 100, 500)), 50), 11);
        assert_eq!(compute_resume_page(Some(&cursor(5, 100, 450)), 200), 3);
        assert_eq!(compute_resume_page(Some(&cursor(1, 10, 0)), 20), 1);
    }

    #[tokio::test]
    async fn test_commit_only_fully_consumed_pages() {
        let store = Arc::new(MemoryCursorStore::new());
        let mut cursor = ResumableCursor::open(store.clone(), ContentType::Restaurant, "6", 10)
            .await
            .unwrap();
        assert_eq!(cursor.resume_page(), 1);

        cursor.stage(1, 10, 10);
        cursor.stage(2, 10, 20);

        assert_eq!(cursor.commit_through(15).await.unwrap(), 1);
        let saved = store.get_last(ContentType::Restaurant, "6").await.unwrap().unwrap();
        assert_eq!(saved.last_page, 1);
        assert_eq!(saved.cumulative_count, 10);
        assert_eq!(cursor.resume_page(), 2);

        assert_eq!(cursor.commit_through(20).await.unwrap(), 1);
        assert_eq!(cursor.resume_page(), 3);
        assert_eq!(cursor.pending_pages(), 0);
    }

    #[test]
    fn test_page_end_offset() {
        assert_eq!(page_end_offset(1, 100, 100), 100);
        assert_eq!(page_end_offset(5, 100, 50), 450);
        assert_eq!(page_end_offset(3, 200, 200), 600);
        assert_eq!(page_end_offset(0, 100, 0), 0);
    }

    #[tokio::test]
    async fn test_position_survives_two_page_size_changes() {
        let store = Arc::new(MemoryCursorStore::new());

        let mut cursor = ResumableCursor::open(store.clone(), ContentType::Accommodation, "1", 100)
            .await
            .unwrap();
        for (page, fetched) in [(1, 100), (2, 100), (3, 100), (4, 100), (5, 50)] {
            cursor.stage(page, fetched, page_end_offset(page, 100, fetched));
        }
        cursor.commit_through(450).await.unwrap();
        assert_eq!(cursor.committed().unwrap().cumulative_count, 450);

        // Page 3 at size 200 starts at offset 400 and re-reads 50 records
        let mut cursor = ResumableCursor::open(store.clone(), ContentType::Accommodation, "1", 200)
            .await
            .unwrap();
        assert_eq!(cursor.resume_page(), 3);
        cursor.stage(3, 200, 200);
        cursor.commit_through(200).await.unwrap();
        assert_eq!(cursor.committed().unwrap().cumulative_count, 600);

        let cursor = ResumableCursor::open(store.clone(), ContentType::Accommodation, "1", 50)
            .await
            .unwrap();
        let resume = cursor.resume_page();
        assert_eq!(resume, 13);
        assert_eq!(u64::from(resume - 1) * 50, 600);

        let cursor = ResumableCursor::open(store, ContentType::Accommodation, "1", 100)
            .await
            .unwrap();
        assert_eq!(cursor.resume_page(), 7);
    }

    #[tokio::test]
    async fn test_stale_save_never_moves_offset_back() {
        let store = MemoryCursorStore::new();
        store.save(ContentType::LeisureSports, "3", 3, 200, 200).await.unwrap();
        store.save(ContentType::LeisureSports, "3", 2, 100, 100).await.unwrap();

        let saved = store.get_last(ContentType::LeisureSports, "3").await.unwrap().unwrap();
        assert_eq!(saved.last_page, 2);
        assert_eq!(saved.cumulative_count, 600);
        assert_eq!(compute_resume_page(Some(&saved), 100), 7);
    }

    #[tokio::test]
    async fn test_empty_fetch_is_never_staged() {
        let store = Arc::new(MemoryCursorStore::new());
        let mut cursor = ResumableCursor::open(store.clone(), ContentType::Shopping, "1", 10)
            .await
            .unwrap();
        cursor.stage(1, 0, 0);
        cursor.commit_through(0).await.unwrap();
        assert!(store.get_last(ContentType::Shopping, "1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rollback_restores_committed_state() {
        let store = Arc::new(MemoryCursorStore::new());
        store.save(ContentType::Shopping, "1", 3, 10, 10).await.unwrap();

        let mut cursor = ResumableCursor::open(store.clone(), ContentType::Shopping, "1", 10)
            .await
            .unwrap();
        assert_eq!(cursor.resume_page(), 4);

        cursor.stage(4, 10, 10);
        // Something else advanced the row before the failure was noticed
        store.save(ContentType::Shopping, "1", 4, 10, 10).await.unwrap();

        cursor.rollback().await.unwrap();
        let restored = store.get_last(ContentType::Shopping, "1").await.unwrap().unwrap();
        assert_eq!(restored.last_page, 3);
        assert_eq!(restored.cumulative_count, 30);
        assert_eq!(cursor.pending_pages(), 0);
    }

    #[tokio::test]
    async fn test_rollback_without_prior_cursor_removes_row() {
        let store = Arc::new(MemoryCursorStore::new());
        let mut cursor = ResumableCursor::open(store.clone(), ContentType::Shopping, "2", 10)
            .await
            .unwrap();
        store.save(ContentType::Shopping, "2", 1, 10, 10).await.unwrap();

        cursor.rollback().await.unwrap();
        assert!(store.get_last(ContentType::Shopping, "2").await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_pg_store_tracks_offset_and_rolls_back(pool: PgPool) -> sqlx::Result<()> {
        let store = PgCursorStore::new(pool);
        store.save(ContentType::Accommodation, "1", 1, 100, 100).await.unwrap();
        store.save(ContentType::Accommodation, "1", 2, 100, 80).await.unwrap();

        let cursor = store.get_last(ContentType::Accommodation, "1").await.unwrap().unwrap();
        assert_eq!(cursor.last_page, 2);
        assert_eq!(cursor.cumulative_count, 180);

        // A changed page size re-reads from offset 100; the offset stays put
        store.save(ContentType::Accommodation, "1", 2, 50, 50).await.unwrap();
        let cursor = store.get_last(ContentType::Accommodation, "1").await.unwrap().unwrap();
        assert_eq!(cursor.page_size, 50);
        assert_eq!(cursor.cumulative_count, 180);

        let before = FetchCursor {
            last_page: 1,
            cumulative_count: 100,
            ..cursor.clone()
        };
        store
            .rollback(ContentType::Accommodation, "1", Some(&before))
            .await
            .unwrap();
        let restored = store.get_last(ContentType::Accommodation, "1").await.unwrap().unwrap();
        assert_eq!(restored.last_page, 1);
        assert_eq!(restored.cumulative_count, 100);

        store.rollback(ContentType::Accommodation, "1", None).await.unwrap();
        assert!(store.get_last(ContentType::Accommodation, "1").await.unwrap().is_none());
        Ok(())
    }
}
