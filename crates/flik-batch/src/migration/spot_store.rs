//! Destination store for normalized spots

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::ingest::config::MIGRATION_CHUNK_SIZE;
use crate::ingest::error::IngestResult;

use super::spot::NormalizedSpot;

/// A spot without images whose gallery was never asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotImageTarget {
    pub id: i64,
    pub content_id: String,
}

/// Marks a spot's gallery as asked for; `image_urls` is `None` when it was
/// empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotImageUpdate {
    pub id: i64,
    pub image_urls: Option<String>,
}

#[async_trait]
pub trait SpotStore: Send + Sync {
    /// Insert spots whose `content_id` is not present yet; returns how many
    /// rows were actually inserted. Existing rows are left untouched.
    async fn bulk_insert(&self, spots: &[NormalizedSpot]) -> IngestResult<u64>;

    async fn count(&self) -> IngestResult<i64>;

    /// Image backlog after `after_id`, in id order
    async fn pending_images(&self, after_id: i64, limit: u32) -> IngestResult<Vec<SpotImageTarget>>;

    /// Stamp the gallery marker; returns how many spots received images
    async fn update_images(&self, updates: &[SpotImageUpdate]) -> IngestResult<u64>;
}

pub struct PgSpotStore {
    pool: PgPool,
}

impl PgSpotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_batch(&self, batch: &[NormalizedSpot]) -> IngestResult<u64> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "INSERT INTO spots ({}) ",
            NormalizedSpot::COLUMNS.join(", ")
        ));

        qb.push_values(batch.iter(), |mut b, spot| {
            b.push_bind(spot.spot_type.as_str())
                .push_bind(&spot.address)
                .push_bind(&spot.baby_carriage)
                .push_bind(&spot.category)
                .push_bind(&spot.close_time)
                .push_bind(&spot.content_type_id)
                .push_bind(&spot.content_id)
                .push_bind(&spot.day_off)
                .push_bind(&spot.description)
                .push_bind(&spot.google_place_id)
                .push_bind(&spot.image_urls)
                .push_bind(&spot.info)
                .push_bind(spot.latitude)
                .push_bind(spot.longitude)
                .push_bind(&spot.name)
                .push_bind(&spot.open_time)
                .push_bind(&spot.parking)
                .push_bind(&spot.pet_carriage)
                .push_bind(spot.rating)
                .push_bind(&spot.regn_cd)
                .push_bind(spot.review_count)
                .push_bind(&spot.signgu_cd)
                .push_bind(&spot.tag1)
                .push_bind(&spot.tag2)
                .push_bind(&spot.tag3)
                .push_bind(&spot.tags)
                .push_bind(&spot.label_depth1)
                .push_bind(&spot.label_depth2)
                .push_bind(&spot.label_depth3)
                .push_bind(&spot.check_in_time)
                .push_bind(&spot.check_out_time)
                .push_bind(spot.cooking)
                .push_bind(&spot.facilities)
                .push_bind(&spot.cuisine_type)
                .push_bind(&spot.fee)
                .push_bind(&spot.age_limit)
                .push_bind(&spot.event_end_date)
                .push_bind(&spot.event_start_date)
                .push_bind(&spot.running_time)
                .push_bind(&spot.sponsor)
                .push_bind(&spot.first_menu)
                .push_bind(&spot.kids_facility)
                .push_bind(&spot.price_range)
                .push_bind(&spot.reservation)
                .push_bind(&spot.take_away)
                .push_bind(&spot.treat_menu)
                .push_bind(&spot.products)
                .push_bind(&spot.exp_guide)
                .push_bind(&spot.time);
        });
        qb.push(" ON CONFLICT (content_id) DO NOTHING");

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SpotStore for PgSpotStore {
    async fn bulk_insert(&self, spots: &[NormalizedSpot]) -> IngestResult<u64> {
        let mut inserted = 0;
        for batch in spots.chunks(MIGRATION_CHUNK_SIZE) {
            inserted += self.insert_batch(batch).await?;
        }
        Ok(inserted)
    }

    async fn count(&self) -> IngestResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM spots")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn pending_images(&self, after_id: i64, limit: u32) -> IngestResult<Vec<SpotImageTarget>> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT id, content_id FROM spots
            WHERE image_urls IS NULL AND images_checked_at IS NULL AND id > $1
            ORDER BY id
            LIMIT $2
            "#,
        )
        .bind(after_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, content_id)| SpotImageTarget { id, content_id })
            .collect())
    }

    async fn update_images(&self, updates: &[SpotImageUpdate]) -> IngestResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut with_images = 0;
        for update in updates {
            let result = sqlx::query(
                "UPDATE spots SET image_urls = COALESCE($1, image_urls), images_checked_at = NOW() WHERE id = $2",
            )
            .bind(&update.image_urls)
            .bind(update.id)
            .execute(&mut *tx)
            .await?;
            if update.image_urls.is_some() {
                with_images += result.rows_affected();
            }
        }
        tx.commit().await?;
        Ok(with_images)
    }
}

#[derive(Debug, Clone)]
struct StoredSpot {
    id: i64,
    spot: NormalizedSpot,
    images_checked: bool,
}

#[derive(Default)]
struct MemorySpots {
    next_id: i64,
    by_content_id: BTreeMap<String, StoredSpot>,
}

/// Spots keyed by `content_id`, with ids assigned in insert order
#[derive(Default)]
pub struct MemorySpotStore {
    spots: Mutex<MemorySpots>,
}

impl MemorySpotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, content_id: &str) -> Option<NormalizedSpot> {
        self.spots
            .lock()
            .await
            .by_content_id
            .get(content_id)
            .map(|s| s.spot.clone())
    }
}

#[async_trait]
impl SpotStore for MemorySpotStore {
    async fn bulk_insert(&self, spots: &[NormalizedSpot]) -> IngestResult<u64> {
        let mut stored = self.spots.lock().await;
        let mut inserted = 0;
        for spot in spots {
            if !stored.by_content_id.contains_key(&spot.content_id) {
                stored.next_id += 1;
                let id = stored.next_id;
                stored.by_content_id.insert(
                    spot.content_id.clone(),
                    StoredSpot {
                        id,
                        spot: spot.clone(),
                        images_checked: false,
                    },
                );
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn count(&self) -> IngestResult<i64> {
        Ok(self.spots.lock().await.by_content_id.len() as i64)
    }

    async fn pending_images(&self, after_id: i64, limit: u32) -> IngestResult<Vec<SpotImageTarget>> {
        let stored = self.spots.lock().await;
        let mut targets: Vec<SpotImageTarget> = stored
            .by_content_id
            .values()
            .filter(|s| s.id > after_id && s.spot.image_urls.is_none() && !s.images_checked)
            .map(|s| SpotImageTarget {
                id: s.id,
                content_id: s.spot.content_id.clone(),
            })
            .collect();
        targets.sort_by_key(|t| t.id);
        targets.truncate(limit as usize);
        Ok(targets)
    }

    async fn update_images(&self, updates: &[SpotImageUpdate]) -> IngestResult<u64> {
        let mut stored = self.spots.lock().await;
        let mut with_images = 0;
        for update in updates {
            if let Some(entry) = stored.by_content_id.values_mut().find(|s| s.id == update.id) {
                entry.images_checked = true;
                if update.image_urls.is_some() {
                    entry.spot.image_urls = update.image_urls.clone();
                    with_images += 1;
                }
            }
        }
        Ok(with_images)
    }
}
