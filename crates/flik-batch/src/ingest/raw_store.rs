//! Persistence of raw tourism records, one table per content type

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{postgres::PgRow, PgPool, Postgres, Row, Transaction};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::content_type::ContentType;
use super::error::IngestResult;
use super::record::{CommonColumns, DetailFields, DomainFields, IntroDetail, LabelDetail, RawRecord};

/// Identifies one raw row
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawKey {
    pub content_type: ContentType,
    pub content_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetailUpdate {
    pub key: RawKey,
    pub detail: IntroDetail,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelUpdate {
    pub key: RawKey,
    pub labels: LabelDetail,
}

/// A row Google Places has not been asked about yet
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceCandidate {
    pub key: RawKey,
    pub title: String,
    pub addr1: String,
}

/// What Google Places knows about one matched place
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceMatch {
    pub place_id: String,
    pub rating: Option<f64>,
    pub review_count: Option<i32>,
    pub reviews: Vec<String>,
}

/// Stamps the places marker; `found` is `None` when nothing matched
#[derive(Debug, Clone, PartialEq)]
pub struct PlacesUpdate {
    pub key: RawKey,
    pub found: Option<PlaceMatch>,
}

/// Separator for review texts kept in one column
pub const REVIEW_SEPARATOR: &str = "|||";

#[async_trait]
pub trait RawStore: Send + Sync {
    /// Upsert listings and any enrichment they carry in one transaction
    async fn upsert_chunk(&self, content_type: ContentType, records: &[RawRecord]) -> IngestResult<usize>;

    /// Rows whose detail-intro was never applied
    async fn pending_detail(&self, limit: u32) -> IngestResult<Vec<RawKey>>;

    /// Rows that have no classification labels yet
    async fn pending_labels(&self, limit: u32) -> IngestResult<Vec<RawKey>>;

    async fn update_details(&self, updates: &[DetailUpdate]) -> IngestResult<usize>;

    async fn update_labels(&self, updates: &[LabelUpdate]) -> IngestResult<usize>;

    /// Names for three classification codes; unknown codes give `""`
    async fn label_names(&self, codes: [&str; 3]) -> IngestResult<[String; 3]>;

    /// Rows ready for migration, in insertion order
    async fn load_eligible(&self, content_type: ContentType) -> IngestResult<Vec<RawRecord>>;

    /// Rows of one table without a rating that Google Places was never
    /// asked about, in insertion order
    async fn pending_places(&self, content_type: ContentType, limit: u32) -> IngestResult<Vec<PlaceCandidate>>;

    async fn update_places(&self, updates: &[PlacesUpdate]) -> IngestResult<usize>;
}

const LISTING_COLUMNS: &[&str] = &[
    "content_id",
    "content_type_id",
    "content_type_name",
    "title",
    "addr1",
    "addr2",
    "first_image",
    "first_image2",
    "map_x",
    "map_y",
    "area_code",
    "sigungu_code",
    "cat1",
    "cat2",
    "cat3",
    "created_time",
    "modified_time",
    "tel",
    "zipcode",
    "source",
];

fn listing_values(record: &RawRecord) -> [&str; 20] {
    [
        record.content_id.as_str(),
        record.content_type_id.as_str(),
        record.content_type_name.as_str(),
        record.title.as_str(),
        record.addr1.as_str(),
        record.addr2.as_str(),
        record.first_image.as_str(),
        record.first_image2.as_str(),
        record.map_x.as_str(),
        record.map_y.as_str(),
        record.area_code.as_str(),
        record.sigungu_code.as_str(),
        record.cat1.as_str(),
        record.cat2.as_str(),
        record.cat3.as_str(),
        record.created_time.as_str(),
        record.modified_time.as_str(),
        record.tel.as_str(),
        record.zipcode.as_str(),
        record.source.as_str(),
    ]
}

fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn upsert_listing_sql(content_type: ContentType) -> String {
    let n = LISTING_COLUMNS.len();
    format!(
        r#"
        INSERT INTO {table} ({columns}, raw_data, created_at, updated_at)
        VALUES ({values}, ${raw}, NOW(), NOW())
        ON CONFLICT (content_id) DO UPDATE
            SET title = EXCLUDED.title,
                addr1 = EXCLUDED.addr1,
                first_image = EXCLUDED.first_image,
                modified_time = EXCLUDED.modified_time,
                updated_at = NOW()
        "#,
        table = content_type.table(),
        columns = LISTING_COLUMNS.join(", "),
        values = placeholders(1, n),
        raw = n + 1,
    )
}

fn update_detail_sql(content_type: ContentType) -> String {
    let columns: Vec<&str> = CommonColumns::COLUMNS
        .iter()
        .chain(DomainFields::columns_for(content_type).iter())
        .copied()
        .collect();
    let assignments = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ${}", c, i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let extra = columns.len() + 1;
    let id = columns.len() + 2;

    format!(
        "UPDATE {} SET {}, raw_data = COALESCE(raw_data, '{{}}'::jsonb) || jsonb_build_object('intro_extra', ${}::jsonb), detail_fetched_at = NOW(), updated_at = NOW() WHERE content_id = ${}",
        content_type.table(),
        assignments,
        extra,
        id
    )
}

fn update_labels_sql(content_type: ContentType) -> String {
    format!(
        "UPDATE {} SET overview = $1, label_depth1 = $2, label_depth2 = $3, label_depth3 = $4, updated_at = NOW() WHERE content_id = $5",
        content_type.table()
    )
}

fn update_places_sql(content_type: ContentType) -> String {
    format!(
        r#"
        UPDATE {}
        SET google_place_id = COALESCE($1, google_place_id),
            google_rating = COALESCE($2, google_rating),
            google_review_count = COALESCE($3, google_review_count),
            google_reviews = COALESCE($4, google_reviews),
            places_checked_at = NOW(),
            updated_at = NOW()
        WHERE content_id = $5
        "#,
        content_type.table()
    )
}

async fn apply_detail(
    tx: &mut Transaction<'_, Postgres>,
    content_type: ContentType,
    content_id: &str,
    detail: &IntroDetail,
) -> IngestResult<u64> {
    let sql = update_detail_sql(content_type);
    let mut query = sqlx::query(&sql);
    for value in detail.common.values() {
        query = query.bind(value);
    }
    for value in detail.domain.values() {
        query = query.bind(value);
    }
    let extra = serde_json::to_value(&detail.extra)?;
    let result = query.bind(extra).bind(content_id).execute(&mut **tx).await?;
    Ok(result.rows_affected())
}

async fn apply_labels(
    tx: &mut Transaction<'_, Postgres>,
    content_type: ContentType,
    content_id: &str,
    labels: &LabelDetail,
) -> IngestResult<u64> {
    let result = sqlx::query(&update_labels_sql(content_type))
        .bind(&labels.overview)
        .bind(&labels.label_depth1)
        .bind(&labels.label_depth2)
        .bind(&labels.label_depth3)
        .bind(content_id)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}

fn pending_sql(condition: &str) -> String {
    let selects = ContentType::ALL
        .iter()
        .map(|ct| {
            format!(
                "SELECT content_type_id, content_id, id FROM {} WHERE {}",
                ct.table(),
                condition
            )
        })
        .collect::<Vec<_>>()
        .join(" UNION ALL ");
    format!(
        "SELECT content_type_id, content_id FROM ({}) pending ORDER BY content_type_id, id LIMIT $1",
        selects
    )
}

fn text(row: &PgRow, column: &str) -> IngestResult<String> {
    Ok(row.try_get::<Option<String>, _>(column)?.unwrap_or_default())
}

fn record_from_row(content_type: ContentType, row: &PgRow) -> IngestResult<RawRecord> {
    let mut fields = DetailFields::new();
    for column in DomainFields::columns_for(content_type) {
        fields.insert((*column).to_string(), text(row, column)?);
    }

    let common = CommonColumns {
        usetime: text(row, "usetime")?,
        restdate: text(row, "restdate")?,
        parking: text(row, "parking")?,
        parkingfee: text(row, "parkingfee")?,
        infocenter: text(row, "infocenter")?,
        chkbabycarriage: text(row, "chkbabycarriage")?,
        chkpet: text(row, "chkpet")?,
        chkcreditcard: text(row, "chkcreditcard")?,
    };

    let overview = text(row, "overview")?;
    let raw_data = match row.try_get::<Option<Value>, _>("raw_data")? {
        Some(Value::Object(map)) => map,
        _ => Default::default(),
    };

    Ok(RawRecord {
        content_id: text(row, "content_id")?,
        content_type_id: text(row, "content_type_id")?,
        content_type_name: text(row, "content_type_name")?,
        title: text(row, "title")?,
        addr1: text(row, "addr1")?,
        addr2: text(row, "addr2")?,
        first_image: text(row, "first_image")?,
        first_image2: text(row, "first_image2")?,
        map_x: text(row, "map_x")?,
        map_y: text(row, "map_y")?,
        area_code: text(row, "area_code")?,
        sigungu_code: text(row, "sigungu_code")?,
        cat1: text(row, "cat1")?,
        cat2: text(row, "cat2")?,
        cat3: text(row, "cat3")?,
        created_time: text(row, "created_time")?,
        modified_time: text(row, "modified_time")?,
        tel: text(row, "tel")?,
        zipcode: text(row, "zipcode")?,
        overview: overview.clone(),
        source: text(row, "source")?,
        collected_at: None,
        detail: Some(IntroDetail {
            common,
            domain: DomainFields::from_detail(content_type, &fields),
            extra: DetailFields::new(),
        }),
        labels: Some(LabelDetail {
            overview,
            label_depth1: text(row, "label_depth1")?,
            label_depth2: text(row, "label_depth2")?,
            label_depth3: text(row, "label_depth3")?,
        }),
        google_place_id: row.try_get("google_place_id")?,
        google_rating: row.try_get("google_rating")?,
        google_review_count: row.try_get("google_review_count")?,
        google_reviews: row
            .try_get::<Option<String>, _>("google_reviews")?
            .map(|joined| {
                joined
                    .split(REVIEW_SEPARATOR)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        places_checked_at: row.try_get("places_checked_at")?,
        raw_data,
    })
}

fn keys_from_rows(rows: Vec<(String, String)>) -> Vec<RawKey> {
    rows.into_iter()
        .filter_map(|(code, content_id)| match ContentType::from_code(&code) {
            Ok(content_type) => Some(RawKey {
                content_type,
                content_id,
            }),
            Err(e) => {
                warn!(content_id = %content_id, error = %e, "Skipping raw row with unknown content type");
                None
            },
        })
        .collect()
}

/// Raw tables in Postgres
pub struct PgRawStore {
    pool: PgPool,
}

impl PgRawStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RawStore for PgRawStore {
    async fn upsert_chunk(&self, content_type: ContentType, records: &[RawRecord]) -> IngestResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let sql = upsert_listing_sql(content_type);
        let mut tx = self.pool.begin().await?;

        for record in records {
            let mut query = sqlx::query(&sql);
            for value in listing_values(record) {
                query = query.bind(value);
            }
            query
                .bind(Value::Object(record.raw_data.clone()))
                .execute(&mut *tx)
                .await?;

            if let Some(detail) = &record.detail {
                apply_detail(&mut tx, content_type, &record.content_id, detail).await?;
            }
            if let Some(labels) = &record.labels {
                apply_labels(&mut tx, content_type, &record.content_id, labels).await?;
            }
        }

        tx.commit().await?;
        debug!(table = content_type.table(), count = records.len(), "Raw chunk upserted");
        Ok(records.len())
    }

    async fn pending_detail(&self, limit: u32) -> IngestResult<Vec<RawKey>> {
        let rows: Vec<(String, String)> = sqlx::query_as(&pending_sql("detail_fetched_at IS NULL"))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(keys_from_rows(rows))
    }

    async fn pending_labels(&self, limit: u32) -> IngestResult<Vec<RawKey>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as(&pending_sql("label_depth1 IS NULL OR label_depth1 = ''"))
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?;
        Ok(keys_from_rows(rows))
    }

    async fn update_details(&self, updates: &[DetailUpdate]) -> IngestResult<usize> {
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for update in updates {
            updated += apply_detail(&mut tx, update.key.content_type, &update.key.content_id, &update.detail)
                .await?;
        }
        tx.commit().await?;
        Ok(updated as usize)
    }

    async fn update_labels(&self, updates: &[LabelUpdate]) -> IngestResult<usize> {
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for update in updates {
            updated += apply_labels(&mut tx, update.key.content_type, &update.key.content_id, &update.labels)
                .await?;
        }
        tx.commit().await?;
        Ok(updated as usize)
    }

    async fn label_names(&self, codes: [&str; 3]) -> IngestResult<[String; 3]> {
        let wanted: Vec<String> = codes
            .iter()
            .filter(|c| !c.trim().is_empty())
            .map(|c| c.trim().to_string())
            .collect();
        if wanted.is_empty() {
            return Ok(Default::default());
        }

        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT code, name FROM classification_labels WHERE code = ANY($1)")
                .bind(&wanted)
                .fetch_all(&self.pool)
                .await?;
        let names: HashMap<String, String> = rows.into_iter().collect();

        Ok(codes.map(|code| names.get(code.trim()).cloned().unwrap_or_default()))
    }

    async fn load_eligible(&self, content_type: ContentType) -> IngestResult<Vec<RawRecord>> {
        let sql = format!(
            r#"
            SELECT * FROM {}
            WHERE COALESCE(label_depth1, '') <> ''
              AND COALESCE(addr1, '') <> ''
              AND COALESCE(overview, '') <> ''
            ORDER BY id
            "#,
            content_type.table()
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(|row| record_from_row(content_type, row)).collect()
    }

    async fn pending_places(&self, content_type: ContentType, limit: u32) -> IngestResult<Vec<PlaceCandidate>> {
        let sql = format!(
            r#"
            SELECT content_id, COALESCE(title, ''), COALESCE(addr1, '') FROM {}
            WHERE google_rating IS NULL AND places_checked_at IS NULL
            ORDER BY id
            LIMIT $1
            "#,
            content_type.table()
        );
        let rows: Vec<(String, String, String)> = sqlx::query_as(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(content_id, title, addr1)| PlaceCandidate {
                key: RawKey {
                    content_type,
                    content_id,
                },
                title,
                addr1,
            })
            .collect())
    }

    async fn update_places(&self, updates: &[PlacesUpdate]) -> IngestResult<usize> {
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for update in updates {
            let found = update.found.as_ref();
            let reviews = found
                .filter(|m| !m.reviews.is_empty())
                .map(|m| m.reviews.join(REVIEW_SEPARATOR));
            let result = sqlx::query(&update_places_sql(update.key.content_type))
                .bind(found.map(|m| m.place_id.as_str()))
                .bind(found.and_then(|m| m.rating))
                .bind(found.and_then(|m| m.review_count))
                .bind(reviews)
                .bind(&update.key.content_id)
                .execute(&mut *tx)
                .await?;
            updated += result.rows_affected();
        }
        tx.commit().await?;
        Ok(updated as usize)
    }
}

#[derive(Debug, Clone)]
struct StoredRecord {
    seq: u64,
    record: RawRecord,
}

#[derive(Default)]
struct MemoryTables {
    next_seq: u64,
    rows: BTreeMap<RawKey, StoredRecord>,
}

/// In-memory raw tables for tests and dry runs
#[derive(Default)]
pub struct MemoryRawStore {
    tables: Mutex<MemoryTables>,
    labels: HashMap<String, String>,
}

impl MemoryRawStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the classification label lookup
    pub fn with_labels<I, K, V>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            tables: Mutex::default(),
            labels: labels.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub async fn get(&self, content_type: ContentType, content_id: &str) -> Option<RawRecord> {
        let key = RawKey {
            content_type,
            content_id: content_id.to_string(),
        };
        self.tables.lock().await.rows.get(&key).map(|s| s.record.clone())
    }

    pub async fn count(&self, content_type: ContentType) -> usize {
        self.tables
            .lock()
            .await
            .rows
            .keys()
            .filter(|k| k.content_type == content_type)
            .count()
    }

    async fn pending(&self, limit: u32, predicate: impl Fn(&RawRecord) -> bool + Send) -> Vec<RawKey> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<&StoredRecord> = tables.rows.values().filter(|s| predicate(&s.record)).collect();
        rows.sort_by_key(|s| (s.record.content_type_id.clone(), s.seq));
        rows.into_iter()
            .take(limit as usize)
            .filter_map(|s| {
                ContentType::from_code(&s.record.content_type_id)
                    .ok()
                    .map(|content_type| RawKey {
                        content_type,
                        content_id: s.record.content_id.clone(),
                    })
            })
            .collect()
    }
}

#[async_trait]
impl RawStore for MemoryRawStore {
    async fn upsert_chunk(&self, content_type: ContentType, records: &[RawRecord]) -> IngestResult<usize> {
        let mut tables = self.tables.lock().await;
        for record in records {
            let key = RawKey {
                content_type,
                content_id: record.content_id.clone(),
            };
            let seq = tables.next_seq;
            match tables.rows.get_mut(&key) {
                Some(stored) => {
                    stored.record.title = record.title.clone();
                    stored.record.addr1 = record.addr1.clone();
                    stored.record.first_image = record.first_image.clone();
                    stored.record.modified_time = record.modified_time.clone();
                    if record.detail.is_some() {
                        stored.record.detail = record.detail.clone();
                    }
                    if let Some(labels) = &record.labels {
                        stored.record.overview = labels.overview.clone();
                        stored.record.labels = Some(labels.clone());
                    }
                },
                None => {
                    let mut record = record.clone();
                    if let Some(labels) = &record.labels {
                        record.overview = labels.overview.clone();
                    }
                    record.collected_at.get_or_insert_with(Utc::now);
                    tables.rows.insert(key, StoredRecord { seq, record });
                    tables.next_seq += 1;
                },
            }
        }
        Ok(records.len())
    }

    async fn pending_detail(&self, limit: u32) -> IngestResult<Vec<RawKey>> {
        Ok(self
            .pending(limit, |r| r.detail.is_none())
            .await)
    }

    async fn pending_labels(&self, limit: u32) -> IngestResult<Vec<RawKey>> {
        Ok(self.pending(limit, |r| r.label_depth1().is_empty()).await)
    }

    async fn update_details(&self, updates: &[DetailUpdate]) -> IngestResult<usize> {
        let mut tables = self.tables.lock().await;
        let mut updated = 0;
        for update in updates {
            if let Some(stored) = tables.rows.get_mut(&update.key) {
                stored.record.detail = Some(update.detail.clone());
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn update_labels(&self, updates: &[LabelUpdate]) -> IngestResult<usize> {
        let mut tables = self.tables.lock().await;
        let mut updated = 0;
        for update in updates {
            if let Some(stored) = tables.rows.get_mut(&update.key) {
                stored.record.overview = update.labels.overview.clone();
                stored.record.labels = Some(update.labels.clone());
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn label_names(&self, codes: [&str; 3]) -> IngestResult<[String; 3]> {
        Ok(codes.map(|code| self.labels.get(code.trim()).cloned().unwrap_or_default()))
    }

    async fn load_eligible(&self, content_type: ContentType) -> IngestResult<Vec<RawRecord>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<&StoredRecord> = tables
            .rows
            .iter()
            .filter(|(k, s)| {
                k.content_type == content_type
                    && !s.record.label_depth1().is_empty()
                    && !s.record.addr1.is_empty()
                    && !s.record.overview.is_empty()
            })
            .map(|(_, s)| s)
            .collect();
        rows.sort_by_key(|s| s.seq);
        Ok(rows.into_iter().map(|s| s.record.clone()).collect())
    }

    async fn pending_places(&self, content_type: ContentType, limit: u32) -> IngestResult<Vec<PlaceCandidate>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<(&RawKey, &StoredRecord)> = tables
            .rows
            .iter()
            .filter(|(k, s)| {
                k.content_type == content_type
                    && s.record.google_rating.is_none()
                    && s.record.places_checked_at.is_none()
            })
            .collect();
        rows.sort_by_key(|(_, s)| s.seq);
        Ok(rows
            .into_iter()
            .take(limit as usize)
            .map(|(key, s)| PlaceCandidate {
                key: key.clone(),
                title: s.record.title.clone(),
                addr1: s.record.addr1.clone(),
            })
            .collect())
    }

    async fn update_places(&self, updates: &[PlacesUpdate]) -> IngestResult<usize> {
        let mut tables = self.tables.lock().await;
        let mut updated = 0;
        for update in updates {
            if let Some(stored) = tables.rows.get_mut(&update.key) {
                let record = &mut stored.record;
                if let Some(found) = &update.found {
                    record.google_place_id = Some(found.place_id.clone());
                    record.google_rating = found.rating.or(record.google_rating);
                    record.google_review_count = found.review_count.or(record.google_review_count);
                    if !found.reviews.is_empty() {
                        record.google_reviews = found.reviews.clone();
                    }
                }
                record.places_checked_at = Some(Utc::now());
                updated += 1;
            }
        }
        Ok(updated)
    }
}
