//! Google Places rating backfill over raw rows.
//!
//! Each row is looked up by text search on `"{title} {addr1}"`; the first
//! hit's rating, rating count and review texts are written back. A search
//! with no hit stamps the row as checked so it is not asked about again.
//! Calls count against their own daily budget, separate from the tourism
//! API's.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::content_type::ContentType;
use super::error::{IngestError, IngestResult, QuotaSource};
use super::rate_limiter::RateLimiter;
use super::raw_store::{PlaceCandidate, PlaceMatch, PlacesUpdate, RawStore};
use super::stage::{ItemProcessor, ItemReader, ItemWriter};

pub const DEFAULT_PLACES_BASE_URL: &str = "https://maps.googleapis.com/maps/api/place";

pub const DEFAULT_PLACES_TIMEOUT_SECS: u64 = 10;

/// Rows per write
pub const PLACES_CHUNK_SIZE: usize = 10;

/// Review texts kept per place
pub const MAX_REVIEWS: usize = 10;

/// Categories backfilled, in launch order. Festivals have no stable place.
pub const PLACES_CONTENT_TYPES: [ContentType; 6] = [
    ContentType::TouristAttraction,
    ContentType::Restaurant,
    ContentType::Accommodation,
    ContentType::CulturalFacility,
    ContentType::LeisureSports,
    ContentType::Shopping,
];

const LANGUAGE: &str = "ko";
const DETAIL_FIELDS: &str = "rating,reviews,user_ratings_total";

/// Result of a text search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Found(String),
    NoMatch,
    /// The call failed softly; ask again on a later run
    Unavailable,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceDetails {
    pub rating: Option<f64>,
    pub review_count: Option<i32>,
    pub reviews: Vec<String>,
}

#[async_trait]
pub trait PlacesApi: Send + Sync {
    async fn text_search(&self, query: &str) -> IngestResult<SearchOutcome>;

    /// `None` on any non-quota failure
    async fn place_details(&self, place_id: &str) -> IngestResult<Option<PlaceDetails>>;
}

pub struct GooglePlacesGateway {
    client: Client,
    base_url: String,
    api_key: String,
    rate_limiter: Arc<RateLimiter>,
}

impl GooglePlacesGateway {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        rate_limiter: Arc<RateLimiter>,
    ) -> IngestResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IngestError::TransientFetch(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            rate_limiter,
        })
    }

    /// GET and parse; returns the body together with its `status` field
    async fn call(&self, endpoint: &str, params: &[(&str, &str)]) -> IngestResult<Option<(Value, String)>> {
        self.rate_limiter.acquire_or_fail().await?;

        let url = format!("{}/{}", self.base_url, endpoint);
        let response = match self
            .client
            .get(&url)
            .query(params)
            .query(&[("key", self.api_key.as_str()), ("language", LANGUAGE)])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(endpoint, error = %e, "Google Places request failed");
                return Ok(None);
            },
        };

        let status = response.status();
        if !status.is_success() {
            warn!(endpoint, status = status.as_u16(), "Google Places returned an error status");
            return Ok(None);
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!(endpoint, error = %e, "Google Places returned malformed JSON");
                return Ok(None);
            },
        };

        let api_status = body
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if api_status == "OVER_QUERY_LIMIT" {
            warn!(endpoint, "Google Places reported its request limit");
            return Err(IngestError::quota(QuotaSource::Provider));
        }

        Ok(Some((body, api_status)))
    }
}

#[async_trait]
impl PlacesApi for GooglePlacesGateway {
    async fn text_search(&self, query: &str) -> IngestResult<SearchOutcome> {
        let Some((body, status)) = self.call("textsearch/json", &[("query", query)]).await? else {
            return Ok(SearchOutcome::Unavailable);
        };

        match status.as_str() {
            "OK" => {},
            "ZERO_RESULTS" => return Ok(SearchOutcome::NoMatch),
            other => {
                warn!(query, status = other, "Google Places text search was not answered");
                return Ok(SearchOutcome::Unavailable);
            },
        }

        let place_id = body
            .pointer("/results/0/place_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty());
        Ok(match place_id {
            Some(id) => SearchOutcome::Found(id.to_string()),
            None => SearchOutcome::NoMatch,
        })
    }

    async fn place_details(&self, place_id: &str) -> IngestResult<Option<PlaceDetails>> {
        let params = [("place_id", place_id), ("fields", DETAIL_FIELDS)];
        let Some((body, status)) = self.call("details/json", &params).await? else {
            return Ok(None);
        };
        if status != "OK" {
            warn!(place_id, status = %status, "Google Places details were not answered");
            return Ok(None);
        }

        let Some(result) = body.get("result") else {
            return Ok(None);
        };

        let reviews = result
            .get("reviews")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|r| r.get("text").and_then(Value::as_str))
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .take(MAX_REVIEWS)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(PlaceDetails {
            rating: result.get("rating").and_then(Value::as_f64),
            review_count: result
                .get("user_ratings_total")
                .and_then(Value::as_i64)
                .and_then(|n| i32::try_from(n).ok()),
            reviews,
        }))
    }
}

/// Loads one table's unchecked rows on first read
pub struct PlaceCandidateReader {
    store: Arc<dyn RawStore>,
    content_type: ContentType,
    limit: u32,
    buffer: Option<VecDeque<PlaceCandidate>>,
}

impl PlaceCandidateReader {
    pub fn new(store: Arc<dyn RawStore>, content_type: ContentType, limit: u32) -> Self {
        Self {
            store,
            content_type,
            limit,
            buffer: None,
        }
    }
}

#[async_trait]
impl ItemReader for PlaceCandidateReader {
    type Item = PlaceCandidate;

    async fn read(&mut self) -> IngestResult<Option<PlaceCandidate>> {
        if self.buffer.is_none() {
            let candidates = self.store.pending_places(self.content_type, self.limit).await?;
            debug!(
                content_type = %self.content_type,
                count = candidates.len(),
                "Loaded rows without a Google rating"
            );
            self.buffer = Some(candidates.into());
        }
        Ok(self.buffer.as_mut().and_then(VecDeque::pop_front))
    }
}

pub struct PlacesProcessor {
    api: Arc<dyn PlacesApi>,
    api_calls: u64,
}

impl PlacesProcessor {
    pub fn new(api: Arc<dyn PlacesApi>) -> Self {
        Self { api, api_calls: 0 }
    }
}

#[async_trait]
impl ItemProcessor for PlacesProcessor {
    type In = PlaceCandidate;
    type Out = PlacesUpdate;

    async fn process(&mut self, candidate: PlaceCandidate) -> IngestResult<Option<PlacesUpdate>> {
        let query = format!("{} {}", candidate.title.trim(), candidate.addr1.trim());
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        let outcome = self.api.text_search(query).await?;
        self.api_calls += 1;

        let place_id = match outcome {
            SearchOutcome::Found(place_id) => place_id,
            SearchOutcome::NoMatch => {
                info!(content_id = %candidate.key.content_id, query, "No Google place found");
                return Ok(Some(PlacesUpdate {
                    key: candidate.key,
                    found: None,
                }));
            },
            SearchOutcome::Unavailable => return Ok(None),
        };

        let details = self.api.place_details(&place_id).await?;
        self.api_calls += 1;

        Ok(details.map(|d| PlacesUpdate {
            key: candidate.key,
            found: Some(PlaceMatch {
                place_id,
                rating: d.rating,
                review_count: d.review_count,
                reviews: d.reviews,
            }),
        }))
    }

    fn api_calls(&self) -> u64 {
        self.api_calls
    }
}

/// Counts only rows that matched a place
pub struct PlacesWriter {
    store: Arc<dyn RawStore>,
}

impl PlacesWriter {
    pub fn new(store: Arc<dyn RawStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ItemWriter for PlacesWriter {
    type Item = PlacesUpdate;

    async fn write(&mut self, items: &[PlacesUpdate]) -> IngestResult<usize> {
        self.store.update_places(items).await?;
        Ok(items.iter().filter(|u| u.found.is_some()).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::rate_limiter::{MemoryRateBudgetStore, PLACES_BUDGET_KEY_PREFIX};
    use crate::ingest::raw_store::MemoryRawStore;
    use crate::ingest::stage::ChunkStage;
    use crate::ingest::testing::{listing, FakePlacesApi};
    use flik_common::types::StageState;
    use serde_json::json;
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn gateway(server: &MockServer, limit: u32) -> (GooglePlacesGateway, Arc<RateLimiter>) {
        let limiter = Arc::new(
            RateLimiter::new(Arc::new(MemoryRateBudgetStore::new()), limit, 9)
                .with_key_prefix(PLACES_BUDGET_KEY_PREFIX),
        );
        let gateway =
            GooglePlacesGateway::new(server.uri(), "places-key", Duration::from_secs(5), limiter.clone())
                .unwrap();
        (gateway, limiter)
    }

    #[tokio::test]
    async fn test_text_search_takes_first_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/textsearch/json"))
            .and(query_param("query", "경복궁 서울특별시 종로구 사직로 161"))
            .and(query_param("key", "places-key"))
            .and(query_param("language", "ko"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "results": [{ "place_id": "ChIJ-first" }, { "place_id": "ChIJ-second" }]
            })))
            .mount(&server)
            .await;

        let (gateway, limiter) = gateway(&server, 10);
        let outcome = gateway
            .text_search("경복궁 서울특별시 종로구 사직로 161")
            .await
            .unwrap();
        assert_eq!(outcome, SearchOutcome::Found("ChIJ-first".to_string()));
        assert_eq!(limiter.used().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_text_search_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/textsearch/json"))
            .and(query_param("query", "nowhere"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ZERO_RESULTS", "results": [] })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/textsearch/json"))
            .and(query_param("query", "denied"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "REQUEST_DENIED" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/textsearch/json"))
            .and(query_param("query", "busy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "OVER_QUERY_LIMIT" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/textsearch/json"))
            .and(query_param("query", "down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let (gateway, _) = gateway(&server, 10);
        assert_eq!(gateway.text_search("nowhere").await.unwrap(), SearchOutcome::NoMatch);
        assert_eq!(gateway.text_search("denied").await.unwrap(), SearchOutcome::Unavailable);
        assert_eq!(gateway.text_search("down").await.unwrap(), SearchOutcome::Unavailable);
        assert!(gateway.text_search("busy").await.unwrap_err().is_quota());
    }

    #[tokio::test]
    async fn test_place_details_parses_rating_and_reviews() {
        let server = MockServer::start().await;
        let reviews: Vec<Value> = (0..12)
            .map(|i| json!({ "text": format!("리뷰 {}", i), "rating": 5 }))
            .chain([json!({ "text": "  " })])
            .collect();
        Mock::given(method("GET"))
            .and(path("/details/json"))
            .and(query_param("place_id", "ChIJ-first"))
            .and(query_param("fields", "rating,reviews,user_ratings_total"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "result": { "rating": 4.7, "user_ratings_total": 51234, "reviews": reviews }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/details/json"))
            .and(query_param("place_id", "ChIJ-unrated"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "OK", "result": {} })))
            .mount(&server)
            .await;

        let (gateway, _) = gateway(&server, 10);
        let details = gateway.place_details("ChIJ-first").await.unwrap().unwrap();
        assert_eq!(details.rating, Some(4.7));
        assert_eq!(details.review_count, Some(51234));
        assert_eq!(details.reviews.len(), MAX_REVIEWS);
        assert_eq!(details.reviews[0], "리뷰 0");

        let unrated = gateway.place_details("ChIJ-unrated").await.unwrap().unwrap();
        assert_eq!(unrated, PlaceDetails::default());
    }

    #[tokio::test]
    async fn test_exhausted_places_budget_never_reaches_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "OK", "results": [] })))
            .expect(0)
            .mount(&server)
            .await;

        let (gateway, _) = gateway(&server, 0);
        assert!(gateway.text_search("경복궁").await.unwrap_err().is_quota());
    }

    async fn seeded(ids: &[&str]) -> Arc<MemoryRawStore> {
        let store = Arc::new(MemoryRawStore::new());
        let records: Vec<_> = ids
            .iter()
            .map(|id| listing(ContentType::Restaurant, id, &format!("식당 {}", id), "1"))
            .collect();
        store.upsert_chunk(ContentType::Restaurant, &records).await.unwrap();
        store
    }

    async fn backfill(api: Arc<FakePlacesApi>, store: Arc<MemoryRawStore>) -> crate::ingest::stage::StageOutcome {
        ChunkStage::new(
            "places:39",
            PLACES_CHUNK_SIZE,
            PlaceCandidateReader::new(store.clone(), ContentType::Restaurant, 100),
            PlacesProcessor::new(api),
            PlacesWriter::new(store),
        )
        .execute()
        .await
    }

    #[tokio::test]
    async fn test_stage_writes_matches_and_marks_misses() {
        let store = seeded(&["1", "2", "3"]).await;
        let api = Arc::new(FakePlacesApi::new());
        api.set_place(
            "식당 1",
            "ChIJ-1",
            PlaceDetails {
                rating: Some(4.2),
                review_count: Some(88),
                reviews: vec!["맛있어요".to_string()],
            },
        );
        api.set_unavailable("식당 3");

        let outcome = backfill(api.clone(), store.clone()).await;
        assert_eq!(outcome.state, StageState::Exhausted);
        assert_eq!(outcome.stats.write_count, 1);
        assert_eq!(outcome.stats.skip_count, 1);

        let matched = store.get(ContentType::Restaurant, "1").await.unwrap();
        assert_eq!(matched.google_place_id.as_deref(), Some("ChIJ-1"));
        assert_eq!(matched.google_rating, Some(4.2));
        assert_eq!(matched.google_reviews, vec!["맛있어요".to_string()]);

        let missed = store.get(ContentType::Restaurant, "2").await.unwrap();
        assert!(missed.google_place_id.is_none());
        assert!(missed.places_checked_at.is_some());

        // Only the soft failure is asked about again
        let pending = store.pending_places(ContentType::Restaurant, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].key.content_id, "3");
        assert!(api.queries()[0].starts_with("식당 1 "));
    }

    #[tokio::test]
    async fn test_quota_halts_the_stage() {
        let store = seeded(&["1", "2"]).await;
        let limiter = Arc::new(
            RateLimiter::new(Arc::new(MemoryRateBudgetStore::new()), 3, 9)
                .with_key_prefix(PLACES_BUDGET_KEY_PREFIX),
        );
        let api = Arc::new(FakePlacesApi::with_limiter(limiter));
        api.set_place("식당 1", "ChIJ-1", PlaceDetails::default());
        api.set_place("식당 2", "ChIJ-2", PlaceDetails::default());

        // Search and details for the first row, then only the second search
        let outcome = backfill(api, store.clone()).await;
        assert_eq!(outcome.state, StageState::HaltedQuota);
        assert_eq!(outcome.stats.write_count, 1);
        assert_eq!(
            store.pending_places(ContentType::Restaurant, 10).await.unwrap()[0].key.content_id,
            "2"
        );
    }
}
