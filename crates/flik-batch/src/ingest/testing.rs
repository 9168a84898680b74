//! In-process provider doubles for pipeline tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::content_type::{ContentType, TRAVEL_COURSE_CODE};
use super::error::{IngestError, IngestResult};
use super::gateway::{ListingPage, TourismApi};
use super::places::{PlaceDetails, PlacesApi, SearchOutcome};
use super::rate_limiter::RateLimiter;
use super::record::{CommonDetail, DetailFields, RawRecord};

/// Serves listings paged by the requested page size, dropping type-25
/// items after paging the way the provider does. Errors registered with
/// `fail_*` are returned once, on the first matching call.
#[derive(Default)]
pub struct FakeTourismApi {
    listings: Mutex<HashMap<(ContentType, String), Vec<RawRecord>>>,
    intro: Mutex<HashMap<String, DetailFields>>,
    common: Mutex<HashMap<String, CommonDetail>>,
    images: Mutex<HashMap<String, Vec<String>>>,
    image_errors: Mutex<HashMap<String, IngestError>>,
    page_errors: Mutex<HashMap<u32, IngestError>>,
    intro_errors: Mutex<HashMap<String, IngestError>>,
    requested_pages: Mutex<Vec<u32>>,
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl FakeTourismApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charge every call against `rate_limiter` like the real gateway does
    pub fn with_limiter(rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            rate_limiter: Some(rate_limiter),
            ..Self::default()
        }
    }

    pub fn set_listing(&self, content_type: ContentType, area_code: &str, records: Vec<RawRecord>) {
        self.listings
            .lock()
            .unwrap()
            .insert((content_type, area_code.to_string()), records);
    }

    pub fn set_intro(&self, content_id: &str, fields: DetailFields) {
        self.intro.lock().unwrap().insert(content_id.to_string(), fields);
    }

    pub fn set_common(&self, content_id: &str, detail: CommonDetail) {
        self.common.lock().unwrap().insert(content_id.to_string(), detail);
    }

    pub fn set_images(&self, content_id: &str, urls: &[&str]) {
        self.images.lock().unwrap().insert(
            content_id.to_string(),
            urls.iter().map(|u| u.to_string()).collect(),
        );
    }

    pub fn fail_images(&self, content_id: &str, error: IngestError) {
        self.image_errors
            .lock()
            .unwrap()
            .insert(content_id.to_string(), error);
    }

    pub fn fail_page(&self, page: u32, error: IngestError) {
        self.page_errors.lock().unwrap().insert(page, error);
    }

    pub fn fail_intro(&self, content_id: &str, error: IngestError) {
        self.intro_errors
            .lock()
            .unwrap()
            .insert(content_id.to_string(), error);
    }

    pub fn requested_pages(&self) -> Vec<u32> {
        self.requested_pages.lock().unwrap().clone()
    }

    async fn charge(&self) -> IngestResult<()> {
        match &self.rate_limiter {
            Some(limiter) => limiter.acquire_or_fail().await,
            None => Ok(()),
        }
    }
}

/// A listing record the way the gateway would produce it
pub fn listing(content_type: ContentType, content_id: &str, title: &str, area_code: &str) -> RawRecord {
    RawRecord {
        content_id: content_id.to_string(),
        content_type_id: content_type.code().to_string(),
        title: title.to_string(),
        addr1: "경기도 수원시 팔달구 정조로 825".to_string(),
        area_code: area_code.to_string(),
        map_x: "127.0158".to_string(),
        map_y: "37.2866".to_string(),
        ..Default::default()
    }
}

#[async_trait]
impl TourismApi for FakeTourismApi {
    async fn fetch_page(
        &self,
        page: u32,
        area_code: &str,
        content_type: ContentType,
        page_size: u32,
    ) -> IngestResult<ListingPage> {
        self.charge().await?;
        self.requested_pages.lock().unwrap().push(page);

        if let Some(error) = self.page_errors.lock().unwrap().remove(&page) {
            return Err(error);
        }

        let listings = self.listings.lock().unwrap();
        let Some(records) = listings.get(&(content_type, area_code.to_string())) else {
            return Ok(ListingPage::empty());
        };

        let size = page_size.max(1) as usize;
        let start = (page.saturating_sub(1) as usize) * size;
        let sent: Vec<&RawRecord> = records.iter().skip(start).take(size).collect();
        Ok(ListingPage {
            received: sent.len(),
            records: sent
                .into_iter()
                .filter(|r| r.content_type_id != TRAVEL_COURSE_CODE)
                .cloned()
                .collect(),
        })
    }

    async fn fetch_detail_intro(
        &self,
        content_id: &str,
        _content_type: ContentType,
    ) -> IngestResult<DetailFields> {
        self.charge().await?;
        if let Some(error) = self.intro_errors.lock().unwrap().remove(content_id) {
            return Err(error);
        }
        Ok(self.intro.lock().unwrap().get(content_id).cloned().unwrap_or_default())
    }

    async fn fetch_detail_common(&self, content_id: &str) -> IngestResult<Option<CommonDetail>> {
        self.charge().await?;
        Ok(self.common.lock().unwrap().get(content_id).cloned())
    }

    /// Unknown ids have an empty gallery
    async fn fetch_detail_images(&self, content_id: &str) -> IngestResult<Option<Vec<String>>> {
        self.charge().await?;
        if let Some(error) = self.image_errors.lock().unwrap().remove(content_id) {
            return Err(error);
        }
        Ok(Some(self.images.lock().unwrap().get(content_id).cloned().unwrap_or_default()))
    }
}

/// Answers text searches whose query starts with a registered title
#[derive(Default)]
pub struct FakePlacesApi {
    places: Mutex<Vec<(String, String, PlaceDetails)>>,
    unavailable: Mutex<Vec<String>>,
    queries: Mutex<Vec<String>>,
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl FakePlacesApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limiter(rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            rate_limiter: Some(rate_limiter),
            ..Self::default()
        }
    }

    pub fn set_place(&self, title: &str, place_id: &str, details: PlaceDetails) {
        self.places
            .lock()
            .unwrap()
            .push((title.to_string(), place_id.to_string(), details));
    }

    /// Searches for `title` fail softly
    pub fn set_unavailable(&self, title: &str) {
        self.unavailable.lock().unwrap().push(title.to_string());
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    async fn charge(&self) -> IngestResult<()> {
        match &self.rate_limiter {
            Some(limiter) => limiter.acquire_or_fail().await,
            None => Ok(()),
        }
    }
}

fn query_matches(query: &str, title: &str) -> bool {
    query == title || query.starts_with(&format!("{} ", title))
}

#[async_trait]
impl PlacesApi for FakePlacesApi {
    async fn text_search(&self, query: &str) -> IngestResult<SearchOutcome> {
        self.charge().await?;
        self.queries.lock().unwrap().push(query.to_string());

        if self.unavailable.lock().unwrap().iter().any(|t| query_matches(query, t)) {
            return Ok(SearchOutcome::Unavailable);
        }
        Ok(self
            .places
            .lock()
            .unwrap()
            .iter()
            .find(|(title, _, _)| query_matches(query, title))
            .map(|(_, place_id, _)| SearchOutcome::Found(place_id.clone()))
            .unwrap_or(SearchOutcome::NoMatch))
    }

    async fn place_details(&self, place_id: &str) -> IngestResult<Option<PlaceDetails>> {
        self.charge().await?;
        Ok(self
            .places
            .lock()
            .unwrap()
            .iter()
            .find(|(_, id, _)| id == place_id)
            .map(|(_, _, details)| details.clone()))
    }
}
