//! HTTP gateway to the tourism `KorService2` API.
//!
//! Every call takes one unit of rate budget before it is sent, so a call
//! that later times out or fails still counts. Responses are classified on
//! the raw body first: the provider's request-limit marker becomes
//! [`IngestError::QuotaExceeded`] no matter what status or shape surrounds
//! it. Every other failure is logged and turned into an empty result.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::content_type::{ContentType, TRAVEL_COURSE_CODE};
use super::error::{IngestError, IngestResult, QuotaSource};
use super::rate_limiter::RateLimiter;
use super::record::{CommonDetail, DetailFields, RawRecord};

/// Default provider endpoint
pub const DEFAULT_BASE_URL: &str = "https://apis.data.go.kr/B551011/KorService2";

/// Recorded as `source` on every collected row
pub const SOURCE_URL: &str = "http://apis.data.go.kr/B551011/KorService2";

/// Body marker the provider sends once its own quota is spent
pub const QUOTA_MARKER: &str = "LIMITED_NUMBER_OF_SERVICE_REQUESTS_EXCEEDS_ERROR";

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const SUCCESS_RESULT_CODE: &str = "0000";

/// Gallery page size requested from `detailImage2`
const IMAGE_PAGE_SIZE: u32 = 100;

/// One listing page after type-25 items were dropped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPage {
    pub records: Vec<RawRecord>,
    /// Items the provider sent, travel courses included
    pub received: usize,
}

impl ListingPage {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// The call shapes the pipelines need
#[async_trait]
pub trait TourismApi: Send + Sync {
    /// One page of the area-based listing. Type-25 items are dropped from
    /// `records` but still counted in `received`.
    async fn fetch_page(
        &self,
        page: u32,
        area_code: &str,
        content_type: ContentType,
        page_size: u32,
    ) -> IngestResult<ListingPage>;

    /// Fields of the first detail-intro item, empty on any non-quota failure
    async fn fetch_detail_intro(
        &self,
        content_id: &str,
        content_type: ContentType,
    ) -> IngestResult<DetailFields>;

    /// Overview and classification codes, `None` on any non-quota failure
    async fn fetch_detail_common(&self, content_id: &str) -> IngestResult<Option<CommonDetail>>;

    /// Distinct original image URLs of one item's gallery, `None` on any
    /// non-quota failure
    async fn fetch_detail_images(&self, content_id: &str) -> IngestResult<Option<Vec<String>>>;

    /// A copy of this gateway that authenticates with another service key
    fn with_service_key(&self, _service_key: &str) -> Option<Arc<dyn TourismApi>> {
        None
    }
}

#[derive(Clone)]
pub struct ApiGateway {
    client: Client,
    base_url: String,
    service_key: String,
    rate_limiter: Arc<RateLimiter>,
}

impl ApiGateway {
    pub fn new(
        base_url: impl Into<String>,
        service_key: impl Into<String>,
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
            service_key: service_key.into(),
            rate_limiter,
        })
    }

    /// Send one GET and return the parsed body, `None` on soft failure
    async fn call(&self, operation: &str, params: &[(&str, String)]) -> IngestResult<Option<Value>> {
        self.rate_limiter.acquire_or_fail().await?;

        let url = format!("{}/{}", self.base_url, operation);
        let response = match self
            .client
            .get(&url)
            .query(&[
                ("serviceKey", self.service_key.as_str()),
                ("MobileOS", "WEB"),
                ("MobileApp", "Flik"),
                ("_type", "json"),
            ])
            .query(params)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(operation, error = %e, "Tourism API request failed");
                return Ok(None);
            },
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(operation, error = %e, "Failed to read tourism API response body");
                return Ok(None);
            },
        };

        if body.contains(QUOTA_MARKER) {
            warn!(operation, "Tourism API reported its request limit");
            return Err(IngestError::quota(QuotaSource::Provider));
        }

        if !status.is_success() {
            warn!(operation, status = status.as_u16(), "Tourism API returned an error status");
            return Ok(None);
        }

        match serde_json::from_str::<Value>(&body) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(operation, error = %e, "Tourism API returned malformed JSON");
                Ok(None)
            },
        }
    }
}

#[async_trait]
impl TourismApi for ApiGateway {
    async fn fetch_page(
        &self,
        page: u32,
        area_code: &str,
        content_type: ContentType,
        page_size: u32,
    ) -> IngestResult<ListingPage> {
        let params = [
            ("numOfRows", page_size.to_string()),
            ("pageNo", page.to_string()),
            ("contentTypeId", content_type.code().to_string()),
            ("arrange", "C".to_string()),
            ("areaCode", area_code.to_string()),
        ];

        let Some(body) = self.call("areaBasedList2", &params).await? else {
            return Ok(ListingPage::empty());
        };

        let listed = items(&body);
        let received = listed.len();
        let records: Vec<RawRecord> = listed
            .into_iter()
            .filter(|item| text(item, "contenttypeid") != TRAVEL_COURSE_CODE)
            .map(record_from_item)
            .collect();

        debug!(page, area_code, content_type = %content_type, received, kept = records.len(), "Fetched listing page");
        Ok(ListingPage { records, received })
    }

    async fn fetch_detail_intro(
        &self,
        content_id: &str,
        content_type: ContentType,
    ) -> IngestResult<DetailFields> {
        let params = [
            ("contentId", content_id.to_string()),
            ("contentTypeId", content_type.code().to_string()),
        ];

        let Some(body) = self.call("detailIntro2", &params).await? else {
            return Ok(DetailFields::new());
        };

        Ok(items(&body)
            .first()
            .map(|item| item.keys().map(|k| (k.clone(), text(item, k))).collect())
            .unwrap_or_default())
    }

    async fn fetch_detail_common(&self, content_id: &str) -> IngestResult<Option<CommonDetail>> {
        let params = [("contentId", content_id.to_string())];

        let Some(body) = self.call("detailCommon2", &params).await? else {
            return Ok(None);
        };

        let result_code = body
            .pointer("/response/header/resultCode")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if result_code != SUCCESS_RESULT_CODE {
            warn!(content_id, result_code, "detailCommon2 returned a non-success result code");
            return Ok(None);
        }

        Ok(items(&body).first().map(|item| CommonDetail {
            overview: text(item, "overview"),
            content_type_id: text(item, "contenttypeid"),
            lcls_systm1: text(item, "lclsSystm1"),
            lcls_systm2: text(item, "lclsSystm2"),
            lcls_systm3: text(item, "lclsSystm3"),
        }))
    }

    async fn fetch_detail_images(&self, content_id: &str) -> IngestResult<Option<Vec<String>>> {
        let mut params = vec![
            ("contentId", content_id.to_string()),
            ("imageYN", "Y".to_string()),
            ("numOfRows", IMAGE_PAGE_SIZE.to_string()),
            ("pageNo", "1".to_string()),
            ("subImageYN", "Y".to_string()),
        ];

        loop {
            let Some(body) = self.call("detailImage2", &params).await? else {
                return Ok(None);
            };

            let (result_code, result_msg) = result_header(&body);
            if result_code != SUCCESS_RESULT_CODE {
                // Some keys reject the sub-image flag; ask again without it
                if result_msg.contains("subImageYN") && params.iter().any(|(k, _)| *k == "subImageYN") {
                    debug!(content_id, "detailImage2 rejected subImageYN, retrying without it");
                    params.retain(|(k, _)| *k != "subImageYN");
                    continue;
                }
                warn!(content_id, result_code = %result_code, result_msg = %result_msg, "detailImage2 returned a non-success result code");
                return Ok(None);
            }

            let mut urls: Vec<String> = Vec::new();
            for item in items(&body) {
                let url = text(item, "originimgurl");
                let url = url.trim();
                if !url.is_empty() && !urls.iter().any(|u| u == url) {
                    urls.push(url.to_string());
                }
            }
            return Ok(Some(urls));
        }
    }

    fn with_service_key(&self, service_key: &str) -> Option<Arc<dyn TourismApi>> {
        Some(Arc::new(Self {
            service_key: service_key.to_string(),
            ..self.clone()
        }))
    }
}

/// `response.body.items.item`, which is an array, a single object, or
/// missing altogether when a page is empty
fn items(body: &Value) -> Vec<&Map<String, Value>> {
    match body.pointer("/response/body/items/item") {
        Some(Value::Array(list)) => list.iter().filter_map(Value::as_object).collect(),
        Some(Value::Object(item)) => vec![item],
        _ => Vec::new(),
    }
}

/// `resultCode` and `resultMsg`, from the wrapped header or from the flat
/// error body the provider sends for rejected parameters
fn result_header(body: &Value) -> (String, String) {
    let field = |key: &str| {
        body.pointer(&format!("/response/header/{}", key))
            .or_else(|| body.get(key))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default()
    };
    (field("resultCode"), field("resultMsg"))
}

/// Field as text; numbers are rendered, anything missing is `""`
fn text(item: &Map<String, Value>, key: &str) -> String {
    match item.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn record_from_item(item: &Map<String, Value>) -> RawRecord {
    RawRecord {
        content_id: text(item, "contentid"),
        content_type_id: text(item, "contenttypeid"),
        title: text(item, "title"),
        addr1: text(item, "addr1"),
        addr2: text(item, "addr2"),
        first_image: text(item, "firstimage"),
        first_image2: text(item, "firstimage2"),
        map_x: text(item, "mapx"),
        map_y: text(item, "mapy"),
        area_code: text(item, "areacode"),
        sigungu_code: text(item, "sigungucode"),
        cat1: text(item, "cat1"),
        cat2: text(item, "cat2"),
        cat3: text(item, "cat3"),
        created_time: text(item, "createdtime"),
        modified_time: text(item, "modifiedtime"),
        tel: text(item, "tel"),
        zipcode: text(item, "zipcode"),
        raw_data: item.clone(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::rate_limiter::MemoryRateBudgetStore;
    use serde_json::json;
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn gateway(server: &MockServer, limit: u32) -> (ApiGateway, Arc<RateLimiter>) {
        let limiter = Arc::new(RateLimiter::new(Arc::new(MemoryRateBudgetStore::new()), limit, 9));
        let gateway = ApiGateway::new(server.uri(), "test-key", Duration::from_secs(5), limiter.clone())
            .unwrap();
        (gateway, limiter)
    }

    fn listing(items: Value) -> Value {
        json!({
            "response": {
                "header": { "resultCode": "0000", "resultMsg": "OK" },
                "body": { "items": { "item": items }, "numOfRows": 10, "pageNo": 1, "totalCount": 2 }
            }
        })
    }

    #[tokio::test]
    async fn test_fetch_page_parses_items_and_drops_travel_courses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/areaBasedList2"))
            .and(query_param("pageNo", "2"))
            .and(query_param("numOfRows", "10"))
            .and(query_param("contentTypeId", "32"))
            .and(query_param("areaCode", "1"))
            .and(query_param("serviceKey", "test-key"))
            .and(query_param("_type", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(json!([
                { "contentid": "142785", "contenttypeid": "32", "title": "서울 호텔", "addr1": "서울특별시 중구", "mapx": 126.98, "mapy": "37.56" },
                { "contentid": "900001", "contenttypeid": "25", "title": "도보 코스" }
            ]))))
            .mount(&server)
            .await;

        let (gateway, limiter) = gateway(&server, 100);
        let page = gateway
            .fetch_page(2, "1", ContentType::Accommodation, 10)
            .await
            .unwrap();

        assert_eq!(page.records.len(), 1);
        assert_eq!(page.received, 2);
        let hotel = &page.records[0];
        assert_eq!(hotel.content_id, "142785");
        assert_eq!(hotel.title, "서울 호텔");
        assert_eq!(hotel.map_x, "126.98");
        assert_eq!(hotel.map_y, "37.56");
        assert_eq!(hotel.tel, "");
        assert!(hotel.raw_data.contains_key("addr1"));
        assert_eq!(limiter.used().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_single_object_item_is_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/areaBasedList2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(json!(
                { "contentid": "1", "contenttypeid": "12", "title": "한 곳" }
            ))))
            .mount(&server)
            .await;

        let (gateway, _) = gateway(&server, 100);
        let page = gateway
            .fetch_page(1, "1", ContentType::TouristAttraction, 10)
            .await
            .unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.received, 1);
    }

    #[tokio::test]
    async fn test_quota_marker_becomes_quota_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<OpenAPI_ServiceResponse><returnAuthMsg>LIMITED_NUMBER_OF_SERVICE_REQUESTS_EXCEEDS_ERROR</returnAuthMsg></OpenAPI_ServiceResponse>",
            ))
            .mount(&server)
            .await;

        let (gateway, _) = gateway(&server, 100);
        let err = gateway
            .fetch_page(1, "1", ContentType::Restaurant, 10)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::QuotaExceeded {
                origin: QuotaSource::Provider
            }
        ));
    }

    #[tokio::test]
    async fn test_server_error_yields_empty_page_but_consumes_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (gateway, limiter) = gateway(&server, 100);
        let page = gateway
            .fetch_page(1, "1", ContentType::Restaurant, 10)
            .await
            .unwrap();
        assert_eq!(page, ListingPage::empty());
        assert_eq!(limiter.used().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_malformed_body_yields_empty_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let (gateway, _) = gateway(&server, 100);
        let page = gateway
            .fetch_page(1, "1", ContentType::Shopping, 10)
            .await
            .unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.received, 0);
    }

    #[tokio::test]
    async fn test_exhausted_budget_never_reaches_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(json!([]))))
            .expect(0)
            .mount(&server)
            .await;

        let (gateway, _) = gateway(&server, 0);
        let err = gateway
            .fetch_page(1, "1", ContentType::Shopping, 10)
            .await
            .unwrap_err();
        assert!(err.is_quota());
    }

    #[tokio::test]
    async fn test_detail_intro_returns_first_item_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/detailIntro2"))
            .and(query_param("contentId", "142785"))
            .and(query_param("contentTypeId", "32"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(json!([
                { "contentid": "142785", "checkintime": "15:00", "roomcount": 120 }
            ]))))
            .mount(&server)
            .await;

        let (gateway, _) = gateway(&server, 100);
        let fields = gateway
            .fetch_detail_intro("142785", ContentType::Accommodation)
            .await
            .unwrap();
        assert_eq!(fields.get("checkintime").map(String::as_str), Some("15:00"));
        assert_eq!(fields.get("roomcount").map(String::as_str), Some("120"));
    }

    #[tokio::test]
    async fn test_detail_common_requires_success_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/detailCommon2"))
            .and(query_param("contentId", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": {
                    "header": { "resultCode": "0000" },
                    "body": { "items": { "item": [{
                        "overview": "조선 왕조의 법궁",
                        "contenttypeid": "12",
                        "lclsSystm1": "HS",
                        "lclsSystm2": "HS01",
                        "lclsSystm3": "HS010100"
                    }] } }
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/detailCommon2"))
            .and(query_param("contentId", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": { "header": { "resultCode": "10" }, "body": {} }
            })))
            .mount(&server)
            .await;

        let (gateway, _) = gateway(&server, 100);
        let detail = gateway.fetch_detail_common("1").await.unwrap().unwrap();
        assert_eq!(detail.overview, "조선 왕조의 법궁");
        assert_eq!(detail.lcls_systm2, "HS01");

        assert!(gateway.fetch_detail_common("2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_detail_images_collects_distinct_originals() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/detailImage2"))
            .and(query_param("contentId", "126508"))
            .and(query_param("imageYN", "Y"))
            .and(query_param("subImageYN", "Y"))
            .and(query_param("numOfRows", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(json!([
                { "contentid": "126508", "originimgurl": "http://tong.visitkorea.or.kr/a.jpg", "smallimageurl": "http://tong.visitkorea.or.kr/a_s.jpg" },
                { "contentid": "126508", "originimgurl": "http://tong.visitkorea.or.kr/b.jpg" },
                { "contentid": "126508", "originimgurl": "http://tong.visitkorea.or.kr/a.jpg" },
                { "contentid": "126508", "originimgurl": "" }
            ]))))
            .mount(&server)
            .await;

        let (gateway, limiter) = gateway(&server, 100);
        let urls = gateway.fetch_detail_images("126508").await.unwrap().unwrap();
        assert_eq!(
            urls,
            vec![
                "http://tong.visitkorea.or.kr/a.jpg".to_string(),
                "http://tong.visitkorea.or.kr/b.jpg".to_string(),
            ]
        );
        assert_eq!(limiter.used().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_detail_images_retries_without_sub_image_flag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/detailImage2"))
            .and(query_param("subImageYN", "Y"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resultCode": "10",
                "resultMsg": "INVALID_REQUEST_PARAMETER_ERROR(subImageYN)"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/detailImage2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(json!(
                { "contentid": "7", "originimgurl": "http://tong.visitkorea.or.kr/only.jpg" }
            ))))
            .mount(&server)
            .await;

        let (gateway, limiter) = gateway(&server, 100);
        let urls = gateway.fetch_detail_images("7").await.unwrap().unwrap();
        assert_eq!(urls, vec!["http://tong.visitkorea.or.kr/only.jpg".to_string()]);
        assert_eq!(limiter.used().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_detail_images_distinguishes_empty_gallery_from_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/detailImage2"))
            .and(query_param("contentId", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": {
                    "header": { "resultCode": "0000", "resultMsg": "OK" },
                    "body": { "items": "", "totalCount": 0 }
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/detailImage2"))
            .and(query_param("contentId", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resultCode": "30",
                "resultMsg": "SERVICE_KEY_IS_NOT_REGISTERED_ERROR"
            })))
            .mount(&server)
            .await;

        let (gateway, _) = gateway(&server, 100);
        assert_eq!(gateway.fetch_detail_images("1").await.unwrap(), Some(Vec::new()));
        assert_eq!(gateway.fetch_detail_images("2").await.unwrap(), None);
    }
}
