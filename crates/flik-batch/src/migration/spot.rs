//! Normalized serving rows

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ingest::content_type::ContentType;

/// Discriminator stored in `spots.spot_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpotType {
    Accommodation,
    Restaurant,
    Festival,
    CulturalFacility,
    LeisureSports,
    Shopping,
    TouristAttraction,
}

impl SpotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpotType::Accommodation => "ACCOMMODATION",
            SpotType::Restaurant => "RESTAURANT",
            SpotType::Festival => "FESTIVAL",
            SpotType::CulturalFacility => "CULTURAL_FACILITY",
            SpotType::LeisureSports => "LEISURE_SPORTS",
            SpotType::Shopping => "SHOPPING",
            SpotType::TouristAttraction => "TOURIST_ATTRACTION",
        }
    }
}

impl From<ContentType> for SpotType {
    fn from(content_type: ContentType) -> Self {
        match content_type {
            ContentType::TouristAttraction => SpotType::TouristAttraction,
            ContentType::CulturalFacility => SpotType::CulturalFacility,
            ContentType::FestivalEvent => SpotType::Festival,
            ContentType::LeisureSports => SpotType::LeisureSports,
            ContentType::Accommodation => SpotType::Accommodation,
            ContentType::Shopping => SpotType::Shopping,
            ContentType::Restaurant => SpotType::Restaurant,
        }
    }
}

impl fmt::Display for SpotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of `spots`, fields in insert order.
///
/// `Option` fields are written as NULL when `None`. Category slots that do
/// not apply to a spot type hold `""`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSpot {
    pub spot_type: SpotType,
    pub address: String,
    pub baby_carriage: String,
    pub category: String,
    pub close_time: Option<String>,
    pub content_type_id: String,
    pub content_id: String,
    pub day_off: String,
    pub description: String,
    pub google_place_id: Option<String>,
    /// JSON array of image URLs
    pub image_urls: Option<String>,
    pub info: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub name: String,
    pub open_time: Option<String>,
    pub parking: String,
    pub pet_carriage: String,
    pub rating: Option<f64>,
    pub regn_cd: String,
    pub review_count: Option<i32>,
    pub signgu_cd: String,
    pub tag1: Option<String>,
    pub tag2: Option<String>,
    pub tag3: Option<String>,
    pub tags: Option<String>,
    pub label_depth1: String,
    pub label_depth2: String,
    pub label_depth3: String,
    pub check_in_time: String,
    pub check_out_time: String,
    pub cooking: Option<i16>,
    pub facilities: String,
    pub cuisine_type: String,
    pub fee: String,
    pub age_limit: String,
    pub event_end_date: String,
    pub event_start_date: String,
    pub running_time: String,
    pub sponsor: String,
    pub first_menu: String,
    pub kids_facility: String,
    pub price_range: String,
    pub reservation: String,
    pub take_away: String,
    pub treat_menu: String,
    pub products: String,
    pub exp_guide: String,
    pub time: String,
}

impl NormalizedSpot {
    pub const COLUMNS: &'static [&'static str] = &[
        "spot_type",
        "address",
        "baby_carriage",
        "category",
        "close_time",
        "content_type_id",
        "content_id",
        "day_off",
        "description",
        "google_place_id",
        "image_urls",
        "info",
        "latitude",
        "longitude",
        "name",
        "open_time",
        "parking",
        "pet_carriage",
        "rating",
        "regn_cd",
        "review_count",
        "signgu_cd",
        "tag1",
        "tag2",
        "tag3",
        "tags",
        "label_depth1",
        "label_depth2",
        "label_depth3",
        "check_in_time",
        "check_out_time",
        "cooking",
        "facilities",
        "cuisine_type",
        "fee",
        "age_limit",
        "event_end_date",
        "event_start_date",
        "running_time",
        "sponsor",
        "first_menu",
        "kids_facility",
        "price_range",
        "reservation",
        "take_away",
        "treat_menu",
        "products",
        "exp_guide",
        "time",
    ];

    /// Image URLs decoded from `image_urls`
    pub fn images(&self) -> Vec<String> {
        self.image_urls
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok())
            .unwrap_or_default()
    }
}
