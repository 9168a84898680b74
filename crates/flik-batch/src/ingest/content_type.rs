//! Content categories served by the tourism API

use serde::{Deserialize, Serialize};

use super::error::{IngestError, IngestResult};

/// Travel courses are listed by the provider but never collected
pub const TRAVEL_COURSE_CODE: &str = "25";

/// Label used for codes outside the collectable set
pub const UNKNOWN_LABEL: &str = "기타";

/// Provider area codes, in the order scheduled collection visits them
pub const AREA_CODES: [&str; 17] = [
    "2", "3", "4", "5", "6", "7", "8", "31", "32", "33", "34", "35", "36", "37", "38", "39", "1",
];

pub fn is_known_area(code: &str) -> bool {
    AREA_CODES.contains(&code.trim())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContentType {
    TouristAttraction,
    CulturalFacility,
    FestivalEvent,
    LeisureSports,
    Accommodation,
    Shopping,
    Restaurant,
}

impl ContentType {
    pub const ALL: [ContentType; 7] = [
        ContentType::TouristAttraction,
        ContentType::CulturalFacility,
        ContentType::FestivalEvent,
        ContentType::LeisureSports,
        ContentType::Accommodation,
        ContentType::Shopping,
        ContentType::Restaurant,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            ContentType::TouristAttraction => "12",
            ContentType::CulturalFacility => "14",
            ContentType::FestivalEvent => "15",
            ContentType::LeisureSports => "28",
            ContentType::Accommodation => "32",
            ContentType::Shopping => "38",
            ContentType::Restaurant => "39",
        }
    }

    pub fn from_code(code: &str) -> IngestResult<Self> {
        Self::ALL
            .into_iter()
            .find(|ct| ct.code() == code.trim())
            .ok_or_else(|| IngestError::UnknownContentType(code.to_string()))
    }

    /// Korean display name stored as `content_type_name`
    pub fn label(&self) -> &'static str {
        match self {
            ContentType::TouristAttraction => "관광지",
            ContentType::CulturalFacility => "문화시설",
            ContentType::FestivalEvent => "축제공연행사",
            ContentType::LeisureSports => "레포츠",
            ContentType::Accommodation => "숙박",
            ContentType::Shopping => "쇼핑",
            ContentType::Restaurant => "음식점",
        }
    }

    /// Raw table holding this category
    pub fn table(&self) -> &'static str {
        match self {
            ContentType::TouristAttraction => "fetched_tourist_attractions",
            ContentType::CulturalFacility => "fetched_cultural_facilities",
            ContentType::FestivalEvent => "fetched_festivals_events",
            ContentType::LeisureSports => "fetched_sports_recreation",
            ContentType::Accommodation => "fetched_accommodations",
            ContentType::Shopping => "fetched_shopping",
            ContentType::Restaurant => "fetched_restaurants",
        }
    }
}

/// Display name for any provider code, including ones we do not collect
pub fn label_for_code(code: &str) -> &'static str {
    ContentType::from_code(code)
        .map(|ct| ct.label())
        .unwrap_or(UNKNOWN_LABEL)
}

impl std::str::FromStr for ContentType {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s)
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for ct in ContentType::ALL {
            assert_eq!(ContentType::from_code(ct.code()).unwrap(), ct);
        }
    }

    #[test]
    fn test_travel_course_is_not_collectable() {
        assert!(ContentType::from_code(TRAVEL_COURSE_CODE).is_err());
        assert_eq!(label_for_code(TRAVEL_COURSE_CODE), UNKNOWN_LABEL);
    }

    #[test]
    fn test_tables_and_labels() {
        assert_eq!(ContentType::Accommodation.table(), "fetched_accommodations");
        assert_eq!(ContentType::LeisureSports.table(), "fetched_sports_recreation");
        assert_eq!(label_for_code("39"), "음식점");
        assert_eq!(label_for_code(" 15 "), "축제공연행사");
    }

    #[test]
    fn test_area_codes() {
        assert!(is_known_area("1"));
        assert!(is_known_area(" 39"));
        assert!(!is_known_area("9"));
        assert_eq!(AREA_CODES.last(), Some(&"1"));
    }
}
