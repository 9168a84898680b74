//! Raw tourism records and their enrichment payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::content_type::ContentType;

/// Flat key/value view of one detail item as returned by the provider
pub type DetailFields = BTreeMap<String, String>;

/// One listing as collected from the provider, plus whatever enrichment has
/// been attached to it so far.
///
/// `content_id` is the natural key inside a content type's table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub content_id: String,
    /// Provider `contenttypeid`, kept as text so foreign codes survive parsing
    pub content_type_id: String,
    pub content_type_name: String,
    pub title: String,
    pub addr1: String,
    pub addr2: String,
    pub first_image: String,
    pub first_image2: String,
    pub map_x: String,
    pub map_y: String,
    pub area_code: String,
    pub sigungu_code: String,
    pub cat1: String,
    pub cat2: String,
    pub cat3: String,
    pub created_time: String,
    pub modified_time: String,
    pub tel: String,
    pub zipcode: String,
    pub overview: String,
    pub source: String,
    pub collected_at: Option<DateTime<Utc>>,
    pub detail: Option<IntroDetail>,
    pub labels: Option<LabelDetail>,
    pub google_place_id: Option<String>,
    pub google_rating: Option<f64>,
    pub google_review_count: Option<i32>,
    /// Review texts from Google Places, at most ten
    pub google_reviews: Vec<String>,
    /// Set once Google Places was asked about this row, match or not
    pub places_checked_at: Option<DateTime<Utc>>,
    /// Every field the provider sent for this listing
    pub raw_data: serde_json::Map<String, serde_json::Value>,
}

impl RawRecord {
    /// Whether the listing carries the identity fields every table requires
    pub fn is_valid(&self) -> bool {
        !self.content_id.trim().is_empty() && !self.title.trim().is_empty()
    }

    pub fn belongs_to(&self, content_type: ContentType) -> bool {
        self.content_type_id == content_type.code()
    }

    pub fn label_depth1(&self) -> &str {
        self.labels.as_ref().map(|l| l.label_depth1.as_str()).unwrap_or("")
    }
}

/// Common opening/facility columns shared by every raw table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonColumns {
    pub usetime: String,
    pub restdate: String,
    pub parking: String,
    pub parkingfee: String,
    pub infocenter: String,
    pub chkbabycarriage: String,
    pub chkpet: String,
    pub chkcreditcard: String,
}

impl CommonColumns {
    pub const COLUMNS: &'static [&'static str] = &[
        "usetime",
        "restdate",
        "parking",
        "parkingfee",
        "infocenter",
        "chkbabycarriage",
        "chkpet",
        "chkcreditcard",
    ];

    pub fn values(&self) -> [&str; 8] {
        [
            self.usetime.as_str(),
            self.restdate.as_str(),
            self.parking.as_str(),
            self.parkingfee.as_str(),
            self.infocenter.as_str(),
            self.chkbabycarriage.as_str(),
            self.chkpet.as_str(),
            self.chkcreditcard.as_str(),
        ]
    }
}

/// Result of a detail-intro call mapped onto table columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntroDetail {
    pub common: CommonColumns,
    pub domain: DomainFields,
    /// Provider keys that map to no column
    pub extra: DetailFields,
}

/// Classification labels and overview from a detail-common call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelDetail {
    pub overview: String,
    pub label_depth1: String,
    pub label_depth2: String,
    pub label_depth3: String,
}

/// Raw detail-common payload before label codes are resolved
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonDetail {
    pub overview: String,
    pub content_type_id: String,
    pub lcls_systm1: String,
    pub lcls_systm2: String,
    pub lcls_systm3: String,
}

macro_rules! domain_fields {
    ($( $variant:ident($name:ident) => [$($field:ident),+ $(,)?] ),+ $(,)?) => {
        $(
            #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
            pub struct $name {
                $(pub $field: String,)+
            }

            impl $name {
                pub const COLUMNS: &'static [&'static str] = &[$(stringify!($field)),+];

                pub fn from_detail(fields: &DetailFields) -> Self {
                    Self {
                        $($field: fields.get(stringify!($field)).cloned().unwrap_or_default(),)+
                    }
                }

                pub fn values(&self) -> Vec<&str> {
                    vec![$(self.$field.as_str()),+]
                }
            }
        )+

        /// Category-specific detail attributes, one struct per content type
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(tag = "kind")]
        pub enum DomainFields {
            $($variant($name),)+
        }

        impl DomainFields {
            pub fn from_detail(content_type: ContentType, fields: &DetailFields) -> Self {
                match content_type {
                    $(ContentType::$variant => DomainFields::$variant($name::from_detail(fields)),)+
                }
            }

            pub fn columns_for(content_type: ContentType) -> &'static [&'static str] {
                match content_type {
                    $(ContentType::$variant => $name::COLUMNS,)+
                }
            }

            pub fn content_type(&self) -> ContentType {
                match self {
                    $(DomainFields::$variant(_) => ContentType::$variant,)+
                }
            }

            pub fn columns(&self) -> &'static [&'static str] {
                Self::columns_for(self.content_type())
            }

            pub fn values(&self) -> Vec<&str> {
                match self {
                    $(DomainFields::$variant(f) => f.values(),)+
                }
            }
        }
    };
}

domain_fields! {
    TouristAttraction(AttractionFields) => [
        heritage1, heritage2, heritage3, opendate, expguide, expagerange, accomcount, useseason,
    ],
    CulturalFacility(CulturalFields) => [scale, usefee, discountinfo, spendtime],
    FestivalEvent(FestivalFields) => [
        sponsor1, sponsor1tel, sponsor2, sponsor2tel, eventenddate, playtime, eventplace,
        eventhomepage, agelimit, bookingplace, placeinfo, subevent, program, eventstartdate,
        usetimefestival, discountinfofestival, spendtimefestival, festivalgrade, progresstype,
        festivaltype,
    ],
    LeisureSports(LeisureFields) => [
        openperiod, reservation, scaleleports, accomcountleports, usefeeleports,
        expagerangeleports,
    ],
    Accommodation(AccommodationFields) => [
        roomcount, roomtype, refundregulation, checkintime, checkouttime, chkcooking, seminar,
        sports, sauna, beauty, beverage, karaoke, barbecue, campfire, bicycle, fitness,
        publicpc, publicbath, subfacility, foodplace, reservationurl, pickup,
        reservationlodging, scalelodging, accomcountlodging,
    ],
    Shopping(ShoppingFields) => [
        saleitem, saleitemcost, fairday, opendateshopping, shopguide, culturecenter, restroom,
        scaleshopping,
    ],
    Restaurant(RestaurantFields) => [
        seat, kidsfacility, firstmenu, treatmenu, smoking, packing, scalefood, opendatefood,
        discountinfofood, reservationfood, lcnsno,
    ],
}
