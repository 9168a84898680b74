//! Raw record to [`NormalizedSpot`] reshaping

use crate::ingest::content_type::ContentType;
use crate::ingest::error::IngestResult;
use crate::ingest::record::{AccommodationFields, CommonColumns, DomainFields, RawRecord};

use super::region::region_code;
use super::sigungu::sigungu_code;
use super::spot::{NormalizedSpot, SpotType};

/// Accommodation amenity flags and their display labels, in output order
const FACILITY_LABELS: &[(&str, &str)] = &[
    ("seminar", "세미나실"),
    ("sports", "스포츠시설"),
    ("sauna", "사우나"),
    ("beauty", "미용실"),
    ("beverage", "음료시설"),
    ("karaoke", "노래방"),
    ("barbecue", "바베큐"),
    ("campfire", "캠프파이어"),
    ("bicycle", "자전거"),
    ("fitness", "피트니스"),
    ("publicpc", "공용PC"),
    ("publicbath", "공용욕실"),
];

/// Type-specific columns of a spot; unset slots stay empty
#[derive(Debug, Default)]
struct CategorySlots {
    check_in_time: String,
    check_out_time: String,
    cooking: Option<i16>,
    facilities: String,
    cuisine_type: String,
    fee: String,
    age_limit: String,
    event_end_date: String,
    event_start_date: String,
    running_time: String,
    sponsor: String,
    first_menu: String,
    kids_facility: String,
    price_range: String,
    reservation: String,
    take_away: String,
    treat_menu: String,
    products: String,
    exp_guide: String,
}

/// Amenity labels for every non-empty flag, then `subfacility`, joined by ", "
pub fn facilities_summary(fields: &AccommodationFields) -> String {
    let flags = [
        &fields.seminar,
        &fields.sports,
        &fields.sauna,
        &fields.beauty,
        &fields.beverage,
        &fields.karaoke,
        &fields.barbecue,
        &fields.campfire,
        &fields.bicycle,
        &fields.fitness,
        &fields.publicpc,
        &fields.publicbath,
    ];

    let mut parts: Vec<&str> = flags
        .iter()
        .zip(FACILITY_LABELS)
        .filter(|(value, _)| !value.trim().is_empty())
        .map(|(_, (_, label))| *label)
        .collect();

    if !fields.subfacility.trim().is_empty() {
        parts.push(fields.subfacility.as_str());
    }
    parts.join(", ")
}

/// `first_image` then `first_image2` as a JSON array
pub fn image_urls(record: &RawRecord) -> IngestResult<Option<String>> {
    encode_image_urls(&[record.first_image.as_str(), record.first_image2.as_str()])
}

/// JSON array of `urls` with blanks and repeats dropped, first occurrence
/// kept. `None` when nothing is left.
pub fn encode_image_urls<S: AsRef<str>>(urls: &[S]) -> IngestResult<Option<String>> {
    let mut kept: Vec<&str> = Vec::with_capacity(urls.len());
    for url in urls.iter().map(|u| u.as_ref().trim()) {
        if !url.is_empty() && !kept.contains(&url) {
            kept.push(url);
        }
    }

    if kept.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(&kept)?))
}

fn coordinate(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn category_slots(domain: &DomainFields, cat3: &str) -> CategorySlots {
    match domain {
        DomainFields::Accommodation(f) => CategorySlots {
            check_in_time: f.checkintime.clone(),
            check_out_time: f.checkouttime.clone(),
            cooking: Some(if f.chkcooking.trim().is_empty() { 0 } else { 1 }),
            facilities: facilities_summary(f),
            price_range: f.roomtype.clone(),
            reservation: f.reservationlodging.clone(),
            products: f.foodplace.clone(),
            exp_guide: f.scalelodging.clone(),
            ..Default::default()
        },
        DomainFields::Restaurant(f) => CategorySlots {
            cuisine_type: cat3.to_string(),
            first_menu: f.firstmenu.clone(),
            kids_facility: f.kidsfacility.clone(),
            reservation: f.reservationfood.clone(),
            take_away: f.packing.clone(),
            treat_menu: f.treatmenu.clone(),
            exp_guide: f.scalefood.clone(),
            ..Default::default()
        },
        DomainFields::FestivalEvent(f) => CategorySlots {
            event_start_date: f.eventstartdate.clone(),
            event_end_date: f.eventenddate.clone(),
            running_time: f.playtime.clone(),
            sponsor: f.sponsor1.clone(),
            age_limit: f.agelimit.clone(),
            fee: f.usetimefestival.clone(),
            ..Default::default()
        },
        DomainFields::CulturalFacility(f) => CategorySlots {
            fee: f.usefee.clone(),
            exp_guide: f.scale.clone(),
            ..Default::default()
        },
        DomainFields::LeisureSports(f) => CategorySlots {
            fee: f.usefeeleports.clone(),
            reservation: f.reservation.clone(),
            age_limit: f.expagerangeleports.clone(),
            exp_guide: f.scaleleports.clone(),
            ..Default::default()
        },
        DomainFields::Shopping(f) => CategorySlots {
            products: f.saleitem.clone(),
            exp_guide: f.shopguide.clone(),
            ..Default::default()
        },
        DomainFields::TouristAttraction(f) => CategorySlots {
            exp_guide: f.expguide.clone(),
            age_limit: f.expagerange.clone(),
            ..Default::default()
        },
    }
}

/// Reshape one raw record of `content_type` into a serving row.
///
/// Records without intro detail transform with empty detail columns.
pub fn transform(content_type: ContentType, record: &RawRecord) -> IngestResult<NormalizedSpot> {
    let (common, domain) = match &record.detail {
        Some(detail) if detail.domain.content_type() == content_type => {
            (detail.common.clone(), detail.domain.clone())
        },
        Some(detail) => (
            detail.common.clone(),
            DomainFields::from_detail(content_type, &Default::default()),
        ),
        None => (
            CommonColumns::default(),
            DomainFields::from_detail(content_type, &Default::default()),
        ),
    };
    let labels = record.labels.clone().unwrap_or_default();
    let slots = category_slots(&domain, &record.cat3);

    Ok(NormalizedSpot {
        spot_type: SpotType::from(content_type),
        address: record.addr1.clone(),
        baby_carriage: common.chkbabycarriage,
        category: record.content_type_name.clone(),
        close_time: None,
        content_type_id: record.content_type_id.clone(),
        content_id: record.content_id.clone(),
        day_off: common.restdate,
        description: record.overview.clone(),
        google_place_id: record.google_place_id.clone(),
        image_urls: image_urls(record)?,
        info: common.infocenter,
        latitude: coordinate(&record.map_y),
        longitude: coordinate(&record.map_x),
        name: record.title.clone(),
        open_time: None,
        parking: common.parking,
        pet_carriage: common.chkpet,
        rating: record.google_rating,
        regn_cd: region_code(&record.area_code).to_string(),
        review_count: record.google_review_count,
        signgu_cd: sigungu_code(&record.addr1).to_string(),
        tag1: None,
        tag2: None,
        tag3: None,
        tags: None,
        label_depth1: labels.label_depth1,
        label_depth2: labels.label_depth2,
        label_depth3: labels.label_depth3,
        check_in_time: slots.check_in_time,
        check_out_time: slots.check_out_time,
        cooking: slots.cooking,
        facilities: slots.facilities,
        cuisine_type: slots.cuisine_type,
        fee: slots.fee,
        age_limit: slots.age_limit,
        event_end_date: slots.event_end_date,
        event_start_date: slots.event_start_date,
        running_time: slots.running_time,
        sponsor: slots.sponsor,
        first_menu: slots.first_menu,
        kids_facility: slots.kids_facility,
        price_range: slots.price_range,
        reservation: slots.reservation,
        take_away: slots.take_away,
        treat_menu: slots.treat_menu,
        products: slots.products,
        exp_guide: slots.exp_guide,
        time: common.usetime,
    })
}
