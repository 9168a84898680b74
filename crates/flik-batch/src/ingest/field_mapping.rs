//! Maps provider detail keys onto raw-table columns.
//!
//! The provider suffixes most common keys by category (`usetimeculture`,
//! `parkingfood`, ...). Each common column takes the first non-blank value
//! among its candidate keys.

use super::content_type::ContentType;
use super::record::{CommonColumns, DetailFields, DomainFields, IntroDetail};

const USETIME: &[&str] = &["usetime", "usetimeculture", "usetimeleports", "opentime", "opentimefood"];
const RESTDATE: &[&str] = &[
    "restdate",
    "restdateculture",
    "restdateleports",
    "restdateshopping",
    "restdatefood",
];
const PARKING: &[&str] = &[
    "parking",
    "parkingculture",
    "parkingleports",
    "parkinglodging",
    "parkingshopping",
    "parkingfood",
];
const PARKINGFEE: &[&str] = &["parkingfeeleports"];
const INFOCENTER: &[&str] = &[
    "infocenter",
    "infocenterculture",
    "infocenterleports",
    "infocenterlodging",
    "infocentershopping",
    "infocenterfood",
];
const CHKBABYCARRIAGE: &[&str] = &[
    "chkbabycarriage",
    "chkbabycarriageculture",
    "chkbabycarriageleports",
    "chkbabycarriageshopping",
];
const CHKPET: &[&str] = &["chkpet", "chkpetculture", "chkpetshopping"];
const CHKCREDITCARD: &[&str] = &[
    "chkcreditcard",
    "chkcreditcardculture",
    "chkcreditcardleports",
    "chkcreditcardshopping",
    "chkcreditcardfood",
];

const CANDIDATES: [&[&str]; 8] = [
    USETIME,
    RESTDATE,
    PARKING,
    PARKINGFEE,
    INFOCENTER,
    CHKBABYCARRIAGE,
    CHKPET,
    CHKCREDITCARD,
];

/// Identity keys echoed back by every detail call
const ECHO_KEYS: &[&str] = &["contentid", "contenttypeid"];

/// First non-blank value among `keys`, or `""`
pub fn pick_first(fields: &DetailFields, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| fields.get(*k))
        .find(|v| !v.trim().is_empty())
        .cloned()
        .unwrap_or_default()
}

pub fn common_columns(fields: &DetailFields) -> CommonColumns {
    CommonColumns {
        usetime: pick_first(fields, USETIME),
        restdate: pick_first(fields, RESTDATE),
        parking: pick_first(fields, PARKING),
        parkingfee: pick_first(fields, PARKINGFEE),
        infocenter: pick_first(fields, INFOCENTER),
        chkbabycarriage: pick_first(fields, CHKBABYCARRIAGE),
        chkpet: pick_first(fields, CHKPET),
        chkcreditcard: pick_first(fields, CHKCREDITCARD),
    }
}

/// Build the full column mapping for one detail-intro item
pub fn map_intro(content_type: ContentType, fields: &DetailFields) -> IntroDetail {
    let domain = DomainFields::from_detail(content_type, fields);
    let modelled = domain.columns();

    let extra = fields
        .iter()
        .filter(|(k, _)| {
            let k = k.as_str();
            !ECHO_KEYS.contains(&k)
                && !modelled.contains(&k)
                && !CANDIDATES.iter().any(|keys| keys.contains(&k))
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    IntroDetail {
        common: common_columns(fields),
        domain,
        extra,
    }
}
