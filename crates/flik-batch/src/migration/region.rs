//! Provider area code to administrative region code

/// Returned for area codes with no region mapping
pub const UNKNOWN_REGION: &str = "00";

/// (area code, region code, name)
const REGIONS: &[(&str, &str, &str)] = &[
    ("1", "11", "서울시"),
    ("2", "28", "인천시"),
    ("3", "30", "대전시"),
    ("4", "27", "대구시"),
    ("5", "29", "광주시"),
    ("6", "26", "부산시"),
    ("7", "31", "울산시"),
    ("31", "36", "경기도"),
    ("32", "41", "강원도"),
    ("33", "43", "충청북도"),
    ("34", "44", "충청남도"),
    ("35", "48", "경상북도"),
    ("36", "50", "경상남도"),
    ("37", "46", "전라북도"),
    ("38", "47", "전라남도"),
    ("39", "51", "제주도"),
];

pub fn region_code(area_code: &str) -> &'static str {
    let area_code = area_code.trim();
    REGIONS
        .iter()
        .find(|(area, _, _)| *area == area_code)
        .map(|(_, region, _)| *region)
        .unwrap_or(UNKNOWN_REGION)
}

pub fn region_name(area_code: &str) -> Option<&'static str> {
    let area_code = area_code.trim();
    REGIONS
        .iter()
        .find(|(area, _, _)| *area == area_code)
        .map(|(_, _, name)| *name)
}
