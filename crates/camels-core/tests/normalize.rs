use std::fs;
use std::path::PathBuf;

use camels_core::normalize::{
    normalize_attribute_table, normalize_station_name, pad_region_code, pad_station_id,
    NormalizeError, NAME_COLUMN, REGION_CODE_COLUMN, STATION_ID_COLUMN, STATION_ID_WIDTH,
};
use camels_core::PipelineError;
use camels_parser::{parse_attribute_table, AttributeGroup};

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../camels-parser/tests/data")
        .join(name)
}

const RAW_NAMES: &[&str] = &[
    "abc twp.,ny",
    "Fish River near Fort Kent, Maine",
    "NARRAGUAGUS RIVER AT CHERRYFIELD,ME.",
    "falling river  near naruna,, va",
    "ST. CROIX RIVER AT ST. CROIX FALLS, WI",
    "N FK CLEARWATER R NR 3RD BRIDGE;; ID",
    "Mill Creek (upper), near O'NEILL, ne",
    "Big Sandy Creek at Bruceton Mills, W.Va.",
    "TEN MILE CREEK NEAR RHINELANDER WI",
    "abc--def, ny",
    "abc!! creek, ny",
    "abc ((x)), ny",
];

#[test]
fn township_example_is_normalized() {
    assert_eq!(normalize_station_name("abc twp.,ny").unwrap(), "Abc Twp, NY");
}

#[test]
fn fixture_names_are_normalized() {
    assert_eq!(
        normalize_station_name("Fish River near Fort Kent, Maine").unwrap(),
        "Fish River Near Fort Kent, Maine"
    );
    assert_eq!(
        normalize_station_name("NARRAGUAGUS RIVER AT CHERRYFIELD,ME.").unwrap(),
        "Narraguagus River At Cherryfield, ME"
    );
    assert_eq!(
        normalize_station_name("falling river  near naruna,, va").unwrap(),
        "Falling River Near Naruna, VA"
    );
}

#[test]
fn abbreviations_and_word_boundaries_are_kept() {
    assert_eq!(
        normalize_station_name("ST. CROIX RIVER AT ST. CROIX FALLS, WI").unwrap(),
        "St. Croix River At St. Croix Falls, WI"
    );
    assert_eq!(
        normalize_station_name("N FK CLEARWATER R NR 3RD BRIDGE;; ID").unwrap(),
        "N Fk Clearwater R Nr 3rd Bridge, ID"
    );
    assert_eq!(
        normalize_station_name("Mill Creek (upper), near O'NEILL, ne").unwrap(),
        "Mill Creek (Upper) Near O'neill, NE"
    );
    assert_eq!(
        normalize_station_name("TEN MILE CREEK NEAR RHINELANDER WI").unwrap(),
        "Ten Mile Creek Near Rhinelander, WI"
    );
}

#[test]
fn long_state_tokens_lose_periods_and_are_title_cased() {
    assert_eq!(
        normalize_station_name("Big Sandy Creek at Bruceton Mills, W.Va.").unwrap(),
        "Big Sandy Creek At Bruceton Mills, Wva"
    );
}

#[test]
fn repeated_punctuation_of_any_kind_collapses() {
    assert_eq!(normalize_station_name("abc--def, ny").unwrap(), "Abc-Def, NY");
    assert_eq!(
        normalize_station_name("abc!! creek, ny").unwrap(),
        "Abc! Creek, NY"
    );
    assert_eq!(normalize_station_name("abc ((x)), ny").unwrap(), "Abc (X), NY");
}

#[test]
fn name_normalization_is_idempotent() {
    for raw in RAW_NAMES {
        let once = normalize_station_name(raw).unwrap();
        let twice = normalize_station_name(&once).unwrap();
        assert_eq!(once, twice, "not idempotent for {raw:?}");
    }
}

#[test]
fn normalized_names_have_one_comma_and_no_punctuation_runs() {
    for raw in RAW_NAMES {
        let name = normalize_station_name(raw).unwrap();
        assert_eq!(name.matches(',').count(), 1, "{name:?}");
        let (head, state) = name.split_once(", ").expect("comma before state");
        assert!(!head.is_empty() && !state.is_empty());
        let chars: Vec<char> = name.chars().collect();
        for pair in chars.windows(2) {
            let both_punctuation = pair
                .iter()
                .all(|c| c.is_ascii_punctuation() && !"'()[]{}".contains(*c));
            assert!(!both_punctuation, "punctuation run in {name:?}");
            let repeated = pair[0] == pair[1] && pair[0].is_ascii_punctuation();
            assert!(!repeated, "repeated punctuation in {name:?}");
            assert!(!(pair[0] == ' ' && pair[1] == ' '), "double space in {name:?}");
        }
    }
}

#[test]
fn names_without_state_are_rejected() {
    assert_eq!(normalize_station_name("   "), Err(NormalizeError::EmptyName));
    assert!(matches!(
        normalize_station_name("Creek"),
        Err(NormalizeError::MissingState { .. })
    ));
    assert!(matches!(
        normalize_station_name("Creek,"),
        Err(NormalizeError::MissingState { .. })
    ));
}

#[test]
fn station_ids_are_padded_to_eight_digits() {
    assert_eq!(pad_station_id("1013500").unwrap(), "01013500");
    assert_eq!(pad_station_id(" 01013500 ").unwrap(), "01013500");
    assert_eq!(pad_station_id("1013500.0").unwrap(), "01013500");
    let padded = pad_station_id("42").unwrap();
    assert_eq!(padded.len(), STATION_ID_WIDTH);
    assert_eq!(pad_station_id(&padded).unwrap(), padded);
}

#[test]
fn region_codes_are_padded_to_two_digits() {
    assert_eq!(pad_region_code("1").unwrap(), "01");
    assert_eq!(pad_region_code("17").unwrap(), "17");
    assert!(matches!(
        pad_region_code("170"),
        Err(NormalizeError::TooLong { width: 2, .. })
    ));
}

#[test]
fn malformed_identifiers_are_rejected() {
    assert!(matches!(
        pad_station_id("01A13500"),
        Err(NormalizeError::NonNumeric { .. })
    ));
    assert!(matches!(
        pad_station_id(""),
        Err(NormalizeError::NonNumeric { .. })
    ));
    assert!(matches!(
        pad_station_id("123456789"),
        Err(NormalizeError::TooLong { width: 8, .. })
    ));
}

#[test]
fn name_table_is_normalized_and_renamed() {
    let path = fixture_path("camels_attributes_v2.0/camels_name.txt");
    let content = fs::read_to_string(&path).expect("fixture");
    let table = parse_attribute_table(AttributeGroup::Name, &content).expect("parse");
    let table = normalize_attribute_table(table, &path).expect("normalize");

    let names: Vec<String> = table
        .df
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect();
    assert_eq!(names, vec![STATION_ID_COLUMN, REGION_CODE_COLUMN, NAME_COLUMN]);

    let ids: Vec<Option<&str>> = table
        .df
        .column(STATION_ID_COLUMN)
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(
        ids,
        vec![Some("01013500"), Some("01022500"), Some("02064000")]
    );
    for id in ids.into_iter().flatten() {
        assert!(id.len() == 8 && id.chars().all(|c| c.is_ascii_digit()));
    }

    let regions: Vec<Option<&str>> = table
        .df
        .column(REGION_CODE_COLUMN)
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(regions, vec![Some("01"), Some("01"), Some("03")]);

    let second_name = table
        .df
        .column(NAME_COLUMN)
        .unwrap()
        .str()
        .unwrap()
        .get(1)
        .map(str::to_string);
    assert_eq!(
        second_name.as_deref(),
        Some("Narraguagus River At Cherryfield, ME")
    );
}

#[test]
fn bad_name_reports_file_and_station() {
    let content = "gauge_id;huc_02;gauge_name\n01013500;01;Lonely\n";
    let table = parse_attribute_table(AttributeGroup::Name, content).expect("parse");
    let path = PathBuf::from("camels_name.txt");
    let err = normalize_attribute_table(table, &path).unwrap_err();
    match err {
        PipelineError::Format {
            path, station_id, ..
        } => {
            assert_eq!(path, PathBuf::from("camels_name.txt"));
            assert_eq!(station_id.as_deref(), Some("01013500"));
        }
        other => panic!("expected Format error, got {other:?}"),
    }
}
