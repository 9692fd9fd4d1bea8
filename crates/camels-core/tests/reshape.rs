use std::fs;
use std::path::PathBuf;

use camels_core::reshape::{reshape_discharge, DischargeCube};
use camels_core::PipelineError;
use camels_parser::{parse_streamflow, StreamflowSeries};
use chrono::NaiveDate;

const STATIONS: [(&str, &str); 3] = [
    ("01", "01013500"),
    ("01", "01022500"),
    ("03", "02064000"),
];

fn fixture_series(region: &str, station: &str) -> StreamflowSeries {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../camels-parser/tests/data/basin_dataset_public_v1p2/usgs_streamflow")
        .join(region)
        .join(format!("{station}_streamflow_qc.txt"));
    let content = fs::read_to_string(&path).expect("fixture");
    parse_streamflow(&content).expect("parse")
}

fn station_ids() -> Vec<String> {
    STATIONS.iter().map(|(_, id)| id.to_string()).collect()
}

fn fixture_cube() -> DischargeCube {
    let series: Vec<StreamflowSeries> = STATIONS
        .iter()
        .map(|(region, id)| fixture_series(region, id))
        .collect();
    reshape_discharge(&station_ids(), &series).expect("reshape")
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(1980, 1, day).unwrap()
}

#[test]
fn time_axis_is_sorted_union_of_dates() {
    let cube = fixture_cube();
    let expected: Vec<NaiveDate> = (1..=8).chain([10]).map(date).collect();
    assert_eq!(cube.dates, expected);
    assert_eq!(cube.n_station(), 3);
    assert_eq!(cube.values.len(), 27);
    assert_eq!(cube.time_range(), Some((date(1), date(10))));
}

#[test]
fn gaps_and_missing_flags_are_nan_not_zero() {
    let cube = fixture_cube();
    assert_eq!(cube.missing_count(), 11);

    // 1980-01-03 is flagged missing at the first station
    assert!(cube.get(2, 0).unwrap().is_nan());
    // second station starts on the third
    assert!(cube.get(0, 1).unwrap().is_nan());
    assert_eq!(cube.get(2, 1), Some(203.0));
    // true zero discharge survives
    assert_eq!(cube.get(1, 2), Some(0.0));
    assert_eq!(cube.get(2, 2), Some(0.0));
    // last row only has the third station
    assert!(cube.get(8, 0).unwrap().is_nan());
    assert_eq!(cube.get(8, 2), Some(11.2));
    assert_eq!(cube.get(9, 0), None);
}

#[test]
fn time_coordinate_counts_days_since_epoch() {
    let cube = fixture_cube();
    let days = cube.days_since_epoch();
    assert_eq!(days[0], 3652);
    assert_eq!(days[8], 3661);
}

#[test]
fn station_without_series_is_a_join_mismatch() {
    let series = vec![
        fixture_series("01", "01013500"),
        fixture_series("01", "01022500"),
    ];
    let err = reshape_discharge(&station_ids(), &series).unwrap_err();
    match err {
        PipelineError::JoinMismatch { station_id, .. } => assert_eq!(station_id, "02064000"),
        other => panic!("expected JoinMismatch, got {other:?}"),
    }
}

#[test]
fn series_outside_station_axis_is_a_join_mismatch() {
    let series: Vec<StreamflowSeries> = STATIONS
        .iter()
        .map(|(region, id)| fixture_series(region, id))
        .collect();
    let err = reshape_discharge(&station_ids()[..2], &series).unwrap_err();
    assert!(matches!(err, PipelineError::JoinMismatch { .. }));
}
