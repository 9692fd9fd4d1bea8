use std::fs;
use std::path::Path;

use camels_core::join::JoinedTable;
use camels_core::outputs::zarr::{DISCHARGE_ARRAY, TIME_ARRAY};
use camels_core::outputs::{
    read_tabular, stage_array_store, stage_tabular, write_array_store, write_tabular,
    ArrayStoreOptions, TabularFormat, ZarrStore,
};
use camels_core::reshape::{AuxValues, DischargeCube, ObservationDataset};
use camels_core::PipelineError;
use chrono::NaiveDate;
use polars::prelude::*;
use tempfile::tempdir;
use zarrs::array::DataType;

fn sample_table() -> DataFrame {
    let geometry: Vec<Option<&[u8]>> = vec![Some(&[1u8, 3, 0, 0, 0][..]), None];
    DataFrame::new(vec![
        Series::new("station_id".into(), vec!["01013500", "02064000"]).into(),
        Series::new(
            "name".into(),
            vec!["Fish River Near Fort Kent, Maine", "Falling River Near Naruna, VA"],
        )
        .into(),
        Series::new("region_code".into(), vec!["01", "03"]).into(),
        Series::new("geometry".into(), geometry).into(),
        Series::new("elev_mean".into(), vec![Some(250.31), None]).into(),
        Series::new("low_prec_timing".into(), vec![Some("mam"), None]).into(),
    ])
    .expect("sample frame")
}

fn sample_dataset() -> (ObservationDataset, JoinedTable) {
    let joined = JoinedTable {
        df: sample_table(),
        dropped: Vec::new(),
        missing_geometry: vec!["02064000".to_string()],
    };
    let dates: Vec<NaiveDate> = (1..=9)
        .map(|day| NaiveDate::from_ymd_opt(1980, 1, day).unwrap())
        .collect();
    let mut values = Vec::new();
    for t in 0..dates.len() {
        values.push(if t == 4 { f64::NAN } else { t as f64 * 10.0 });
        values.push(if t < 2 { f64::NAN } else { 0.5 });
    }
    let cube = DischargeCube {
        station_ids: vec!["01013500".to_string(), "02064000".to_string()],
        dates,
        values,
    };
    let dataset = ObservationDataset::new(cube, &joined).expect("dataset");
    (dataset, joined)
}

fn staging_residue(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".camels-"))
        .collect()
}

fn names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect()
}

#[test]
fn feather_round_trip_keeps_rows_and_columns() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stations.feather");
    let df = sample_table();

    write_tabular(&df, &path, TabularFormat::Feather).expect("write feather");
    let read = read_tabular(&path, TabularFormat::Feather).expect("read feather");

    assert_eq!(read.height(), df.height());
    assert_eq!(names(&read), names(&df));
    assert_eq!(read.column("geometry").unwrap().null_count(), 1);
    assert!(staging_residue(dir.path()).is_empty());
}

#[test]
fn parquet_round_trip_keeps_rows_and_columns() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested/stations.parquet");
    let df = sample_table();

    write_tabular(&df, &path, TabularFormat::Parquet).expect("write parquet");
    let read = read_tabular(&path, TabularFormat::Parquet).expect("read parquet");

    assert_eq!(read.height(), 2);
    assert_eq!(names(&read), names(&df));
}

#[test]
fn failed_tabular_write_leaves_no_residue() {
    let dir = tempdir().unwrap();
    let blocked = dir.path().join("stations.feather");
    fs::create_dir(&blocked).unwrap();
    fs::write(blocked.join("keep.txt"), b"occupied").unwrap();

    let err = write_tabular(&sample_table(), &blocked, TabularFormat::Feather).unwrap_err();
    assert!(matches!(err, PipelineError::Write { .. }));
    assert!(blocked.is_dir());
    assert!(staging_residue(dir.path()).is_empty());
}

#[test]
fn dataset_carries_every_non_geometry_column() {
    let (dataset, _) = sample_dataset();
    let aux: Vec<&str> = dataset
        .auxiliary
        .iter()
        .map(|variable| variable.name.as_str())
        .collect();
    assert_eq!(aux, vec!["name", "region_code", "elev_mean", "low_prec_timing"]);

    let elev = &dataset.auxiliary[2];
    assert_eq!(elev.units, Some("m"));
    match &elev.values {
        AuxValues::Float(values) => {
            assert_eq!(values[0], 250.31);
            assert!(values[1].is_nan());
        }
        other => panic!("expected floats, got {other:?}"),
    }
}

#[test]
fn dataset_rejects_misaligned_station_axis() {
    let (dataset, joined) = sample_dataset();
    let mut cube = dataset.cube;
    cube.station_ids.reverse();
    let err = ObservationDataset::new(cube, &joined).unwrap_err();
    assert!(matches!(err, PipelineError::JoinMismatch { .. }));
}

#[test]
fn array_store_round_trip_keeps_dimensions_and_missing_pattern() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("camels.zarr");
    let (dataset, _) = sample_dataset();
    let options = ArrayStoreOptions {
        time_chunk: 4,
        ..ArrayStoreOptions::default()
    };

    write_array_store(&dataset, &path, &options).expect("write store");
    let store = ZarrStore::open(&path).expect("open store");

    let discharge = store.array_info(DISCHARGE_ARRAY).unwrap();
    assert_eq!(discharge.shape, vec![9, 2]);
    assert_eq!(discharge.data_type, DataType::Float64);
    // three chunks along time, one across stations
    assert_eq!(discharge.chunk_grid_shape, vec![3, 1]);
    assert_eq!(discharge.dimensions(), vec!["time", "station_id"]);
    assert_eq!(discharge.attributes["units"], "cfs");
    assert_eq!(discharge.attributes["_FillValue"], "NaN");

    let values = store.read_f64(DISCHARGE_ARRAY).unwrap();
    assert_eq!(values.len(), dataset.cube.values.len());
    for (read, written) in values.iter().zip(&dataset.cube.values) {
        assert_eq!(read.is_nan(), written.is_nan());
        if !written.is_nan() {
            assert_eq!(read, written);
        }
    }

    let time = store.read_i64(TIME_ARRAY).unwrap();
    assert_eq!(time, (3652..3661).collect::<Vec<i64>>());
    let time_info = store.array_info(TIME_ARRAY).unwrap();
    assert_eq!(time_info.attributes["units"], "days since 1970-01-01");
    assert_eq!(time_info.attributes["calendar"], "proleptic_gregorian");

    assert_eq!(
        store.read_strings("station_id").unwrap(),
        vec!["01013500", "02064000"]
    );
    assert_eq!(
        store.read_strings("low_prec_timing").unwrap(),
        vec!["mam", ""]
    );
    assert_eq!(
        store.read_strings("name").unwrap()[0],
        "Fish River Near Fort Kent, Maine"
    );
    let elev = store.read_f64("elev_mean").unwrap();
    assert_eq!(elev[0], 250.31);
    assert!(elev[1].is_nan());
    assert_eq!(store.array_info("elev_mean").unwrap().attributes["units"], "m");

    let names = store.array_names().unwrap();
    assert_eq!(names.len(), 3 + dataset.auxiliary.len());
    for name in &names {
        assert!(
            !store.array_info(name).unwrap().dimensions().is_empty(),
            "{name} has no _ARRAY_DIMENSIONS"
        );
    }
    assert_eq!(store.attributes()["Conventions"], "CF-1.8");
    assert!(staging_residue(dir.path()).is_empty());
}

#[test]
fn reading_with_the_wrong_type_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("camels.zarr");
    let (dataset, _) = sample_dataset();
    write_array_store(&dataset, &path, &ArrayStoreOptions::default()).unwrap();

    let store = ZarrStore::open(&path).unwrap();
    assert!(store.read_strings(DISCHARGE_ARRAY).is_err());
    assert!(store.read_f64("absent").is_err());
}

#[test]
fn array_store_replaces_previous_store() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("camels.zarr");
    let (dataset, _) = sample_dataset();

    write_array_store(&dataset, &path, &ArrayStoreOptions::default()).unwrap();
    fs::write(path.join("stale"), b"old run").unwrap();
    write_array_store(&dataset, &path, &ArrayStoreOptions::default()).unwrap();

    assert!(!path.join("stale").exists());
    let store = ZarrStore::open(&path).unwrap();
    assert_eq!(
        store.array_info(DISCHARGE_ARRAY).unwrap().chunk_grid_shape,
        vec![1, 1]
    );
}

#[test]
fn failed_array_store_write_leaves_no_residue() {
    let dir = tempdir().unwrap();
    let blocked = dir.path().join("camels.zarr");
    fs::write(&blocked, b"not a directory").unwrap();
    let (dataset, _) = sample_dataset();

    let err = write_array_store(&dataset, &blocked, &ArrayStoreOptions::default()).unwrap_err();
    assert!(matches!(err, PipelineError::Write { .. }));
    assert_eq!(fs::read(&blocked).unwrap(), b"not a directory");
    assert!(staging_residue(dir.path()).is_empty());
}

#[test]
fn zero_time_chunk_is_rejected_before_writing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("camels.zarr");
    let (dataset, _) = sample_dataset();
    let options = ArrayStoreOptions {
        time_chunk: 0,
        ..ArrayStoreOptions::default()
    };

    assert!(write_array_store(&dataset, &path, &options).is_err());
    assert!(!path.exists());
}

#[test]
fn staged_outputs_stay_hidden_until_published() {
    let dir = tempdir().unwrap();
    let table_path = dir.path().join("stations.feather");
    let store_path = dir.path().join("camels.zarr");
    let (dataset, _) = sample_dataset();

    let table = stage_tabular(&sample_table(), &table_path, TabularFormat::Feather).unwrap();
    let store = stage_array_store(&dataset, &store_path, &ArrayStoreOptions::default()).unwrap();
    assert!(!table_path.exists());
    assert!(!store_path.exists());
    assert_eq!(
        read_tabular(table.path(), TabularFormat::Feather).unwrap().height(),
        2
    );
    assert_eq!(ZarrStore::open(store.path()).unwrap().read_f64("elev_mean").unwrap().len(), 2);

    store.publish().unwrap();
    table.publish().unwrap();
    assert!(table_path.is_file());
    assert!(store_path.is_dir());
    assert!(staging_residue(dir.path()).is_empty());
}

#[test]
fn dropped_staging_is_removed() {
    let dir = tempdir().unwrap();
    let (dataset, _) = sample_dataset();

    let table = stage_tabular(
        &sample_table(),
        &dir.path().join("stations.feather"),
        TabularFormat::Feather,
    )
    .unwrap();
    let store = stage_array_store(
        &dataset,
        &dir.path().join("camels.zarr"),
        &ArrayStoreOptions::default(),
    )
    .unwrap();
    assert_eq!(staging_residue(dir.path()).len(), 2);

    drop(table);
    drop(store);
    assert!(staging_residue(dir.path()).is_empty());
}
