use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use camels_parser::{
    attribute_group_for, parse_attribute_table, parse_streamflow, read_basin_shapefile,
    AttributeGroup, StreamflowSeries,
};
use chrono::NaiveDate;
use polars::prelude::PolarsError;
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn};

use crate::attributes::{merge_attribute_tables, SourcedTable};
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::fetch::{fetch_archives, ArchiveDigest};
use crate::join::{join_geometries, JoinedTable};
use crate::normalize::{
    normalize_attribute_table, normalize_basins, pad_station_id, NormalizedBasins,
    REGION_CODE_COLUMN, STATION_ID_COLUMN,
};
use crate::outputs::zarr::{DISCHARGE_ARRAY, TIME_ARRAY};
use crate::outputs::{
    read_tabular, stage_array_store, stage_tabular, ArrayStoreOptions, TabularFormat, ZarrStore,
};
use crate::reshape::{reshape_discharge, DischargeCube, ObservationDataset};

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub station_count: usize,
    pub dropped_stations: Vec<String>,
    pub missing_geometry: Vec<String>,
    pub attribute_columns: usize,
    pub time_steps: usize,
    pub time_start: Option<NaiveDate>,
    pub time_end: Option<NaiveDate>,
    pub missing_cells: usize,
    pub total_cells: usize,
    pub tabular_path: PathBuf,
    pub array_store_path: PathBuf,
    pub archives: Vec<ArchiveDigest>,
}

/// Runs the full conversion: fetch, load, normalize, join, stage the table,
/// reshape streamflow, stage the array store, read both back, then publish
/// both. A failed run leaves nothing at the output paths.
pub fn run(config: &Config) -> Result<RunSummary> {
    config.validate()?;

    let archives = stage("fetch", || {
        if !config.sources.download {
            info!("download disabled, reading extracted layout");
            return Ok(Vec::new());
        }
        let fetched = fetch_archives(&config.sources.archives, &config.data_dir)?;
        Ok(fetched.iter().map(|archive| archive.digest()).collect::<Vec<_>>())
    })?;

    let basins = stage("load_basins", || load_basins(&config.basin_shapefile()))?;
    let tables = stage("load_attributes", || load_attributes(config))?;
    let attributes = stage("merge_attributes", || merge_attribute_tables(tables))?;
    let joined = stage("join", || {
        join_geometries(&attributes, &basins, config.join_policy)
    })?;

    let tabular_path = config.tabular_path();
    let tabular_format = config.outputs.tabular_format;
    let staged_table = stage("write_tabular", || {
        stage_tabular(&joined.df, &tabular_path, tabular_format)
    })?;

    let series = stage("load_streamflow", || load_streamflow(config, &joined))?;
    let dataset = stage("reshape", || {
        let cube = reshape_discharge(&attributes.station_ids, &series)?;
        ObservationDataset::new(cube, &joined)
    })?;
    drop(series);

    let array_store_path = config.array_store_path();
    let options = ArrayStoreOptions {
        time_chunk: config.outputs.time_chunk,
        archives: archives.clone(),
        ..ArrayStoreOptions::default()
    };
    let staged_store = stage("write_array", || {
        stage_array_store(&dataset, &array_store_path, &options)
    })?;

    stage("verify", || {
        verify_outputs(
            staged_table.path(),
            tabular_format,
            staged_store.path(),
            &joined,
            &dataset.cube,
        )
    })?;

    // nothing is visible at the output paths until both artifacts check out
    stage("publish", || {
        staged_store.publish()?;
        staged_table.publish()
    })?;

    let cube = &dataset.cube;
    let (time_start, time_end) = cube.time_range().unzip();
    Ok(RunSummary {
        station_count: joined.station_count(),
        dropped_stations: joined.dropped.clone(),
        missing_geometry: joined.missing_geometry.clone(),
        attribute_columns: dataset.auxiliary.len(),
        time_steps: cube.n_time(),
        time_start,
        time_end,
        missing_cells: cube.missing_count(),
        total_cells: cube.values.len(),
        tabular_path,
        array_store_path,
        archives,
    })
}

fn stage<T>(name: &'static str, body: impl FnOnce() -> Result<T>) -> Result<T> {
    let span = info_span!("stage", stage = name);
    let _entered = span.enter();
    let started = Instant::now();
    info!("stage started");
    let outcome = body();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &outcome {
        Ok(_) => info!(elapsed_ms, "stage finished"),
        Err(err) => error!(elapsed_ms, error = %err, "stage failed"),
    }
    outcome
}

pub fn load_basins(path: &Path) -> Result<NormalizedBasins> {
    if !path.is_file() {
        return Err(PipelineError::input_fetch(
            path.display().to_string(),
            "basin shapefile not found",
        ));
    }
    let collection = read_basin_shapefile(path).map_err(|err| PipelineError::format(path, None, err))?;
    if collection.crs_assumed {
        warn!(path = %path.display(), "no .prj next to basin shapefile, assuming lon/lat");
    }
    let basins = normalize_basins(collection, path)?;
    info!(basins = basins.shapes.len(), "loaded basin outlines");
    Ok(basins)
}

pub fn load_attributes(config: &Config) -> Result<Vec<SourcedTable>> {
    let pattern = config.attributes_glob();
    let pattern_text = pattern.to_string_lossy().into_owned();
    let entries = glob::glob(&pattern_text).map_err(|err| PipelineError::Config {
        path: None,
        message: format!("invalid attributes pattern '{pattern_text}': {err}"),
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|err| PipelineError::input_fetch(pattern_text.as_str(), err))?;
        paths.push(path);
    }
    paths.sort();
    if paths.is_empty() {
        return Err(PipelineError::input_fetch(
            pattern_text,
            "no attribute tables matched",
        ));
    }

    let mut tables = Vec::with_capacity(paths.len());
    for path in paths {
        let group =
            attribute_group_for(&path).map_err(|err| PipelineError::format(&path, None, err))?;
        let content = fs::read_to_string(&path)
            .map_err(|err| PipelineError::input_fetch(path.display().to_string(), err))?;
        let table = parse_attribute_table(group, &content)
            .map_err(|err| PipelineError::format(&path, None, err))?;
        debug!(
            path = %path.display(),
            group = %group,
            rows = table.height(),
            fields = table.field_names().len(),
            "parsed attribute table"
        );
        let table = normalize_attribute_table(table, &path)?;
        tables.push(SourcedTable { path, table });
    }

    if !tables
        .iter()
        .any(|sourced| sourced.table.group == AttributeGroup::Name)
    {
        let expected = config.attributes_dir().join("camels_name.txt");
        return Err(PipelineError::input_fetch(
            expected.display().to_string(),
            "the name table is required for station names and region codes",
        ));
    }
    info!(tables = tables.len(), "loaded attribute tables");
    Ok(tables)
}

/// Reads one streamflow file per joined station, in station order.
pub fn load_streamflow(config: &Config, joined: &JoinedTable) -> Result<Vec<StreamflowSeries>> {
    let table_err = |err: PolarsError| PipelineError::format(&config.tabular_path(), None, err);
    let ids = joined
        .df
        .column(STATION_ID_COLUMN)
        .and_then(|column| column.str())
        .map_err(table_err)?;
    let regions = joined
        .df
        .column(REGION_CODE_COLUMN)
        .and_then(|column| column.str())
        .map_err(table_err)?;

    let mut series = Vec::with_capacity(ids.len());
    for (station_id, region_code) in ids.into_iter().zip(regions) {
        let (Some(station_id), Some(region_code)) = (station_id, region_code) else {
            return Err(PipelineError::format(
                &config.tabular_path(),
                None,
                "station without identifier or region code",
            ));
        };
        let path = config.streamflow_file(region_code, station_id);
        let content = fs::read_to_string(&path)
            .map_err(|err| PipelineError::input_fetch(path.display().to_string(), err))?;
        let mut parsed = parse_streamflow(&content)
            .map_err(|err| PipelineError::format(&path, Some(station_id), err))?;
        parsed.gauge_id = pad_station_id(&parsed.gauge_id)
            .map_err(|err| PipelineError::format(&path, Some(station_id), err))?;
        if parsed.gauge_id != station_id {
            return Err(PipelineError::format(
                &path,
                Some(station_id),
                format!("file holds gauge {}", parsed.gauge_id),
            ));
        }
        debug!(
            station_id,
            days = parsed.len(),
            missing = parsed.missing_count(),
            estimated = parsed.estimated_count(),
            "parsed streamflow"
        );
        series.push(parsed);
    }
    info!(stations = series.len(), "loaded streamflow series");
    Ok(series)
}

/// Reads both artifacts back and checks them against what was written.
pub fn verify_outputs(
    tabular_path: &Path,
    tabular_format: TabularFormat,
    store_path: &Path,
    joined: &JoinedTable,
    cube: &DischargeCube,
) -> Result<()> {
    let table = read_tabular(tabular_path, tabular_format)?;
    if table.height() != joined.df.height() {
        return Err(PipelineError::write(
            tabular_path,
            format!(
                "read back {} rows, wrote {}",
                table.height(),
                joined.df.height()
            ),
        ));
    }
    if table.get_column_names() != joined.df.get_column_names() {
        return Err(PipelineError::write(
            tabular_path,
            "column set changed on read back",
        ));
    }

    let store = ZarrStore::open(store_path)?;
    let discharge = store.array_info(DISCHARGE_ARRAY)?;
    let expected_shape = vec![cube.n_time() as u64, cube.n_station() as u64];
    if discharge.shape != expected_shape {
        return Err(PipelineError::write(
            store_path,
            format!(
                "discharge shape {:?}, expected {:?}",
                discharge.shape, expected_shape
            ),
        ));
    }
    let time = store.read_i64(TIME_ARRAY)?;
    if time.len() != cube.n_time() {
        return Err(PipelineError::write(
            store_path,
            format!("time axis has {} entries, expected {}", time.len(), cube.n_time()),
        ));
    }
    let station_ids = store.read_strings(STATION_ID_COLUMN)?;
    if station_ids != cube.station_ids {
        return Err(PipelineError::write(
            store_path,
            "station axis changed on read back",
        ));
    }
    info!(
        rows = table.height(),
        time = cube.n_time(),
        stations = cube.n_station(),
        "outputs verified"
    );
    Ok(())
}
