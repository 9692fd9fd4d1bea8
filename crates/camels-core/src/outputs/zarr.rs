//! Zarr v3 store for the discharge cube and per-station attributes.
//!
//! Arrays carry both v3 `dimension_names` and the `_ARRAY_DIMENSIONS`
//! attribute so xarray can name their dimensions. Floats use NaN as fill.

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tempfile::TempDir;
use tracing::debug;
use zarrs::array::{Array, ArrayBuilder, ChunkGrid, DataType, FillValue};
use zarrs::filesystem::FilesystemStore;
use zarrs::group::{Group, GroupBuilder};

use crate::error::{PipelineError, Result};
use crate::fetch::ArchiveDigest;
use crate::normalize::STATION_ID_COLUMN;
use crate::reshape::{AuxValues, ObservationDataset};

pub const DISCHARGE_ARRAY: &str = "discharge";
pub const TIME_ARRAY: &str = "time";
pub const DEFAULT_TIME_CHUNK: usize = 3653;

const DIMENSIONS_ATTR: &str = "_ARRAY_DIMENSIONS";
const TIME_UNITS: &str = "days since 1970-01-01";
const CALENDAR: &str = "proleptic_gregorian";
const DISCHARGE_UNITS: &str = "cfs";
const NAN_FILL: &str = "NaN";

#[derive(Debug, Clone)]
pub struct ArrayStoreOptions {
    pub time_chunk: usize,
    pub title: String,
    pub source: String,
    pub archives: Vec<ArchiveDigest>,
}

impl Default for ArrayStoreOptions {
    fn default() -> Self {
        Self {
            time_chunk: DEFAULT_TIME_CHUNK,
            title: "CAMELS attributes v2.0 with USGS streamflow v1.2".to_string(),
            source: "https://ral.ucar.edu/solutions/products/camels".to_string(),
            archives: Vec::new(),
        }
    }
}

/// A complete store in a staging directory next to its final location.
///
/// Dropping it without [`StagedStore::publish`] removes the staging.
#[derive(Debug)]
pub struct StagedStore {
    staging: TempDir,
    target: PathBuf,
}

impl StagedStore {
    pub fn path(&self) -> &Path {
        self.staging.path()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Moves the staged store to its target, replacing an earlier store.
    pub fn publish(self) -> Result<()> {
        let StagedStore { staging, target } = self;
        if target.is_dir() {
            fs::remove_dir_all(&target).map_err(|err| PipelineError::write(&target, err))?;
        } else if target.exists() {
            return Err(PipelineError::write(
                &target,
                "target exists and is not a store directory",
            ));
        }
        let staged = staging.keep();
        if let Err(err) = fs::rename(&staged, &target) {
            let _ = fs::remove_dir_all(&staged);
            return Err(PipelineError::write(&target, err));
        }
        debug!(path = %target.display(), "array store published");
        Ok(())
    }
}

/// Writes `dataset` as a Zarr store at `path` and publishes it.
pub fn write_array_store(
    dataset: &ObservationDataset,
    path: &Path,
    options: &ArrayStoreOptions,
) -> Result<()> {
    stage_array_store(dataset, path, options)?.publish()
}

/// Writes `dataset` into a staging directory beside `path`.
pub fn stage_array_store(
    dataset: &ObservationDataset,
    path: &Path,
    options: &ArrayStoreOptions,
) -> Result<StagedStore> {
    if options.time_chunk == 0 {
        return Err(PipelineError::write(path, "time_chunk must be at least 1"));
    }
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|err| PipelineError::write(path, err))?;
    let staging = tempfile::Builder::new()
        .prefix(".camels-")
        .suffix(".partial")
        .tempdir_in(parent)
        .map_err(|err| PipelineError::write(path, err))?;

    let store = Arc::new(FilesystemStore::new(staging.path()).map_err(|err| zarr_err(path, err))?);
    let writer = StoreWriter { store, target: path };

    let group = GroupBuilder::new()
        .attributes(group_attributes(options))
        .build(writer.store.clone(), "/")
        .map_err(|err| zarr_err(path, err))?;
    group.store_metadata().map_err(|err| zarr_err(path, err))?;

    let cube = &dataset.cube;
    let n_time = cube.n_time() as u64;
    let n_station = cube.n_station() as u64;

    let discharge = writer.array(
        DISCHARGE_ARRAY,
        vec![n_time, n_station],
        vec![options.time_chunk as u64, n_station],
        DataType::Float64,
        FillValue::from(f64::NAN),
        &[TIME_ARRAY, STATION_ID_COLUMN],
        attributes(json!({
            "long_name": "observed daily mean streamflow",
            "units": DISCHARGE_UNITS,
            "_FillValue": NAN_FILL,
        })),
    )?;
    writer.store_elements(&discharge, &cube.values)?;

    let time = writer.array(
        TIME_ARRAY,
        vec![n_time],
        vec![n_time],
        DataType::Int64,
        FillValue::from(0i64),
        &[TIME_ARRAY],
        attributes(json!({
            "standard_name": "time",
            "units": TIME_UNITS,
            "calendar": CALENDAR,
        })),
    )?;
    writer.store_elements(&time, &cube.days_since_epoch())?;

    let stations = writer.array(
        STATION_ID_COLUMN,
        vec![n_station],
        vec![n_station],
        DataType::String,
        FillValue::from(""),
        &[STATION_ID_COLUMN],
        attributes(json!({
            "long_name": "USGS gauge identifier",
            "cf_role": "timeseries_id",
        })),
    )?;
    writer.store_elements(&stations, &cube.station_ids)?;

    for variable in &dataset.auxiliary {
        let mut attrs = Map::new();
        if let Some(units) = variable.units {
            attrs.insert("units".to_string(), json!(units));
        }
        match &variable.values {
            AuxValues::Float(values) => {
                attrs.insert("_FillValue".to_string(), json!(NAN_FILL));
                let array = writer.array(
                    &variable.name,
                    vec![n_station],
                    vec![n_station],
                    DataType::Float64,
                    FillValue::from(f64::NAN),
                    &[STATION_ID_COLUMN],
                    attrs,
                )?;
                writer.store_elements(&array, values)?;
            }
            AuxValues::Text(values) => {
                let array = writer.array(
                    &variable.name,
                    vec![n_station],
                    vec![n_station],
                    DataType::String,
                    FillValue::from(""),
                    &[STATION_ID_COLUMN],
                    attrs,
                )?;
                writer.store_elements(&array, values)?;
            }
        }
    }

    debug!(
        staging = %staging.path().display(),
        n_time,
        n_station,
        arrays = dataset.auxiliary.len() + 3,
        "array store staged"
    );
    Ok(StagedStore {
        staging,
        target: path.to_path_buf(),
    })
}

fn group_attributes(options: &ArrayStoreOptions) -> Map<String, Value> {
    let archives: Map<String, Value> = options
        .archives
        .iter()
        .map(|archive| (archive.name.clone(), json!(archive.blake3)))
        .collect();
    attributes(json!({
        "title": options.title,
        "source": options.source,
        "Conventions": "CF-1.8",
        "featureType": "timeSeries",
        "history": format!("{} created by camels", Utc::now().format("%Y-%m-%dT%H:%M:%SZ")),
        "source_archives_blake3": archives,
    }))
}

fn attributes(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn zarr_err(path: &Path, err: impl Display) -> PipelineError {
    PipelineError::write(path, err.to_string())
}

struct StoreWriter<'a> {
    store: Arc<FilesystemStore>,
    target: &'a Path,
}

impl StoreWriter<'_> {
    #[allow(clippy::too_many_arguments)]
    fn array(
        &self,
        name: &str,
        shape: Vec<u64>,
        chunk_shape: Vec<u64>,
        data_type: DataType,
        fill_value: FillValue,
        dimensions: &[&str],
        mut attrs: Map<String, Value>,
    ) -> Result<Array<FilesystemStore>> {
        let chunk_shape: Vec<u64> = chunk_shape.into_iter().map(|len| len.max(1)).collect();
        let chunk_grid: ChunkGrid = chunk_shape
            .try_into()
            .map_err(|err| zarr_err(self.target, format!("invalid chunk shape for {name}: {err}")))?;
        attrs.insert(DIMENSIONS_ATTR.to_string(), json!(dimensions));

        let array = ArrayBuilder::new(shape, data_type, chunk_grid, fill_value)
            .dimension_names(Some(dimensions.to_vec()))
            .attributes(attrs)
            .build(self.store.clone(), &format!("/{name}"))
            .map_err(|err| zarr_err(self.target, err))?;
        array
            .store_metadata()
            .map_err(|err| zarr_err(self.target, err))?;
        Ok(array)
    }

    fn store_elements<T: zarrs::array::Element>(
        &self,
        array: &Array<FilesystemStore>,
        elements: &[T],
    ) -> Result<()> {
        if elements.is_empty() {
            return Ok(());
        }
        array
            .store_array_subset_elements(&array.subset_all(), elements)
            .map_err(|err| zarr_err(self.target, err))
    }
}

/// Shape, type, and attributes of one array in a store.
#[derive(Debug, Clone)]
pub struct ArrayInfo {
    pub shape: Vec<u64>,
    pub data_type: DataType,
    /// Number of chunks along each dimension.
    pub chunk_grid_shape: Vec<u64>,
    pub attributes: Map<String, Value>,
}

impl ArrayInfo {
    pub fn dimensions(&self) -> Vec<String> {
        self.attributes
            .get(DIMENSIONS_ATTR)
            .and_then(Value::as_array)
            .map(|dims| {
                dims.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Read access to a store written by [`write_array_store`].
pub struct ZarrStore {
    root: PathBuf,
    store: Arc<FilesystemStore>,
    group: Group<FilesystemStore>,
}

impl ZarrStore {
    pub fn open(path: &Path) -> Result<Self> {
        let store = Arc::new(FilesystemStore::new(path).map_err(|err| zarr_err(path, err))?);
        let group = Group::open(store.clone(), "/").map_err(|err| zarr_err(path, err))?;
        Ok(Self {
            root: path.to_path_buf(),
            store,
            group,
        })
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        self.group.attributes()
    }

    pub fn array_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .group
            .child_array_paths(false)
            .map_err(|err| zarr_err(&self.root, err))?
            .iter()
            .map(|path| path.as_str().trim_start_matches('/').to_string())
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn array_info(&self, name: &str) -> Result<ArrayInfo> {
        let array = self.open_array(name)?;
        Ok(ArrayInfo {
            shape: array.shape().to_vec(),
            data_type: array.data_type().clone(),
            chunk_grid_shape: array.chunk_grid_shape().unwrap_or_default(),
            attributes: array.attributes().clone(),
        })
    }

    pub fn read_f64(&self, name: &str) -> Result<Vec<f64>> {
        self.read_elements(name, DataType::Float64)
    }

    pub fn read_i64(&self, name: &str) -> Result<Vec<i64>> {
        self.read_elements(name, DataType::Int64)
    }

    pub fn read_strings(&self, name: &str) -> Result<Vec<String>> {
        self.read_elements(name, DataType::String)
    }

    fn open_array(&self, name: &str) -> Result<Array<FilesystemStore>> {
        Array::open(self.store.clone(), &format!("/{name}")).map_err(|err| zarr_err(&self.root, err))
    }

    fn read_elements<T: zarrs::array::ElementOwned>(
        &self,
        name: &str,
        expected: DataType,
    ) -> Result<Vec<T>> {
        let array = self.open_array(name)?;
        if array.data_type() != &expected {
            return Err(zarr_err(
                &self.root,
                format!(
                    "array {name} has data type {:?}, expected {expected:?}",
                    array.data_type()
                ),
            ));
        }
        if array.shape().contains(&0) {
            return Ok(Vec::new());
        }
        array
            .retrieve_array_subset_elements::<T>(&array.subset_all())
            .map_err(|err| zarr_err(&self.root, err))
    }
}
