use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::join::JoinPolicy;
use crate::outputs::zarr::DEFAULT_TIME_CHUNK;
use crate::outputs::TabularFormat;

const ARCHIVE_BASE_URL: &str = "https://ral.ucar.edu/sites/default/files/public/product-tool/camels-catchment-attributes-and-meteorology-for-large-sample-studies-dataset-downloads/";

const DEFAULT_ARCHIVES: [&str; 3] = [
    "camels_attributes_v2.0.zip",
    "basin_set_full_res.zip",
    "basin_timeseries_v1p2_metForcing_obsFlow.zip",
];

/// Run configuration. Every field has a default, so an empty TOML document
/// (or no file at all) describes the standard CAMELS conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub join_policy: JoinPolicy,
    pub sources: SourcesConfig,
    pub layout: LayoutConfig,
    pub outputs: OutputsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourcesConfig {
    /// When false, fetch and extraction are skipped and `data_dir` must
    /// already hold the extracted layout.
    pub download: bool,
    pub archives: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    pub attributes_dir: PathBuf,
    pub attributes_pattern: String,
    pub basin_shapefile: PathBuf,
    pub streamflow_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputsConfig {
    pub tabular_file: PathBuf,
    pub tabular_format: TabularFormat,
    pub array_store: PathBuf,
    pub time_chunk: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("."),
            join_policy: JoinPolicy::default(),
            sources: SourcesConfig::default(),
            layout: LayoutConfig::default(),
            outputs: OutputsConfig::default(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            download: true,
            archives: DEFAULT_ARCHIVES
                .iter()
                .map(|name| format!("{ARCHIVE_BASE_URL}{name}"))
                .collect(),
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            attributes_dir: PathBuf::from("camels_attributes_v2.0"),
            attributes_pattern: "camels_*.txt".to_string(),
            basin_shapefile: PathBuf::from("HCDN_nhru_final_671.shp"),
            streamflow_dir: PathBuf::from("basin_dataset_public_v1p2/usgs_streamflow"),
        }
    }
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            tabular_file: PathBuf::from("camels_attributes_v2.0.feather"),
            tabular_format: TabularFormat::default(),
            array_store: PathBuf::from("camels_attrs_v2_streamflow_v1p2.zarr"),
            time_chunk: DEFAULT_TIME_CHUNK,
        }
    }
}

impl Config {
    /// Reads and validates a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|err| PipelineError::Config {
            path: Some(path.to_path_buf()),
            message: err.to_string(),
        })?;
        Self::from_toml_str(&content, Some(path))
    }

    pub fn from_toml_str(content: &str, path: Option<&Path>) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|err| PipelineError::Config {
            path: path.map(Path::to_path_buf),
            message: err.to_string(),
        })?;
        config.validate_at(path)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_at(None)
    }

    fn validate_at(&self, path: Option<&Path>) -> Result<()> {
        let invalid = |message: &str| PipelineError::Config {
            path: path.map(Path::to_path_buf),
            message: message.to_string(),
        };
        if self.outputs.time_chunk == 0 {
            return Err(invalid("outputs.time_chunk must be at least 1"));
        }
        if self.sources.download && self.sources.archives.is_empty() {
            return Err(invalid(
                "sources.archives is empty while sources.download is enabled",
            ));
        }
        if self.layout.attributes_pattern.trim().is_empty() {
            return Err(invalid("layout.attributes_pattern is empty"));
        }
        Ok(())
    }

    pub fn attributes_dir(&self) -> PathBuf {
        self.data_dir.join(&self.layout.attributes_dir)
    }

    pub fn attributes_glob(&self) -> PathBuf {
        self.attributes_dir().join(&self.layout.attributes_pattern)
    }

    pub fn basin_shapefile(&self) -> PathBuf {
        self.data_dir.join(&self.layout.basin_shapefile)
    }

    pub fn streamflow_dir(&self) -> PathBuf {
        self.data_dir.join(&self.layout.streamflow_dir)
    }

    /// `<streamflow_dir>/<region_code>/<station_id>_streamflow_qc.txt`
    pub fn streamflow_file(&self, region_code: &str, station_id: &str) -> PathBuf {
        self.streamflow_dir()
            .join(region_code)
            .join(format!("{station_id}_streamflow_qc.txt"))
    }

    pub fn tabular_path(&self) -> PathBuf {
        self.output_dir.join(&self.outputs.tabular_file)
    }

    pub fn array_store_path(&self) -> PathBuf {
        self.output_dir.join(&self.outputs.array_store)
    }
}
