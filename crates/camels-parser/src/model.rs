use std::fmt;
use std::path::Path;

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::crs::SourceCrs;

/// Source file family of a CAMELS attribute table (`camels_<group>.txt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeGroup {
    Clim,
    Geol,
    Hydro,
    Name,
    Soil,
    Topo,
    Vege,
}

impl AttributeGroup {
    pub const ALL: [AttributeGroup; 7] = [
        AttributeGroup::Clim,
        AttributeGroup::Geol,
        AttributeGroup::Hydro,
        AttributeGroup::Name,
        AttributeGroup::Soil,
        AttributeGroup::Topo,
        AttributeGroup::Vege,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeGroup::Clim => "clim",
            AttributeGroup::Geol => "geol",
            AttributeGroup::Hydro => "hydro",
            AttributeGroup::Name => "name",
            AttributeGroup::Soil => "soil",
            AttributeGroup::Topo => "topo",
            AttributeGroup::Vege => "vege",
        }
    }

    /// Resolves the group from a path such as `.../camels_clim.txt`.
    pub fn from_path(path: &Path) -> Result<Self, String> {
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| format!("'{}' has no usable file stem", path.display()))?;
        let suffix = stem
            .strip_prefix("camels_")
            .ok_or_else(|| format!("'{stem}' is not a camels_<group> file"))?;
        Self::try_from(suffix)
    }
}

impl fmt::Display for AttributeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for AttributeGroup {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.trim().to_ascii_lowercase();
        AttributeGroup::ALL
            .into_iter()
            .find(|group| group.as_str() == lower)
            .ok_or_else(|| format!("unknown attribute group '{value}'"))
    }
}

/// One parsed `camels_<group>.txt` file.
///
/// `df` always starts with a `gauge_id` string column followed by the group's
/// fields in file order, typed according to [`crate::schema`].
#[derive(Debug, Clone)]
pub struct AttributeTable {
    pub group: AttributeGroup,
    pub df: DataFrame,
}

impl AttributeTable {
    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .into_iter()
            .skip(1)
            .map(|name| name.to_string())
            .collect()
    }
}

/// USGS data-quality flag attached to each daily streamflow value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityFlag {
    Approved,
    Estimated,
    Missing,
    Other(String),
}

impl QualityFlag {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "A" => QualityFlag::Approved,
            "A:e" => QualityFlag::Estimated,
            "M" => QualityFlag::Missing,
            other => QualityFlag::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamflowSeries {
    pub gauge_id: String,
    pub dates: Vec<NaiveDate>,
    pub discharge: Vec<Option<f64>>,
    pub flags: Vec<QualityFlag>,
}

impl StreamflowSeries {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.discharge.iter().filter(|value| value.is_none()).count()
    }

    pub fn estimated_count(&self) -> usize {
        self.flags
            .iter()
            .filter(|flag| **flag == QualityFlag::Estimated)
            .count()
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.dates.iter().min()?;
        let last = self.dates.iter().max()?;
        Some((*first, *last))
    }
}

/// A basin outline keyed by the raw `hru_id` of the shapefile record.
#[derive(Debug, Clone)]
pub struct BasinShape {
    pub hru_id: String,
    pub geometry: Option<geojson::Value>,
}

#[derive(Debug, Clone)]
pub struct BasinCollection {
    pub shapes: Vec<BasinShape>,
    pub crs: SourceCrs,
    /// True when no `.prj` accompanied the shapefile and lon/lat was assumed.
    pub crs_assumed: bool,
}
