use std::collections::HashMap;

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::attributes::StationAttributes;
use crate::error::{PipelineError, Result};
use crate::normalize::{NormalizedBasins, NAME_COLUMN, REGION_CODE_COLUMN, STATION_ID_COLUMN};
use crate::outputs::wkb::encode_geometry;

pub const GEOMETRY_COLUMN: &str = "geometry";

const ATTRIBUTES_SOURCE: &str = "attribute tables";
const GEOMETRY_SOURCE: &str = "basin shapefile";

/// How stations present in only one of the attribute tables and the basin
/// shapefile are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinPolicy {
    /// Attribute stations define the output. Geometry-only stations are
    /// dropped and attribute stations without geometry keep a null outline.
    #[default]
    AttributesLeft,
    /// Any station missing from either side fails the run.
    Strict,
}

/// Attribute rows with their basin outline encoded as WKB.
#[derive(Debug, Clone)]
pub struct JoinedTable {
    pub df: DataFrame,
    /// Geometry-only stations left out under [`JoinPolicy::AttributesLeft`].
    pub dropped: Vec<String>,
    /// Attribute stations written with a null geometry.
    pub missing_geometry: Vec<String>,
}

impl JoinedTable {
    pub fn station_count(&self) -> usize {
        self.df.height()
    }
}

/// Joins basin outlines onto the merged attributes.
///
/// Output columns are `station_id`, `name`, `region_code`, `geometry`, then
/// every other attribute column in merge order.
pub fn join_geometries(
    attributes: &StationAttributes,
    basins: &NormalizedBasins,
    policy: JoinPolicy,
) -> Result<JoinedTable> {
    let mut outlines = HashMap::with_capacity(basins.shapes.len());
    for shape in &basins.shapes {
        if outlines
            .insert(shape.hru_id.as_str(), shape.geometry.as_ref())
            .is_some()
        {
            return Err(PipelineError::format(
                &basins.path,
                Some(shape.hru_id.as_str()),
                "duplicate basin identifier",
            ));
        }
    }

    let mut dropped: Vec<String> = basins
        .shapes
        .iter()
        .map(|shape| shape.hru_id.as_str())
        .filter(|id| attributes.station_ids.binary_search_by(|s| s.as_str().cmp(id)).is_err())
        .map(str::to_string)
        .collect();
    dropped.sort();

    if let Some(station_id) = dropped.first() {
        if policy == JoinPolicy::Strict {
            return Err(PipelineError::join_mismatch(
                station_id.as_str(),
                GEOMETRY_SOURCE,
                ATTRIBUTES_SOURCE,
            ));
        }
    }
    for station_id in &dropped {
        warn!(station_id = %station_id, "dropping basin without attributes");
    }

    let mut encoded: Vec<Option<Vec<u8>>> = Vec::with_capacity(attributes.station_count());
    let mut missing_geometry = Vec::new();
    for station_id in &attributes.station_ids {
        match outlines.get(station_id.as_str()) {
            Some(Some(geometry)) => {
                let wkb = encode_geometry(geometry).map_err(|err| {
                    PipelineError::format(&basins.path, Some(station_id.as_str()), err)
                })?;
                encoded.push(Some(wkb));
            }
            Some(None) => {
                warn!(station_id = %station_id, "basin record has a null shape");
                missing_geometry.push(station_id.clone());
                encoded.push(None);
            }
            None if policy == JoinPolicy::Strict => {
                return Err(PipelineError::join_mismatch(
                    station_id.as_str(),
                    ATTRIBUTES_SOURCE,
                    GEOMETRY_SOURCE,
                ));
            }
            None => {
                warn!(station_id = %station_id, "station has no basin geometry");
                missing_geometry.push(station_id.clone());
                encoded.push(None);
            }
        }
    }

    let df = assemble(attributes, &encoded).map_err(|err| {
        PipelineError::format(&basins.path, None, format!("failed to join geometries: {err}"))
    })?;

    info!(
        stations = df.height(),
        dropped = dropped.len(),
        missing_geometry = missing_geometry.len(),
        policy = ?policy,
        "joined basin geometries"
    );

    Ok(JoinedTable {
        df,
        dropped,
        missing_geometry,
    })
}

fn assemble(attributes: &StationAttributes, encoded: &[Option<Vec<u8>>]) -> PolarsResult<DataFrame> {
    const LEADING: [&str; 3] = [STATION_ID_COLUMN, NAME_COLUMN, REGION_CODE_COLUMN];

    let mut columns: Vec<Column> = Vec::with_capacity(attributes.df.width() + 1);
    for name in LEADING {
        columns.push(attributes.df.column(name)?.clone());
    }

    let wkb: Vec<Option<&[u8]>> = encoded.iter().map(|value| value.as_deref()).collect();
    columns.push(Series::new(GEOMETRY_COLUMN.into(), wkb).into());

    columns.extend(
        attributes
            .df
            .get_columns()
            .iter()
            .filter(|column| !LEADING.contains(&column.name().as_str()))
            .cloned(),
    );
    DataFrame::new(columns)
}
