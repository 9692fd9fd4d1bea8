use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use camels_parser::schema::lookup_field;
use camels_parser::StreamflowSeries;
use chrono::{DateTime, NaiveDate};
use polars::prelude::*;

use crate::error::{PipelineError, Result};
use crate::join::{JoinedTable, GEOMETRY_COLUMN};
use crate::normalize::STATION_ID_COLUMN;

const STREAMFLOW_SOURCE: &str = "streamflow files";
const STATION_AXIS: &str = "station axis";

/// Daily discharge on a dense `time` × `station_id` grid.
///
/// `values` is row-major: the value for time `t` and station `s` lives at
/// `t * station_ids.len() + s`. Absent days are `NaN`.
#[derive(Debug, Clone)]
pub struct DischargeCube {
    pub station_ids: Vec<String>,
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl DischargeCube {
    pub fn n_time(&self) -> usize {
        self.dates.len()
    }

    pub fn n_station(&self) -> usize {
        self.station_ids.len()
    }

    pub fn get(&self, time: usize, station: usize) -> Option<f64> {
        if time >= self.n_time() || station >= self.n_station() {
            return None;
        }
        Some(self.values[time * self.n_station() + station])
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|value| value.is_nan()).count()
    }

    pub fn time_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((*self.dates.first()?, *self.dates.last()?))
    }

    /// Time coordinate as whole days since 1970-01-01.
    pub fn days_since_epoch(&self) -> Vec<i64> {
        let epoch = DateTime::UNIX_EPOCH.date_naive();
        self.dates
            .iter()
            .map(|date| date.signed_duration_since(epoch).num_days())
            .collect()
    }
}

/// Spreads per-station series onto the union of their dates.
///
/// `series` must cover `station_ids` exactly, with series gauge IDs already
/// in canonical padded form.
pub fn reshape_discharge(
    station_ids: &[String],
    series: &[StreamflowSeries],
) -> Result<DischargeCube> {
    let mut by_station: HashMap<&str, &StreamflowSeries> = HashMap::with_capacity(series.len());
    for entry in series {
        if by_station.insert(entry.gauge_id.as_str(), entry).is_some() {
            return Err(PipelineError::format(
                &PathBuf::from(format!("{}_streamflow_qc.txt", entry.gauge_id)),
                Some(entry.gauge_id.as_str()),
                "more than one streamflow series for station",
            ));
        }
        if !station_ids.contains(&entry.gauge_id) {
            return Err(PipelineError::join_mismatch(
                entry.gauge_id.as_str(),
                STREAMFLOW_SOURCE,
                STATION_AXIS,
            ));
        }
    }

    let mut ordered = Vec::with_capacity(station_ids.len());
    for station_id in station_ids {
        let entry = by_station.get(station_id.as_str()).ok_or_else(|| {
            PipelineError::join_mismatch(station_id.as_str(), STATION_AXIS, STREAMFLOW_SOURCE)
        })?;
        ordered.push(*entry);
    }

    let dates: Vec<NaiveDate> = ordered
        .iter()
        .flat_map(|entry| entry.dates.iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let time_index: HashMap<NaiveDate, usize> = dates
        .iter()
        .enumerate()
        .map(|(idx, date)| (*date, idx))
        .collect();

    let n_station = station_ids.len();
    let mut values = vec![f64::NAN; dates.len() * n_station];
    for (station, entry) in ordered.iter().enumerate() {
        for (date, discharge) in entry.dates.iter().zip(&entry.discharge) {
            if let (Some(value), Some(time)) = (discharge, time_index.get(date)) {
                values[time * n_station + station] = *value;
            }
        }
    }

    Ok(DischargeCube {
        station_ids: station_ids.to_vec(),
        dates,
        values,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuxValues {
    Float(Vec<f64>),
    Text(Vec<String>),
}

/// A per-station variable carried next to discharge in the array store.
#[derive(Debug, Clone, PartialEq)]
pub struct AuxVariable {
    pub name: String,
    pub units: Option<&'static str>,
    pub values: AuxValues,
}

/// The discharge cube plus every static attribute, aligned on `station_id`.
#[derive(Debug, Clone)]
pub struct ObservationDataset {
    pub cube: DischargeCube,
    pub auxiliary: Vec<AuxVariable>,
}

impl ObservationDataset {
    pub fn new(cube: DischargeCube, joined: &JoinedTable) -> Result<Self> {
        let table_path = PathBuf::from("joined attribute table");
        let polars_err = |err: PolarsError| PipelineError::format(&table_path, None, err);

        let ids = joined
            .df
            .column(STATION_ID_COLUMN)
            .and_then(|column| column.str())
            .map_err(polars_err)?;
        if ids.len() != cube.n_station() {
            return Err(PipelineError::format(
                &table_path,
                None,
                format!(
                    "table has {} stations but the discharge cube has {}",
                    ids.len(),
                    cube.n_station()
                ),
            ));
        }
        for (row, expected) in ids.into_iter().zip(&cube.station_ids) {
            if row != Some(expected.as_str()) {
                return Err(PipelineError::join_mismatch(
                    expected.as_str(),
                    STATION_AXIS,
                    "joined attribute table at the same position",
                ));
            }
        }

        let mut auxiliary = Vec::new();
        for column in joined.df.get_columns() {
            let name = column.name().as_str();
            if name == STATION_ID_COLUMN || name == GEOMETRY_COLUMN {
                continue;
            }
            let values = match column.dtype() {
                DataType::String => AuxValues::Text(
                    column
                        .str()
                        .map_err(polars_err)?
                        .into_iter()
                        .map(|value| value.unwrap_or_default().to_string())
                        .collect(),
                ),
                dtype if dtype.is_float() || dtype.is_integer() => {
                    let cast = column.cast(&DataType::Float64).map_err(polars_err)?;
                    AuxValues::Float(
                        cast.f64()
                            .map_err(polars_err)?
                            .into_iter()
                            .map(|value| value.unwrap_or(f64::NAN))
                            .collect(),
                    )
                }
                other => {
                    return Err(PipelineError::format(
                        &table_path,
                        None,
                        format!("column {name} has unsupported type {other}"),
                    ));
                }
            };
            auxiliary.push(AuxVariable {
                name: name.to_string(),
                units: lookup_field(name).and_then(|field| field.units),
                values,
            });
        }

        Ok(ObservationDataset { cube, auxiliary })
    }
}
