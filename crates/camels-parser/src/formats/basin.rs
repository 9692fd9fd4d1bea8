use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use geojson::Value as GeoJsonValue;
use shapefile::dbase::{FieldValue, Record};
use shapefile::{PolygonRing, Shape};

use crate::crs::SourceCrs;
use crate::errors::ParserError;
use crate::model::{BasinCollection, BasinShape};

const NAME: &str = "BASIN_SHAPEFILE";

pub const HRU_ID_FIELD: &str = "hru_id";

type Ring = Vec<Vec<f64>>;

/// Reads basin outlines from a polygon shapefile and its sibling `.dbf`/`.prj`.
///
/// Coordinates come back as `[lon, lat]` degrees. A missing `.prj` is read as
/// geographic and flagged through [`BasinCollection::crs_assumed`].
pub fn read_basin_shapefile(path: &Path) -> Result<BasinCollection, ParserError> {
    let prj_path = path.with_extension("prj");
    let (crs, crs_assumed) = match fs::read_to_string(&prj_path) {
        Ok(wkt) => (SourceCrs::from_wkt(&wkt)?, false),
        Err(err) if err.kind() == ErrorKind::NotFound => (SourceCrs::Geographic, true),
        Err(err) => {
            return Err(ParserError::Io {
                path: prj_path,
                source: err,
            })
        }
    };

    let mut reader =
        shapefile::Reader::from_path(path).map_err(|err| ParserError::Shapefile {
            path: path.to_path_buf(),
            source: err,
        })?;

    let mut basins = Vec::new();
    for (idx, result) in reader.iter_shapes_and_records().enumerate() {
        let record_index = idx + 1;
        let (shape, record) = result.map_err(|err| ParserError::Shapefile {
            path: path.to_path_buf(),
            source: err,
        })?;

        let hru_id = hru_id(&record, record_index)?;
        let geometry = match shape {
            Shape::NullShape => None,
            Shape::Polygon(polygon) => Some(polygon_to_geojson(
                polygon.rings(),
                &crs,
                &hru_id,
            )?),
            other => {
                return Err(ParserError::FormatMismatch {
                    parser: NAME,
                    reason: format!(
                        "record {record_index} ({hru_id}) has unsupported shape type {:?}",
                        other.shapetype()
                    ),
                });
            }
        };

        basins.push(BasinShape { hru_id, geometry });
    }

    if basins.is_empty() {
        return Err(ParserError::EmptyData { parser: NAME });
    }

    Ok(BasinCollection {
        shapes: basins,
        crs,
        crs_assumed,
    })
}

fn hru_id(record: &Record, record_index: usize) -> Result<String, ParserError> {
    let invalid = |message: String| ParserError::DataRow {
        parser: NAME,
        line_index: record_index,
        message,
    };

    match record.get(HRU_ID_FIELD) {
        Some(FieldValue::Numeric(Some(value))) => integral_id(*value).ok_or_else(|| {
            invalid(format!("{HRU_ID_FIELD} {value} is not a non-negative integer"))
        }),
        Some(FieldValue::Double(value)) => integral_id(*value).ok_or_else(|| {
            invalid(format!("{HRU_ID_FIELD} {value} is not a non-negative integer"))
        }),
        Some(FieldValue::Integer(value)) if *value >= 0 => Ok(value.to_string()),
        Some(FieldValue::Character(Some(value))) if !value.trim().is_empty() => {
            Ok(value.trim().to_string())
        }
        Some(other) => Err(invalid(format!(
            "unsupported {HRU_ID_FIELD} value {other:?}"
        ))),
        None => Err(invalid(format!("record is missing the {HRU_ID_FIELD} field"))),
    }
}

fn integral_id(value: f64) -> Option<String> {
    if value >= 0.0 && value.fract() == 0.0 && value < 1e15 {
        Some(format!("{value:.0}"))
    } else {
        None
    }
}

/// Groups shapefile rings into polygons: every outer ring opens a polygon and
/// the inner rings that follow are its holes.
fn polygon_to_geojson(
    rings: &[PolygonRing<shapefile::Point>],
    crs: &SourceCrs,
    hru_id: &str,
) -> Result<GeoJsonValue, ParserError> {
    let mut polygons: Vec<Vec<Ring>> = Vec::new();
    for ring in rings {
        let coords = ring
            .points()
            .iter()
            .map(|point| crs.to_lon_lat(point.x, point.y).map(|pos| pos.to_vec()))
            .collect::<Result<Ring, _>>()?;
        match ring {
            PolygonRing::Outer(_) => polygons.push(vec![coords]),
            PolygonRing::Inner(_) => match polygons.last_mut() {
                Some(polygon) => polygon.push(coords),
                None => {
                    return Err(ParserError::Validation {
                        parser: NAME,
                        message: format!("basin {hru_id} has a hole before any outer ring"),
                    });
                }
            },
        }
    }

    match polygons.len() {
        0 => Err(ParserError::Validation {
            parser: NAME,
            message: format!("basin {hru_id} polygon has no rings"),
        }),
        1 => Ok(GeoJsonValue::Polygon(polygons.remove(0))),
        _ => Ok(GeoJsonValue::MultiPolygon(polygons)),
    }
}
