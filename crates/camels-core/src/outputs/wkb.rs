//! ISO well-known-binary encoding for basin outlines.

use geojson::Value as GeoJsonValue;
use thiserror::Error;

const LITTLE_ENDIAN: u8 = 1;
const WKB_POLYGON: u32 = 3;
const WKB_MULTIPOLYGON: u32 = 6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WkbError {
    #[error("geometry type {0} is not a polygon")]
    UnsupportedGeometry(&'static str),

    #[error("position has {0} ordinates, expected at least 2")]
    ShortPosition(usize),

    #[error("unexpected end of WKB at byte {0}")]
    Truncated(usize),

    #[error("WKB geometry type {0} is not supported")]
    UnknownType(u32),
}

/// Encodes a GeoJSON `Polygon` or `MultiPolygon` as little-endian 2D WKB.
pub fn encode_geometry(value: &GeoJsonValue) -> Result<Vec<u8>, WkbError> {
    let mut out = Vec::new();
    match value {
        GeoJsonValue::Polygon(rings) => write_polygon(&mut out, rings)?,
        GeoJsonValue::MultiPolygon(polygons) => {
            write_header(&mut out, WKB_MULTIPOLYGON);
            write_count(&mut out, polygons.len());
            for rings in polygons {
                write_polygon(&mut out, rings)?;
            }
        }
        other => return Err(WkbError::UnsupportedGeometry(kind_name(other))),
    }
    Ok(out)
}

fn kind_name(value: &GeoJsonValue) -> &'static str {
    match value {
        GeoJsonValue::Point(_) => "Point",
        GeoJsonValue::MultiPoint(_) => "MultiPoint",
        GeoJsonValue::LineString(_) => "LineString",
        GeoJsonValue::MultiLineString(_) => "MultiLineString",
        GeoJsonValue::Polygon(_) => "Polygon",
        GeoJsonValue::MultiPolygon(_) => "MultiPolygon",
        GeoJsonValue::GeometryCollection(_) => "GeometryCollection",
    }
}

fn write_header(out: &mut Vec<u8>, geometry_type: u32) {
    out.push(LITTLE_ENDIAN);
    out.extend_from_slice(&geometry_type.to_le_bytes());
}

fn write_count(out: &mut Vec<u8>, count: usize) {
    out.extend_from_slice(&(count as u32).to_le_bytes());
}

fn write_polygon(out: &mut Vec<u8>, rings: &[Vec<Vec<f64>>]) -> Result<(), WkbError> {
    write_header(out, WKB_POLYGON);
    write_count(out, rings.len());
    for ring in rings {
        write_count(out, ring.len());
        for position in ring {
            let [x, y] = match position.as_slice() {
                [x, y, ..] => [*x, *y],
                short => return Err(WkbError::ShortPosition(short.len())),
            };
            out.extend_from_slice(&x.to_le_bytes());
            out.extend_from_slice(&y.to_le_bytes());
        }
    }
    Ok(())
}

/// Decodes WKB written by [`encode_geometry`].
pub fn decode_geometry(bytes: &[u8]) -> Result<GeoJsonValue, WkbError> {
    let mut cursor = WkbCursor { bytes, offset: 0 };
    let value = cursor.geometry()?;
    Ok(value)
}

const POINT_SIZE: usize = 16;
const MIN_RING_SIZE: usize = 4;
const MIN_POLYGON_SIZE: usize = 1 + 4 + 4;

struct WkbCursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl WkbCursor<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], WkbError> {
        let end = self.offset + N;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or(WkbError::Truncated(self.offset))?;
        self.offset = end;
        let mut buf = [0u8; N];
        buf.copy_from_slice(slice);
        Ok(buf)
    }

    /// Caps a declared element count by what the remaining bytes can hold.
    fn capacity(&self, count: u32, min_item_size: usize) -> usize {
        let remaining = self.bytes.len().saturating_sub(self.offset);
        (count as usize).min(remaining / min_item_size)
    }

    fn u32(&mut self) -> Result<u32, WkbError> {
        self.take::<4>().map(u32::from_le_bytes)
    }

    fn f64(&mut self) -> Result<f64, WkbError> {
        self.take::<8>().map(f64::from_le_bytes)
    }

    fn header(&mut self) -> Result<u32, WkbError> {
        let [order] = self.take::<1>()?;
        if order != LITTLE_ENDIAN {
            return Err(WkbError::UnknownType(order as u32));
        }
        self.u32()
    }

    fn geometry(&mut self) -> Result<GeoJsonValue, WkbError> {
        match self.header()? {
            WKB_POLYGON => Ok(GeoJsonValue::Polygon(self.rings()?)),
            WKB_MULTIPOLYGON => {
                let count = self.u32()?;
                let mut polygons = Vec::with_capacity(self.capacity(count, MIN_POLYGON_SIZE));
                for _ in 0..count {
                    match self.header()? {
                        WKB_POLYGON => polygons.push(self.rings()?),
                        other => return Err(WkbError::UnknownType(other)),
                    }
                }
                Ok(GeoJsonValue::MultiPolygon(polygons))
            }
            other => Err(WkbError::UnknownType(other)),
        }
    }

    fn rings(&mut self) -> Result<Vec<Vec<Vec<f64>>>, WkbError> {
        let ring_count = self.u32()?;
        let mut rings = Vec::with_capacity(self.capacity(ring_count, MIN_RING_SIZE));
        for _ in 0..ring_count {
            let point_count = self.u32()?;
            let mut ring = Vec::with_capacity(self.capacity(point_count, POINT_SIZE));
            for _ in 0..point_count {
                ring.push(vec![self.f64()?, self.f64()?]);
            }
            rings.push(ring);
        }
        Ok(rings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64) -> Vec<Vec<f64>> {
        vec![
            vec![x0, y0],
            vec![x0, y0 + 1.0],
            vec![x0 + 1.0, y0 + 1.0],
            vec![x0 + 1.0, y0],
            vec![x0, y0],
        ]
    }

    #[test]
    fn polygon_header_and_length() {
        let polygon = GeoJsonValue::Polygon(vec![square(0.0, 0.0)]);
        let bytes = encode_geometry(&polygon).unwrap();
        assert_eq!(bytes[0], 1);
        assert_eq!(u32::from_le_bytes(bytes[1..5].try_into().unwrap()), 3);
        assert_eq!(u32::from_le_bytes(bytes[5..9].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(bytes[9..13].try_into().unwrap()), 5);
        assert_eq!(bytes.len(), 1 + 4 + 4 + 4 + 5 * 16);
    }

    #[test]
    fn multipolygon_decodes_to_same_rings() {
        let multi = GeoJsonValue::MultiPolygon(vec![
            vec![square(-69.0, 47.0)],
            vec![square(-68.0, 44.0), square(-67.5, 44.5)],
        ]);
        let bytes = encode_geometry(&multi).unwrap();
        assert_eq!(u32::from_le_bytes(bytes[1..5].try_into().unwrap()), 6);
        assert_eq!(decode_geometry(&bytes).unwrap(), multi);
    }

    #[test]
    fn rejects_points() {
        let point = GeoJsonValue::Point(vec![1.0, 2.0]);
        assert_eq!(
            encode_geometry(&point),
            Err(WkbError::UnsupportedGeometry("Point"))
        );
    }

    #[test]
    fn oversized_counts_fail_without_allocating_them() {
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&WKB_MULTIPOLYGON.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(decode_geometry(&bytes), Err(WkbError::Truncated(_))));

        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&WKB_POLYGON.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 16]);
        assert!(matches!(decode_geometry(&bytes), Err(WkbError::Truncated(_))));
    }

    #[test]
    fn truncated_input_is_an_error() {
        let bytes = encode_geometry(&GeoJsonValue::Polygon(vec![square(0.0, 0.0)])).unwrap();
        assert!(matches!(
            decode_geometry(&bytes[..20]),
            Err(WkbError::Truncated(_))
        ));
    }
}
