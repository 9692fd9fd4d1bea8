//! Coordinate reference handling for basin shapefiles.
//!
//! Basin outlines are published either in geographic NAD83 coordinates or in
//! the USGS CONUS Albers equal-area projection. Both are brought to lon/lat
//! degrees; the NAD83 to WGS84 datum shift is below a metre and ignored.

use crate::errors::ParserError;

const MAX_ITERATIONS: usize = 25;
const CONVERGENCE: f64 = 1e-12;

/// The source coordinate system of a shapefile, as read from its `.prj`.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceCrs {
    Geographic,
    Albers(AlbersEqualArea),
}

impl SourceCrs {
    /// Parses an ESRI WKT projection string.
    pub fn from_wkt(wkt: &str) -> Result<Self, ParserError> {
        let trimmed = wkt.trim();
        if trimmed.starts_with("GEOGCS") {
            return Ok(SourceCrs::Geographic);
        }
        if !trimmed.starts_with("PROJCS") {
            return Err(ParserError::Projection {
                message: format!(
                    "expected GEOGCS or PROJCS, found '{}'",
                    trimmed.chars().take(16).collect::<String>()
                ),
            });
        }

        let projection = quoted_after(trimmed, "PROJECTION[").ok_or_else(|| {
            ParserError::Projection {
                message: "PROJCS without PROJECTION".to_string(),
            }
        })?;
        let normalized = projection.to_ascii_lowercase();
        if !normalized.starts_with("albers") {
            return Err(ParserError::Projection {
                message: format!("projection '{projection}' is not supported"),
            });
        }

        let (semi_major, inverse_flattening) = spheroid(trimmed)?;
        let params = AlbersEqualArea {
            semi_major,
            inverse_flattening,
            standard_parallel_1: required_parameter(trimmed, &["standard_parallel_1"])?,
            standard_parallel_2: required_parameter(trimmed, &["standard_parallel_2"])?,
            latitude_of_origin: required_parameter(
                trimmed,
                &["latitude_of_origin", "latitude_of_center"],
            )?,
            central_meridian: required_parameter(
                trimmed,
                &["central_meridian", "longitude_of_center"],
            )?,
            false_easting: parameter(trimmed, &["false_easting"]).unwrap_or(0.0),
            false_northing: parameter(trimmed, &["false_northing"]).unwrap_or(0.0),
            linear_unit: linear_unit(trimmed).unwrap_or(1.0),
        };
        Ok(SourceCrs::Albers(params))
    }

    /// Converts a source coordinate pair to `[lon, lat]` in degrees.
    pub fn to_lon_lat(&self, x: f64, y: f64) -> Result<[f64; 2], ParserError> {
        match self {
            SourceCrs::Geographic => Ok([x, y]),
            SourceCrs::Albers(albers) => albers.inverse(x, y),
        }
    }
}

/// Parameters of an ellipsoidal Albers conic equal-area projection.
#[derive(Debug, Clone, PartialEq)]
pub struct AlbersEqualArea {
    pub semi_major: f64,
    pub inverse_flattening: f64,
    pub standard_parallel_1: f64,
    pub standard_parallel_2: f64,
    pub latitude_of_origin: f64,
    pub central_meridian: f64,
    pub false_easting: f64,
    pub false_northing: f64,
    /// Metres per projected unit.
    pub linear_unit: f64,
}

struct AlbersConstants {
    e2: f64,
    e: f64,
    n: f64,
    c: f64,
    rho0: f64,
}

impl AlbersEqualArea {
    /// USGS version of the CONUS Albers projection on GRS 1980.
    pub fn conus_usgs() -> Self {
        Self {
            semi_major: 6_378_137.0,
            inverse_flattening: 298.257_222_101,
            standard_parallel_1: 29.5,
            standard_parallel_2: 45.5,
            latitude_of_origin: 23.0,
            central_meridian: -96.0,
            false_easting: 0.0,
            false_northing: 0.0,
            linear_unit: 1.0,
        }
    }

    fn constants(&self) -> AlbersConstants {
        let f = 1.0 / self.inverse_flattening;
        let e2 = 2.0 * f - f * f;
        let e = e2.sqrt();
        let phi1 = self.standard_parallel_1.to_radians();
        let phi2 = self.standard_parallel_2.to_radians();
        let phi0 = self.latitude_of_origin.to_radians();

        let m1 = m(phi1, e2);
        let m2 = m(phi2, e2);
        let q1 = q(phi1, e, e2);
        let q2 = q(phi2, e, e2);
        let q0 = q(phi0, e, e2);

        let n = if (phi1 - phi2).abs() < 1e-10 {
            phi1.sin()
        } else {
            (m1 * m1 - m2 * m2) / (q2 - q1)
        };
        let c = m1 * m1 + n * q1;
        let rho0 = self.semi_major * (c - n * q0).sqrt() / n;
        AlbersConstants { e2, e, n, c, rho0 }
    }

    /// Projects lon/lat degrees to projected coordinates in the source unit.
    pub fn forward(&self, lon: f64, lat: f64) -> [f64; 2] {
        let k = self.constants();
        let phi = lat.to_radians();
        let rho = self.semi_major * (k.c - k.n * q(phi, k.e, k.e2)).sqrt() / k.n;
        let theta = k.n * (lon - self.central_meridian).to_radians();
        let x = rho * theta.sin() + self.false_easting * self.linear_unit;
        let y = k.rho0 - rho * theta.cos() + self.false_northing * self.linear_unit;
        [x / self.linear_unit, y / self.linear_unit]
    }

    /// Recovers lon/lat degrees from projected coordinates in the source unit.
    pub fn inverse(&self, x: f64, y: f64) -> Result<[f64; 2], ParserError> {
        let k = self.constants();
        let x = (x - self.false_easting) * self.linear_unit;
        let y = (y - self.false_northing) * self.linear_unit;
        let sign = k.n.signum();

        let dy = k.rho0 - y;
        let rho = sign * (x * x + dy * dy).sqrt();
        let theta = (sign * x).atan2(sign * dy);
        let q_target = (k.c - rho * rho * k.n * k.n / (self.semi_major * self.semi_major)) / k.n;

        let mut phi = (q_target / 2.0).clamp(-1.0, 1.0).asin();
        for _ in 0..MAX_ITERATIONS {
            let sin_phi = phi.sin();
            let cos_phi = phi.cos();
            let one_minus = 1.0 - k.e2 * sin_phi * sin_phi;
            let delta = one_minus * one_minus / (2.0 * cos_phi)
                * (q_target / (1.0 - k.e2) - sin_phi / one_minus
                    + (1.0 / (2.0 * k.e)) * ((1.0 - k.e * sin_phi) / (1.0 + k.e * sin_phi)).ln());
            phi += delta;
            if delta.abs() < CONVERGENCE {
                let lon = self.central_meridian + (theta / k.n).to_degrees();
                return Ok([lon, phi.to_degrees()]);
            }
        }

        Err(ParserError::Projection {
            message: format!("latitude did not converge for point ({x}, {y})"),
        })
    }
}

fn m(phi: f64, e2: f64) -> f64 {
    phi.cos() / (1.0 - e2 * phi.sin().powi(2)).sqrt()
}

fn q(phi: f64, e: f64, e2: f64) -> f64 {
    let s = phi.sin();
    (1.0 - e2) * (s / (1.0 - e2 * s * s) - (1.0 / (2.0 * e)) * ((1.0 - e * s) / (1.0 + e * s)).ln())
}

fn quoted_after<'a>(wkt: &'a str, key: &str) -> Option<&'a str> {
    let start = wkt.find(key)? + key.len();
    let rest = wkt[start..].strip_prefix('"')?;
    let end = rest.find('"')?;
    Some(&rest[..end])
}

/// Finds `PARAMETER["<name>",<value>]` for any of the given names, ignoring case.
fn parameter(wkt: &str, names: &[&str]) -> Option<f64> {
    let mut rest = wkt;
    while let Some(pos) = rest.find("PARAMETER[") {
        rest = &rest[pos + "PARAMETER[".len()..];
        let Some(name) = rest.strip_prefix('"').and_then(|s| s.split('"').next()) else {
            continue;
        };
        if names.iter().any(|candidate| name.eq_ignore_ascii_case(candidate)) {
            let value = rest
                .split_once(',')
                .map(|(_, tail)| tail)
                .and_then(|tail| tail.split(']').next())?;
            return value.trim().parse().ok();
        }
    }
    None
}

fn required_parameter(wkt: &str, names: &[&str]) -> Result<f64, ParserError> {
    parameter(wkt, names).ok_or_else(|| ParserError::Projection {
        message: format!("missing parameter {}", names[0]),
    })
}

fn spheroid(wkt: &str) -> Result<(f64, f64), ParserError> {
    let start = wkt.find("SPHEROID[").ok_or_else(|| ParserError::Projection {
        message: "missing SPHEROID".to_string(),
    })?;
    let body = &wkt[start + "SPHEROID[".len()..];
    let body = body.split(']').next().unwrap_or_default();
    let numbers: Vec<f64> = body
        .split(',')
        .skip(1)
        .filter_map(|token| token.trim().parse().ok())
        .collect();
    match numbers.as_slice() {
        [a, inv_f, ..] if *a > 0.0 && *inv_f > 0.0 => Ok((*a, *inv_f)),
        _ => Err(ParserError::Projection {
            message: format!("malformed SPHEROID '{body}'"),
        }),
    }
}

/// The projected linear unit is the last top-level `UNIT[...]` of a PROJCS.
fn linear_unit(wkt: &str) -> Option<f64> {
    let start = wkt.rfind("UNIT[")?;
    let body = &wkt[start + "UNIT[".len()..];
    body.split(']')
        .next()?
        .split(',')
        .nth(1)?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONUS_PRJ: &str = r#"PROJCS["USA_Contiguous_Albers_Equal_Area_Conic_USGS_version",GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Albers"],PARAMETER["False_Easting",0.0],PARAMETER["False_Northing",0.0],PARAMETER["Central_Meridian",-96.0],PARAMETER["Standard_Parallel_1",29.5],PARAMETER["Standard_Parallel_2",45.5],PARAMETER["Latitude_Of_Origin",23.0],UNIT["Meter",1.0]]"#;

    #[test]
    fn parses_conus_albers_prj() {
        let crs = SourceCrs::from_wkt(CONUS_PRJ).expect("prj should parse");
        assert_eq!(crs, SourceCrs::Albers(AlbersEqualArea::conus_usgs()));
    }

    #[test]
    fn origin_maps_to_projection_center() {
        let albers = AlbersEqualArea::conus_usgs();
        let [x, y] = albers.forward(-96.0, 23.0);
        assert!(x.abs() < 1e-6 && y.abs() < 1e-6, "got ({x}, {y})");

        let [lon, lat] = albers.inverse(0.0, 0.0).unwrap();
        assert!((lon + 96.0).abs() < 1e-9);
        assert!((lat - 23.0).abs() < 1e-9);
    }

    #[test]
    fn inverse_recovers_forward_projection() {
        let albers = AlbersEqualArea::conus_usgs();
        for (lon, lat) in [(-68.58264, 47.23739), (-124.2, 41.9), (-80.1, 25.8)] {
            let [x, y] = albers.forward(lon, lat);
            let [lon2, lat2] = albers.inverse(x, y).unwrap();
            assert!((lon - lon2).abs() < 1e-9, "lon {lon} vs {lon2}");
            assert!((lat - lat2).abs() < 1e-9, "lat {lat} vs {lat2}");
        }
    }

    #[test]
    fn forward_matches_reference_coordinates() {
        // Reference values computed independently with the same GRS 1980 parameters.
        let albers = AlbersEqualArea::conus_usgs();
        let [x, y] = albers.forward(-69.0, 47.0);
        assert!((x - 2_035_359.486).abs() < 1e-2, "x = {x}");
        assert!((y - 2_958_785.693).abs() < 1e-2, "y = {y}");
    }

    #[test]
    fn geographic_prj_passes_through() {
        let crs = SourceCrs::from_wkt(
            r#"GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#,
        )
        .unwrap();
        assert_eq!(crs.to_lon_lat(-70.5, 44.25).unwrap(), [-70.5, 44.25]);
    }

    #[test]
    fn unsupported_projection_is_rejected() {
        let wkt = CONUS_PRJ.replace("PROJECTION[\"Albers\"]", "PROJECTION[\"Lambert_Conformal_Conic\"]");
        match SourceCrs::from_wkt(&wkt) {
            Err(ParserError::Projection { message }) => {
                assert!(message.contains("Lambert_Conformal_Conic"))
            }
            other => panic!("expected Projection error, got {other:?}"),
        }
    }
}
