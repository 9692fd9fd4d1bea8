use std::collections::HashSet;

use crate::errors::ParserError;
use crate::formats::common::{parse_date, parse_optional_f64, validate_gauge_id};
use crate::model::{QualityFlag, StreamflowSeries};

const NAME: &str = "USGS_STREAMFLOW";

/// Discharge value the USGS files use for days without a measurement.
pub const MISSING_DISCHARGE: f64 = -999.0;

/// Parses a `<gauge_id>_streamflow_qc.txt` file.
///
/// Rows are whitespace separated: `gauge_id year month day discharge [flag]`.
/// A discharge of `-999` or a `M` flag marks the day as missing.
pub fn parse_streamflow(content: &str) -> Result<StreamflowSeries, ParserError> {
    let mut gauge_id: Option<String> = None;
    let mut seen = HashSet::new();
    let mut series = StreamflowSeries {
        gauge_id: String::new(),
        dates: Vec::new(),
        discharge: Vec::new(),
        flags: Vec::new(),
    };

    for (row_idx, line) in content.lines().enumerate() {
        let line_index = row_idx + 1;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        if tokens.len() != 5 && tokens.len() != 6 {
            return Err(ParserError::DataRow {
                parser: NAME,
                line_index,
                message: format!("expected 5 or 6 fields but found {}", tokens.len()),
            });
        }

        let row_id = validate_gauge_id(NAME, tokens[0], line_index)?;
        let expected = gauge_id.get_or_insert_with(|| row_id.clone());
        if *expected != row_id {
            return Err(ParserError::DataRow {
                parser: NAME,
                line_index,
                message: format!("gauge_id '{row_id}' does not match file gauge '{expected}'"),
            });
        }

        let date = parse_date(NAME, tokens[1], tokens[2], tokens[3], line_index)?;
        if !seen.insert(date) {
            return Err(ParserError::DataRow {
                parser: NAME,
                line_index,
                message: format!("duplicate observation for {date}"),
            });
        }

        let flag = tokens
            .get(5)
            .map(|raw| QualityFlag::parse(raw))
            .unwrap_or(QualityFlag::Approved);
        let value = parse_optional_f64(NAME, tokens[4], line_index, "discharge")?
            .filter(|value| (value - MISSING_DISCHARGE).abs() > f64::EPSILON)
            .filter(|_| flag != QualityFlag::Missing);

        series.dates.push(date);
        series.discharge.push(value);
        series.flags.push(flag);
    }

    match gauge_id {
        Some(id) => {
            series.gauge_id = id;
            Ok(series)
        }
        None => Err(ParserError::EmptyData { parser: NAME }),
    }
}
