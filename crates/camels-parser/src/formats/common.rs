use chrono::NaiveDate;
use polars::prelude::*;

use crate::errors::ParserError;
use crate::formats::schema::{AttributeField, FieldKind};

/// Tokens that mean "no value" in the CAMELS text tables.
const MISSING_TOKENS: &[&str] = &["", "na", "nan"];

/// Column accumulator for a schema-declared attribute field.
#[derive(Debug, Clone)]
pub(crate) enum FieldValues {
    Float(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl FieldValues {
    pub fn for_field(field: &AttributeField, capacity: usize) -> Self {
        match field.kind {
            FieldKind::Float => FieldValues::Float(Vec::with_capacity(capacity)),
            FieldKind::Text => FieldValues::Text(Vec::with_capacity(capacity)),
        }
    }

    pub fn push(
        &mut self,
        parser: &'static str,
        value: &str,
        line_index: usize,
        column: &str,
    ) -> Result<(), ParserError> {
        match self {
            FieldValues::Float(values) => {
                values.push(parse_optional_f64(parser, value, line_index, column)?)
            }
            FieldValues::Text(values) => values.push(parse_optional_text(value)),
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        match self {
            FieldValues::Float(values) => values.len(),
            FieldValues::Text(values) => values.len(),
        }
    }

    pub fn into_column(self, name: &str) -> Column {
        match self {
            FieldValues::Float(values) => Series::new(name.into(), values).into(),
            FieldValues::Text(values) => {
                let utf8: Vec<Option<&str>> = values.iter().map(|v| v.as_deref()).collect();
                Series::new(name.into(), utf8).into()
            }
        }
    }
}

fn is_missing(trimmed: &str) -> bool {
    MISSING_TOKENS
        .iter()
        .any(|token| trimmed.eq_ignore_ascii_case(token))
}

pub(crate) fn parse_optional_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if is_missing(trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub(crate) fn parse_optional_f64(
    parser: &'static str,
    value: &str,
    line_index: usize,
    column: &str,
) -> Result<Option<f64>, ParserError> {
    let trimmed = value.trim();
    if is_missing(trimmed) {
        return Ok(None);
    }

    trimmed
        .parse::<f64>()
        .map(Some)
        .map_err(|err| ParserError::DataRow {
            parser,
            line_index,
            message: format!("failed to parse column '{column}' as float: {err}"),
        })
}

pub(crate) fn parse_required_i32(
    parser: &'static str,
    value: &str,
    line_index: usize,
    column: &str,
) -> Result<i32, ParserError> {
    value
        .trim()
        .parse::<i32>()
        .map_err(|err| ParserError::DataRow {
            parser,
            line_index,
            message: format!("failed to parse column '{column}' as integer: {err}"),
        })
}

pub(crate) fn parse_date(
    parser: &'static str,
    year: &str,
    month: &str,
    day: &str,
    line_index: usize,
) -> Result<NaiveDate, ParserError> {
    let y = parse_required_i32(parser, year, line_index, "year")?;
    let m = parse_required_i32(parser, month, line_index, "month")?;
    let d = parse_required_i32(parser, day, line_index, "day")?;
    u32::try_from(m)
        .ok()
        .zip(u32::try_from(d).ok())
        .and_then(|(m, d)| NaiveDate::from_ymd_opt(y, m, d))
        .ok_or_else(|| ParserError::DataRow {
            parser,
            line_index,
            message: format!("invalid calendar date {year}-{month}-{day}"),
        })
}

/// Checks that a gauge identifier is a non-empty run of ASCII digits.
pub(crate) fn validate_gauge_id(
    parser: &'static str,
    value: &str,
    line_index: usize,
) -> Result<String, ParserError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(ParserError::DataRow {
            parser,
            line_index,
            message: format!("gauge_id '{trimmed}' must contain only digits"),
        });
    }
    Ok(trimmed.to_string())
}
