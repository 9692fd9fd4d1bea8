//! Canonical rendering of station identifiers, region codes, and gauge names.
//!
//! The three CAMELS sources disagree on how an identifier is written (the
//! shapefile stores `hru_id` as a number, so leading zeros are lost). Every
//! identifier passes through [`pad_station_id`] before any join.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use camels_parser::schema::{GAUGE_ID_COLUMN, GAUGE_NAME_COLUMN, HUC_COLUMN};
use camels_parser::{AttributeTable, BasinCollection, BasinShape};
use polars::prelude::*;
use thiserror::Error;

use crate::error::{PipelineError, Result};

pub const STATION_ID_WIDTH: usize = 8;
pub const REGION_CODE_WIDTH: usize = 2;

pub const STATION_ID_COLUMN: &str = "station_id";
pub const NAME_COLUMN: &str = "name";
pub const REGION_CODE_COLUMN: &str = "region_code";

const SEPARATORS: [char; 4] = ['.', ',', ';', ':'];
const BRACKETS: [char; 6] = ['(', ')', '[', ']', '{', '}'];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("station name is empty")]
    EmptyName,

    #[error("station name '{name}' has no trailing state token")]
    MissingState { name: String },

    #[error("'{value}' is not a numeric code")]
    NonNumeric { value: String },

    #[error("'{value}' is longer than {width} digits")]
    TooLong { value: String, width: usize },

    #[error("{column} is missing")]
    MissingValue { column: &'static str },
}

/// Renders a raw gauge name as `"{Title Cased Head}, {STATE}"`.
///
/// Whitespace runs and punctuation runs collapse to a single character
/// (apostrophes are left alone, brackets only lose exact repeats), the state
/// token after the last comma (or last space) is
/// split off, and the head is title cased. Abbreviations are kept.
pub fn normalize_station_name(raw: &str) -> std::result::Result<String, NormalizeError> {
    let collapsed = collapse_whitespace(raw);
    if collapsed.is_empty() {
        return Err(NormalizeError::EmptyName);
    }
    let compact = collapse_separator_runs(&collapsed);

    let missing_state = || NormalizeError::MissingState {
        name: collapsed.clone(),
    };
    let (head, state) = split_state(&compact).ok_or_else(missing_state)?;

    let head = clean_head(head);
    let state: String = state
        .trim_matches(|c: char| SEPARATORS.contains(&c) || c.is_whitespace())
        .chars()
        .filter(|c| *c != '.')
        .collect();
    if head.is_empty() || state.is_empty() {
        return Err(missing_state());
    }

    let state = if state.chars().count() == 2 {
        state.to_uppercase()
    } else {
        title_case(&state)
    };
    Ok(format!("{}, {}", title_case(&head), state))
}

pub fn pad_station_id(raw: &str) -> std::result::Result<String, NormalizeError> {
    pad_numeric(raw, STATION_ID_WIDTH)
}

pub fn pad_region_code(raw: &str) -> std::result::Result<String, NormalizeError> {
    pad_numeric(raw, REGION_CODE_WIDTH)
}

fn pad_numeric(raw: &str, width: usize) -> std::result::Result<String, NormalizeError> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(NormalizeError::NonNumeric {
            value: trimmed.to_string(),
        });
    }
    if digits.len() > width {
        return Err(NormalizeError::TooLong {
            value: digits.to_string(),
            width,
        });
    }
    Ok(format!("{digits:0>width$}"))
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collapse_separator_runs(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut run = String::new();
    for c in input.chars() {
        if is_collapsible(c) {
            run.push(c);
            continue;
        }
        flush_run(&mut run, &mut out);
        if BRACKETS.contains(&c) && out.ends_with(c) {
            continue;
        }
        out.push(c);
    }
    flush_run(&mut run, &mut out);
    out
}

/// ASCII punctuation that collapses when repeated.
fn is_collapsible(c: char) -> bool {
    c.is_ascii_punctuation() && c != '\'' && !BRACKETS.contains(&c)
}

fn flush_run(run: &mut String, out: &mut String) {
    if run.contains(',') {
        out.push(',');
    } else if let Some(first) = run.chars().next() {
        out.push(first);
    }
    run.clear();
}

fn split_state(compact: &str) -> Option<(&str, &str)> {
    let idx = compact.rfind(',').or_else(|| compact.rfind(' '))?;
    Some((&compact[..idx], compact[idx + 1..].trim()))
}

fn clean_head(head: &str) -> String {
    let spaced = head.replace(',', " ");
    collapse_whitespace(&spaced)
        .trim_end_matches(|c: char| SEPARATORS.contains(&c) || c.is_whitespace())
        .to_string()
}

fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut word_start = true;
    for c in input.chars() {
        if c.is_alphabetic() {
            if word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            word_start = false;
        } else {
            word_start = c.is_whitespace() || matches!(c, '-' | '(' | '/' | '.');
            out.push(c);
        }
    }
    out
}

/// Pads identifiers and region codes and normalizes gauge names in a parsed
/// attribute table, renaming `gauge_id`, `gauge_name`, and `huc_02` to their
/// output names.
pub fn normalize_attribute_table(table: AttributeTable, source: &Path) -> Result<AttributeTable> {
    let AttributeTable { group, mut df } = table;
    let polars_err = |err: PolarsError| PipelineError::format(source, None, err);

    let raw_ids = string_values(&df, GAUGE_ID_COLUMN).map_err(polars_err)?;
    let mut station_ids = Vec::with_capacity(raw_ids.len());
    for raw in &raw_ids {
        let raw = raw.as_deref().ok_or_else(|| {
            PipelineError::format(
                source,
                None,
                NormalizeError::MissingValue {
                    column: GAUGE_ID_COLUMN,
                },
            )
        })?;
        let padded =
            pad_station_id(raw).map_err(|err| PipelineError::format(source, Some(raw), err))?;
        station_ids.push(padded);
    }

    if df.get_column_names().iter().any(|name| name.as_str() == GAUGE_NAME_COLUMN) {
        let names = string_values(&df, GAUGE_NAME_COLUMN).map_err(polars_err)?;
        let normalized = normalize_column(
            &names,
            &station_ids,
            source,
            GAUGE_NAME_COLUMN,
            normalize_station_name,
        )?;
        df.with_column(Series::new(GAUGE_NAME_COLUMN.into(), normalized))
            .map_err(polars_err)?;
        df.rename(GAUGE_NAME_COLUMN, NAME_COLUMN.into())
            .map_err(polars_err)?;
    }

    if df.get_column_names().iter().any(|name| name.as_str() == HUC_COLUMN) {
        let codes = string_values(&df, HUC_COLUMN).map_err(polars_err)?;
        let padded = normalize_column(&codes, &station_ids, source, HUC_COLUMN, pad_region_code)?;
        df.with_column(Series::new(HUC_COLUMN.into(), padded))
            .map_err(polars_err)?;
        df.rename(HUC_COLUMN, REGION_CODE_COLUMN.into())
            .map_err(polars_err)?;
    }

    df.with_column(Series::new(GAUGE_ID_COLUMN.into(), station_ids))
        .map_err(polars_err)?;
    df.rename(GAUGE_ID_COLUMN, STATION_ID_COLUMN.into())
        .map_err(polars_err)?;

    Ok(AttributeTable { group, df })
}

fn string_values(df: &DataFrame, column: &str) -> PolarsResult<Vec<Option<String>>> {
    Ok(df
        .column(column)?
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

fn normalize_column<F>(
    values: &[Option<String>],
    station_ids: &[String],
    source: &Path,
    column: &'static str,
    normalize: F,
) -> Result<Vec<String>>
where
    F: Fn(&str) -> std::result::Result<String, NormalizeError>,
{
    values
        .iter()
        .zip(station_ids)
        .map(|(value, station_id)| {
            value
                .as_deref()
                .ok_or(NormalizeError::MissingValue { column })
                .and_then(&normalize)
                .map_err(|err| PipelineError::format(source, Some(station_id.as_str()), err))
        })
        .collect()
}

/// Basin outlines with identifiers in canonical station form.
#[derive(Debug, Clone)]
pub struct NormalizedBasins {
    pub path: PathBuf,
    pub shapes: Vec<BasinShape>,
}

/// Pads every `hru_id` and rejects identifiers that collide once padded.
pub fn normalize_basins(collection: BasinCollection, source: &Path) -> Result<NormalizedBasins> {
    let mut seen = HashSet::with_capacity(collection.shapes.len());
    let mut shapes = Vec::with_capacity(collection.shapes.len());
    for shape in collection.shapes {
        let station_id = pad_station_id(&shape.hru_id)
            .map_err(|err| PipelineError::format(source, Some(shape.hru_id.as_str()), err))?;
        if !seen.insert(station_id.clone()) {
            return Err(PipelineError::format(
                source,
                Some(station_id.as_str()),
                "duplicate basin identifier",
            ));
        }
        shapes.push(BasinShape {
            hru_id: station_id,
            geometry: shape.geometry,
        });
    }
    Ok(NormalizedBasins {
        path: source.to_path_buf(),
        shapes,
    })
}
