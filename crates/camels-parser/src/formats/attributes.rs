use std::path::Path;

use csv::StringRecord;
use polars::prelude::*;

use crate::errors::ParserError;
use crate::formats::common::{validate_gauge_id, FieldValues};
use crate::formats::schema::{lookup_field, AttributeField, GAUGE_ID_COLUMN};
use crate::model::{AttributeGroup, AttributeTable};

const NAME: &str = "CAMELS_ATTRIBUTES";

/// Resolves the attribute group a `camels_<group>.txt` path belongs to.
pub fn attribute_group_for(path: &Path) -> Result<AttributeGroup, ParserError> {
    AttributeGroup::from_path(path).map_err(|reason| ParserError::FormatMismatch {
        parser: NAME,
        reason,
    })
}

fn reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.delimiter(b';').has_headers(false).flexible(true);
    builder
}

/// Parses one `camels_<group>.txt` table against the attribute schema.
///
/// Every header column other than `gauge_id` must be a schema field that
/// belongs to `group`; rows must carry exactly one value per header column.
pub fn parse_attribute_table(
    group: AttributeGroup,
    content: &str,
) -> Result<AttributeTable, ParserError> {
    parse_with_builder(reader_builder(), group, content)
}

fn parse_with_builder(
    builder: csv::ReaderBuilder,
    group: AttributeGroup,
    content: &str,
) -> Result<AttributeTable, ParserError> {
    let mut reader = builder.from_reader(content.as_bytes());
    let mut records = reader.records();

    let header = records
        .next()
        .ok_or(ParserError::FormatMismatch {
            parser: NAME,
            reason: "file missing column header row".to_string(),
        })?
        .map_err(|err| ParserError::Csv {
            parser: NAME,
            source: err,
        })?;
    let fields = classify_header(group, &header)?;

    let mut gauge_ids: Vec<String> = Vec::new();
    let mut columns: Vec<FieldValues> = fields
        .iter()
        .map(|field| FieldValues::for_field(field, 0))
        .collect();

    for (row_idx, record) in records.enumerate() {
        let record = record.map_err(|err| ParserError::Csv {
            parser: NAME,
            source: err,
        })?;
        let line_index = row_idx + 2;

        if record.len() != header.len() {
            return Err(ParserError::DataRow {
                parser: NAME,
                line_index,
                message: format!(
                    "expected {} columns but found {}",
                    header.len(),
                    record.len()
                ),
            });
        }

        gauge_ids.push(validate_gauge_id(
            NAME,
            record.get(0).unwrap_or_default(),
            line_index,
        )?);

        for (idx, (field, values)) in fields.iter().zip(columns.iter_mut()).enumerate() {
            let value = record.get(idx + 1).unwrap_or_default();
            values.push(NAME, value, line_index, field.name)?;
        }
    }

    if gauge_ids.is_empty() {
        return Err(ParserError::EmptyData { parser: NAME });
    }

    let row_count = gauge_ids.len();
    let mut cols: Vec<Column> = Vec::with_capacity(fields.len() + 1);
    cols.push(Series::new(GAUGE_ID_COLUMN.into(), gauge_ids).into());
    for (field, values) in fields.iter().zip(columns) {
        if values.len() != row_count {
            return Err(ParserError::Validation {
                parser: NAME,
                message: format!(
                    "column {} had {} rows, expected {row_count}",
                    field.name,
                    values.len()
                ),
            });
        }
        cols.push(values.into_column(field.name));
    }

    let df = DataFrame::new(cols).map_err(|err| ParserError::Validation {
        parser: NAME,
        message: format!("failed to build {group} attribute dataframe: {err}"),
    })?;

    Ok(AttributeTable { group, df })
}

fn classify_header(
    group: AttributeGroup,
    header: &StringRecord,
) -> Result<Vec<&'static AttributeField>, ParserError> {
    let first = header.get(0).unwrap_or_default().trim();
    if first != GAUGE_ID_COLUMN {
        return Err(ParserError::InvalidHeader {
            parser: NAME,
            row_index: 1,
            message: format!("first column must be '{GAUGE_ID_COLUMN}', found '{first}'"),
        });
    }
    if header.len() < 2 {
        return Err(ParserError::InvalidHeader {
            parser: NAME,
            row_index: 1,
            message: "header declares no attribute columns".to_string(),
        });
    }

    let mut fields: Vec<&'static AttributeField> = Vec::with_capacity(header.len() - 1);
    for column in header.iter().skip(1).map(str::trim) {
        let field = lookup_field(column).ok_or_else(|| ParserError::InvalidHeader {
            parser: NAME,
            row_index: 1,
            message: format!("unknown attribute column '{column}'"),
        })?;
        if field.group != group {
            return Err(ParserError::InvalidHeader {
                parser: NAME,
                row_index: 1,
                message: format!(
                    "column '{column}' belongs to group {} but file is {group}",
                    field.group
                ),
            });
        }
        if fields.iter().any(|existing| existing.name == field.name) {
            return Err(ParserError::InvalidHeader {
                parser: NAME,
                row_index: 1,
                message: format!("column '{column}' appears more than once"),
            });
        }
        fields.push(field);
    }
    Ok(fields)
}

#[cfg(test)]
pub(crate) fn parse_with_custom_builder(
    builder: csv::ReaderBuilder,
    group: AttributeGroup,
    content: &str,
) -> Result<AttributeTable, ParserError> {
    parse_with_builder(builder, group, content)
}
