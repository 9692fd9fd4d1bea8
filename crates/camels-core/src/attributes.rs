use std::collections::HashMap;
use std::path::{Path, PathBuf};

use camels_parser::{AttributeGroup, AttributeTable};
use polars::prelude::*;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::normalize::STATION_ID_COLUMN;

/// Every attribute group merged into one frame, one row per station.
///
/// Rows are sorted by `station_id`; columns follow group name order and,
/// within a group, file order.
#[derive(Debug, Clone)]
pub struct StationAttributes {
    pub df: DataFrame,
    pub groups: Vec<AttributeGroup>,
    pub station_ids: Vec<String>,
}

impl StationAttributes {
    pub fn station_count(&self) -> usize {
        self.station_ids.len()
    }
}

/// A normalized attribute table with the file it was read from.
#[derive(Debug, Clone)]
pub struct SourcedTable {
    pub path: PathBuf,
    pub table: AttributeTable,
}

/// Merges normalized attribute tables on `station_id`.
///
/// The first group (by name) fixes the station universe. Every other group
/// must list exactly the same stations.
pub fn merge_attribute_tables(mut tables: Vec<SourcedTable>) -> Result<StationAttributes> {
    tables.sort_by_key(|sourced| sourced.table.group);
    if let Some(pair) = tables
        .windows(2)
        .find(|pair| pair[0].table.group == pair[1].table.group)
    {
        return Err(PipelineError::format(
            &pair[1].path,
            None,
            format!(
                "attribute group {} also read from {}",
                pair[1].table.group,
                pair[0].path.display()
            ),
        ));
    }

    let Some(first) = tables.first() else {
        return Err(PipelineError::input_fetch(
            "attribute tables",
            "no attribute tables were loaded",
        ));
    };

    let mut station_ids = read_station_ids(&first.path, &first.table.df)?;
    station_ids.sort();
    let universe_group = first.table.group;

    let mut columns: Vec<Column> = Vec::new();
    columns.push(Series::new(STATION_ID_COLUMN.into(), station_ids.clone()).into());
    let mut groups = Vec::with_capacity(tables.len());

    for sourced in &tables {
        let group = sourced.table.group;
        let ids = station_ids_of(sourced)?;
        let positions = row_positions(&sourced.path, &ids)?;

        if let Some(extra) = ids.iter().find(|id| station_ids.binary_search(*id).is_err()) {
            return Err(PipelineError::join_mismatch(
                extra.as_str(),
                format!("camels_{group}"),
                format!("camels_{universe_group}"),
            ));
        }

        let mut order: Vec<IdxSize> = Vec::with_capacity(station_ids.len());
        for station_id in &station_ids {
            let position = positions.get(station_id.as_str()).ok_or_else(|| {
                PipelineError::join_mismatch(
                    station_id.as_str(),
                    format!("camels_{universe_group}"),
                    format!("camels_{group}"),
                )
            })?;
            order.push(*position as IdxSize);
        }

        let aligned = sourced
            .table
            .df
            .take(&IdxCa::from_vec("order".into(), order))
            .map_err(|err| PipelineError::format(&sourced.path, None, err))?;
        columns.extend(
            aligned
                .get_columns()
                .iter()
                .filter(|column| column.name().as_str() != STATION_ID_COLUMN)
                .cloned(),
        );
        groups.push(group);
        debug!(
            group = %group,
            fields = aligned.width() - 1,
            stations = aligned.height(),
            "merged attribute group"
        );
    }

    let df = DataFrame::new(columns).map_err(|err| {
        PipelineError::format(&first.path, None, format!("failed to merge attributes: {err}"))
    })?;

    Ok(StationAttributes {
        df,
        groups,
        station_ids,
    })
}

fn station_ids_of(sourced: &SourcedTable) -> Result<Vec<String>> {
    read_station_ids(&sourced.path, &sourced.table.df)
}

fn read_station_ids(path: &Path, df: &DataFrame) -> Result<Vec<String>> {
    let column = df
        .column(STATION_ID_COLUMN)
        .and_then(|column| column.str())
        .map_err(|err| PipelineError::format(path, None, err))?;
    column
        .into_iter()
        .map(|value| {
            value
                .map(str::to_string)
                .ok_or_else(|| PipelineError::format(path, None, "null station_id"))
        })
        .collect()
}

fn row_positions<'a>(path: &Path, ids: &'a [String]) -> Result<HashMap<&'a str, usize>> {
    let mut positions = HashMap::with_capacity(ids.len());
    for (idx, id) in ids.iter().enumerate() {
        if positions.insert(id.as_str(), idx).is_some() {
            return Err(PipelineError::format(
                path,
                Some(id.as_str()),
                "duplicate station in attribute table",
            ));
        }
    }
    Ok(positions)
}
