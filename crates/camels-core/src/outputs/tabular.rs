use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::io::parquet::write::{ParquetCompression, ParquetWriter, StatisticsOptions};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{PipelineError, Result};

/// On-disk encoding of the per-station table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabularFormat {
    /// Feather v2, i.e. an Arrow IPC file.
    #[default]
    Feather,
    Parquet,
}

/// A finished table in a temp file beside its final location.
///
/// Dropping it without [`StagedTable::publish`] deletes the temp file.
#[derive(Debug)]
pub struct StagedTable {
    file: NamedTempFile,
    target: PathBuf,
}

impl StagedTable {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Renames the temp file over the target.
    pub fn publish(self) -> Result<()> {
        let StagedTable { file, target } = self;
        file.as_file()
            .sync_all()
            .map_err(|err| PipelineError::write(&target, err))?;
        file.persist(&target)
            .map_err(|err| PipelineError::write(&target, err.error))?;
        Ok(())
    }
}

/// Writes `df` to `path`, replacing any previous file only once the new one
/// is complete.
pub fn write_tabular(df: &DataFrame, path: &Path, format: TabularFormat) -> Result<()> {
    stage_tabular(df, path, format)?.publish()
}

/// Writes `df` into a temp file in the directory of `path`.
pub fn stage_tabular(df: &DataFrame, path: &Path, format: TabularFormat) -> Result<StagedTable> {
    let write_err = |err: PolarsError| PipelineError::write(path, err);
    let parent = staging_parent(path);
    fs::create_dir_all(parent).map_err(|err| PipelineError::write(path, err))?;

    let mut staged = tempfile::Builder::new()
        .prefix(".camels-")
        .suffix(".partial")
        .tempfile_in(parent)
        .map_err(|err| PipelineError::write(path, err))?;

    let mut frame = df.clone();
    match format {
        TabularFormat::Feather => {
            IpcWriter::new(&mut staged)
                .with_compat_level(CompatLevel::oldest())
                .finish(&mut frame)
                .map_err(write_err)?;
        }
        TabularFormat::Parquet => {
            ParquetWriter::new(&mut staged)
                .with_compression(ParquetCompression::Zstd(None))
                .with_statistics(StatisticsOptions::full())
                .finish(&mut frame)
                .map_err(write_err)?;
        }
    }

    Ok(StagedTable {
        file: staged,
        target: path.to_path_buf(),
    })
}

pub fn read_tabular(path: &Path, format: TabularFormat) -> Result<DataFrame> {
    let file = File::open(path).map_err(|err| PipelineError::write(path, err))?;
    let df = match format {
        TabularFormat::Feather => IpcReader::new(file).finish(),
        TabularFormat::Parquet => ParquetReader::new(file).finish(),
    };
    df.map_err(|err| PipelineError::write(path, err))
}

fn staging_parent(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
