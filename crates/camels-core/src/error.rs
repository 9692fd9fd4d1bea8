use std::path::{Path, PathBuf};

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to fetch input {resource}: {source}")]
    InputFetch {
        resource: String,
        #[source]
        source: BoxError,
    },

    #[error("invalid data in {}{}: {source}", .path.display(), station_suffix(.station_id))]
    Format {
        path: PathBuf,
        station_id: Option<String>,
        #[source]
        source: BoxError,
    },

    #[error("station {station_id} is present in {present_in} but missing from {missing_from}")]
    JoinMismatch {
        station_id: String,
        present_in: String,
        missing_from: String,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("invalid configuration{}: {message}", config_suffix(.path))]
    Config {
        path: Option<PathBuf>,
        message: String,
    },
}

impl PipelineError {
    pub fn input_fetch(resource: impl Into<String>, source: impl Into<BoxError>) -> Self {
        PipelineError::InputFetch {
            resource: resource.into(),
            source: source.into(),
        }
    }

    pub fn format(path: &Path, station_id: Option<&str>, source: impl Into<BoxError>) -> Self {
        PipelineError::Format {
            path: path.to_path_buf(),
            station_id: station_id.map(str::to_string),
            source: source.into(),
        }
    }

    pub fn write(path: &Path, source: impl Into<BoxError>) -> Self {
        PipelineError::Write {
            path: path.to_path_buf(),
            source: source.into(),
        }
    }

    pub fn join_mismatch(
        station_id: impl Into<String>,
        present_in: impl Into<String>,
        missing_from: impl Into<String>,
    ) -> Self {
        PipelineError::JoinMismatch {
            station_id: station_id.into(),
            present_in: present_in.into(),
            missing_from: missing_from.into(),
        }
    }
}

fn station_suffix(station_id: &Option<String>) -> String {
    station_id
        .as_deref()
        .map(|id| format!(" (station {id})"))
        .unwrap_or_default()
}

fn config_suffix(path: &Option<PathBuf>) -> String {
    path.as_deref()
        .map(|path| format!(" in {}", path.display()))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, PipelineError>;
