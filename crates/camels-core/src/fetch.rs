use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_LENGTH;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use zip::ZipArchive;

use crate::error::{PipelineError, Result};

/// Name and content hash of a source archive, recorded for provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveDigest {
    pub name: String,
    pub blake3: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchedArchive {
    pub name: String,
    pub path: PathBuf,
    pub bytes: u64,
    pub blake3: String,
    /// True when an existing local copy was used instead of downloading.
    pub reused: bool,
    pub extracted_entries: usize,
}

impl FetchedArchive {
    pub fn digest(&self) -> ArchiveDigest {
        ArchiveDigest {
            name: self.name.clone(),
            blake3: self.blake3.clone(),
        }
    }
}

pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// File name of a URL or path, used as the local archive name.
pub fn archive_name(source: &str) -> &str {
    source
        .trim_end_matches('/')
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(source)
}

/// Makes every source archive available in `data_dir`, hashes it, and
/// extracts it there.
///
/// Remote archives are downloaded unless a local copy of the advertised size
/// already exists. Local paths are used in place.
pub fn fetch_archives(sources: &[String], data_dir: &Path) -> Result<Vec<FetchedArchive>> {
    fs::create_dir_all(data_dir)
        .map_err(|err| PipelineError::input_fetch(data_dir.display().to_string(), err))?;

    let client = Client::builder()
        .timeout(None::<Duration>)
        .build()
        .map_err(|err| PipelineError::input_fetch("http client", err))?;

    let mut fetched = Vec::with_capacity(sources.len());
    for source in sources {
        let name = archive_name(source).to_string();
        let (path, reused) = if is_remote(source) {
            let destination = data_dir.join(&name);
            let reused = download_if_changed(&client, source, &destination, data_dir)?;
            (destination, reused)
        } else {
            let path = PathBuf::from(source);
            if !path.is_file() {
                return Err(PipelineError::input_fetch(
                    source.as_str(),
                    io::Error::new(io::ErrorKind::NotFound, "archive not found"),
                ));
            }
            (path, true)
        };

        let bytes = fs::metadata(&path)
            .map(|meta| meta.len())
            .map_err(|err| PipelineError::input_fetch(source.as_str(), err))?;
        let blake3 = hash_file(&path)?;
        let extracted_entries = extract_archive(&path, data_dir)?;
        info!(
            archive = %name,
            bytes,
            reused,
            extracted_entries,
            blake3 = %blake3,
            "archive ready"
        );

        fetched.push(FetchedArchive {
            name,
            path,
            bytes,
            blake3,
            reused,
            extracted_entries,
        });
    }
    Ok(fetched)
}

/// Returns `true` when the local file already matched the remote size.
fn download_if_changed(
    client: &Client,
    url: &str,
    destination: &Path,
    data_dir: &Path,
) -> Result<bool> {
    let fetch_err = |err: reqwest::Error| PipelineError::input_fetch(url, err);

    if let Ok(local) = fs::metadata(destination) {
        let head = client
            .head(url)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(fetch_err)?;
        let remote_len = head
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());
        if remote_len == Some(local.len()) {
            debug!(url, bytes = local.len(), "local archive matches remote size");
            return Ok(true);
        }
    }

    info!(url, destination = %destination.display(), "downloading archive");
    let mut response = client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .map_err(fetch_err)?;

    let mut staged: NamedTempFile = tempfile::Builder::new()
        .prefix(".camels-")
        .suffix(".download")
        .tempfile_in(data_dir)
        .map_err(|err| PipelineError::input_fetch(url, err))?;
    response.copy_to(&mut staged).map_err(fetch_err)?;
    staged
        .persist(destination)
        .map_err(|err| PipelineError::input_fetch(url, err.error))?;
    Ok(false)
}

pub fn hash_file(path: &Path) -> Result<String> {
    let fetch_err = |err: io::Error| PipelineError::input_fetch(path.display().to_string(), err);
    let mut file = File::open(path).map_err(fetch_err)?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher).map_err(fetch_err)?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Unpacks a zip archive into `destination`, returning the entry count.
pub fn extract_archive(archive: &Path, destination: &Path) -> Result<usize> {
    let resource = archive.display().to_string();
    let file = File::open(archive).map_err(|err| PipelineError::input_fetch(&*resource, err))?;
    let mut zip =
        ZipArchive::new(file).map_err(|err| PipelineError::input_fetch(&*resource, err))?;
    let entries = zip.len();
    zip.extract(destination)
        .map_err(|err| PipelineError::input_fetch(&*resource, err))?;
    debug!(archive = %resource, entries, "archive extracted");
    Ok(entries)
}
