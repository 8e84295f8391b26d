//! Storage layer for watch logs.
//!
//! Each media file has at most one watch log, stored as tab-indented JSON.
//! Logs live either next to the media file (`<file>.watchlog.json`) or in a
//! shared directory, where the name is derived from a hash of the media
//! file's parent directory plus its base name so that equally named files in
//! different directories do not collide.
//!
//! A missing log is not an error: [`WatchLogStore::load`] returns `Ok(None)`
//! and the caller starts a fresh history.

use std::io;
use std::path::{Path, PathBuf};

use pt_core::WatchLog;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Number of digest bytes used in directory-mode file names.
const NAME_PREFIX_BYTES: usize = 10;

/// Suffix appended to the media file name in beside-media mode.
const BESIDE_SUFFIX: &str = ".watchlog.json";

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the log file failed.
    #[error("watch log io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The log file exists but is not a valid watch log.
    #[error("invalid watch log {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The media file name cannot be mapped to a log name.
    #[error("cannot derive watch log name for {0:?}")]
    InvalidMediaPath(String),
}

/// Where watch logs are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Next to the media file.
    BesideMedia,
    /// In one shared directory.
    Directory(PathBuf),
}

/// Reads and writes watch logs for media files.
#[derive(Debug, Clone)]
pub struct WatchLogStore {
    location: Location,
}

impl WatchLogStore {
    pub const fn new(location: Location) -> Self {
        Self { location }
    }

    /// Stores logs in `dir` when given, otherwise beside each media file.
    pub fn from_dir(dir: Option<PathBuf>) -> Self {
        Self::new(dir.map_or(Location::BesideMedia, Location::Directory))
    }

    pub const fn location(&self) -> &Location {
        &self.location
    }

    /// Returns the log path for a media file.
    pub fn path_for(&self, media_file: &str) -> Result<PathBuf, StoreError> {
        if media_file.is_empty() {
            return Err(StoreError::InvalidMediaPath(media_file.to_string()));
        }
        match &self.location {
            Location::BesideMedia => Ok(PathBuf::from(format!("{media_file}{BESIDE_SUFFIX}"))),
            Location::Directory(dir) => {
                let absolute = std::path::absolute(media_file).map_err(|source| StoreError::Io {
                    path: PathBuf::from(media_file),
                    source,
                })?;
                let base = absolute
                    .file_name()
                    .ok_or_else(|| StoreError::InvalidMediaPath(media_file.to_string()))?;
                let parent = absolute.parent().unwrap_or_else(|| Path::new(""));
                let digest = Sha256::digest(parent.as_os_str().as_encoded_bytes());
                let prefix = hex::encode(&digest[..NAME_PREFIX_BYTES]);
                Ok(dir.join(format!("{prefix}_{}.json", base.to_string_lossy())))
            }
        }
    }

    /// Loads the log for a media file, `None` if it has never been written.
    pub fn load(&self, media_file: &str) -> Result<Option<WatchLog>, StoreError> {
        read_watch_log(&self.path_for(media_file)?)
    }

    /// Writes the log for a media file and returns where it went.
    pub fn save(&self, media_file: &str, log: &WatchLog) -> Result<PathBuf, StoreError> {
        let path = self.path_for(media_file)?;
        write_watch_log(&path, log)?;
        Ok(path)
    }
}

/// Reads a watch log file, `None` if it does not exist.
pub fn read_watch_log(path: &Path) -> Result<Option<WatchLog>, StoreError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let log = serde_json::from_str(&content).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "loaded watch log");
    Ok(Some(log))
}

/// Writes a watch log file, replacing any previous content.
///
/// The log is written to a sibling temporary file first and renamed into
/// place, so readers never see a half-written log.
pub fn write_watch_log(path: &Path, log: &WatchLog) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    log.serialize(&mut serializer)
        .map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    buf.push(b'\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, &buf).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    tracing::debug!(path = %path.display(), points = log.tape.len(), "wrote watch log");
    Ok(())
}
