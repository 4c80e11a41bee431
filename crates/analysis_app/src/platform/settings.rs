use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use analysis_logging::analysis_info;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

use super::LogDestination;

const SETTINGS_FILENAME: &str = ".analysis_settings.ron";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not read settings from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not parse settings in {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("could not serialize settings: {0}")]
    Serialize(#[from] ron::Error),
    #[error("could not write settings to {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// User preferences carried between runs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub parse_entire_source: bool,
    pub stream_filter: Option<usize>,
    pub color_code_streams: bool,
    pub log_destination: LogDestination,
}

pub fn settings_path(dir: &Path) -> PathBuf {
    dir.join(SETTINGS_FILENAME)
}

/// Loads preferences from `dir`. A missing file yields the defaults.
pub fn load(dir: &Path) -> Result<Preferences, SettingsError> {
    let path = settings_path(dir);
    let content = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Ok(Preferences::default());
        }
        Err(source) => return Err(SettingsError::Read { path, source }),
    };

    ron::from_str(&content).map_err(|source| SettingsError::Parse { path, source })
}

/// Writes preferences to a temp file in `dir`, then renames it into place.
pub fn save(dir: &Path, preferences: &Preferences) -> Result<PathBuf, SettingsError> {
    let content = ron::ser::to_string_pretty(preferences, ron::ser::PrettyConfig::new())?;
    let target = settings_path(dir);
    let write_error = |source: io::Error| SettingsError::Write {
        path: target.clone(),
        source,
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_error)?;
    tmp.write_all(content.as_bytes()).map_err(write_error)?;
    tmp.as_file_mut().sync_all().map_err(write_error)?;
    tmp.persist(&target).map_err(|err| write_error(err.error))?;

    analysis_info!("saved preferences to {:?}", target);
    Ok(target)
}
