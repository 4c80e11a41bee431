use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Input format of a compressed source.
///
/// The set is closed: every consumer matches it exhaustively, so adding a
/// variant forces each selector to decide what to do with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatTag {
    AnnexBHevc,
    AnnexBVvc,
    AnnexBAvc,
    AnnexBMpeg2,
    Container,
    /// The host could not classify the source.
    Unknown,
}

impl FormatTag {
    pub fn label(self) -> &'static str {
        match self {
            FormatTag::AnnexBHevc => "Annex-B HEVC",
            FormatTag::AnnexBVvc => "Annex-B VVC",
            FormatTag::AnnexBAvc => "Annex-B AVC",
            FormatTag::AnnexBMpeg2 => "Annex-B MPEG-2",
            FormatTag::Container => "Container",
            FormatTag::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatTagError {
    #[error("unrecognized format tag: {0:?}")]
    Unrecognized(String),
}

impl FromStr for FormatTag {
    type Err = FormatTagError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hevc" | "h265" | "265" => Ok(FormatTag::AnnexBHevc),
            "vvc" | "h266" | "266" => Ok(FormatTag::AnnexBVvc),
            "avc" | "h264" | "264" => Ok(FormatTag::AnnexBAvc),
            "mpeg2" | "m2v" => Ok(FormatTag::AnnexBMpeg2),
            "ts" | "mpegts" | "container" => Ok(FormatTag::Container),
            "unknown" => Ok(FormatTag::Unknown),
            _ => Err(FormatTagError::Unrecognized(raw.to_string())),
        }
    }
}

/// Identifies the compressed source a job analyses.
///
/// Immutable once constructed; a different source means a new descriptor and
/// a full restart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceDescriptor {
    path: PathBuf,
    format: FormatTag,
}

impl SourceDescriptor {
    pub fn new(path: impl Into<PathBuf>, format: FormatTag) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> FormatTag {
        self.format
    }

    /// File name for display, falling back to the full path.
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}
