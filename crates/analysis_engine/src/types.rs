use std::fmt;
use std::io;
use std::path::PathBuf;

use analysis_core::{FormatTag, JobOutcome};
use thiserror::Error;

/// Identifies one parser handle. Strictly increasing per controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub(crate) fn first() -> Self {
        Self(1)
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of the controller's single job slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// No parser handle exists.
    Idle,
    /// A handle exists and its worker is executing.
    Running,
    /// The worker confirmed its exit; the handle is kept so results stay queryable.
    StoppingConfirmed,
}

/// How a strategy's `run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Finished,
    /// Stopped early because the parsing limit was reached.
    LimitReached,
    /// Stopped early because an abort was requested.
    Aborted,
}

/// Reports a worker sends back to the supervising thread, in production order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserEvent {
    Progress(u8),
    StreamInfoUpdated,
    Completed(JobOutcome),
}

/// Result of [`crate::JobController::restart`] when no error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    /// A worker was launched for the handle with this generation.
    Started(Generation),
    /// No source was given; the controller is idle.
    NoSource,
    /// No parser exists for the source format; the controller is idle.
    Unsupported(FormatTag),
}

/// Failure reported by a parser strategy. The `Display` text is shown to the user.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("the file is empty")]
    Empty,
    #[error("no {format} sync point found")]
    NoSyncFound { format: FormatTag },
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("failed to spawn analysis worker: {0}")]
    Spawn(#[from] io::Error),
}
