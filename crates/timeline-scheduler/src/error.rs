use std::path::PathBuf;

use thiserror::Error;
use timeline_targets::TargetError;

/// Errors that can occur within the scheduling subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Reading, writing or deleting the progress file failed.
    #[error("Progress file {} I/O error: {source}", path.display())]
    ProgressIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The progress file exists but does not hold a non-negative integer.
    #[error("Progress file {} holds {value:?}, expected a non-negative integer", path.display())]
    ProgressParse { path: PathBuf, value: String },

    /// An update target failed while applying a variant.
    #[error("Target {target} failed on variant {index:02}: {source}")]
    Target {
        target: String,
        index: usize,
        #[source]
        source: TargetError,
    },

    #[error(transparent)]
    Timeline(#[from] timeline_core::TimelineError),
}

impl SchedulerError {
    /// Whether the timeline has to stop. Target failures are retried on the
    /// next tick; anything touching progress is not.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SchedulerError::Target { .. })
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
