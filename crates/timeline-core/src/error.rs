use std::path::PathBuf;

use thiserror::Error;

/// Startup errors: anything raised here aborts the process before scheduling.
#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pack {pack} not found in packwiz directory {}", dir.display())]
    PackNotFound { pack: String, dir: PathBuf },

    #[error("Pack metadata error in {}: {reason}", path.display())]
    PackMetadata { path: PathBuf, reason: String },

    #[error("Template file not found at {}", path.display())]
    TemplateNotFound { path: PathBuf },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Invalid timeline {name}: {reason}")]
    Timeline { name: String, reason: String },

    #[error("TOML parse error in {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TimelineError>;
