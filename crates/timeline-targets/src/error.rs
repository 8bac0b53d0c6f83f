use thiserror::Error;

/// Errors raised while applying a variant to an update target.
#[derive(Debug, Error)]
pub enum TargetError {
    /// Copying pack files failed.
    #[error("Sync failed: {0}")]
    Sync(String),

    /// Transport-level HTTP failure (connect, timeout, TLS, …).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote API answered with a non-success status.
    #[error("API error {status} on {endpoint}: {message}")]
    Api {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// The configured stack does not exist on the remote host.
    #[error("Stack {0} not found")]
    StackNotFound(String),

    /// The remote answer could not be interpreted.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rendering or startup-level failure surfaced while applying a variant.
    #[error(transparent)]
    Timeline(#[from] timeline_core::TimelineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
