//! `timeline-core`: configuration, variants and the compose template.
//!
//! Everything in here runs once at startup: the config is loaded, the
//! configured sub-timelines are resolved into an ordered list of
//! [`Variant`]s, and the list is checked for apparent version downgrades.

pub mod config;
pub mod error;
pub mod template;
pub mod variant;
pub mod version;

pub use config::{StartTrigger, TimelineConfig};
pub use error::{Result, TimelineError};
pub use variant::Variant;
pub use version::{check_version_order, OrderWarning};
