pub mod error;
pub mod packwiz;
pub mod portainer;
pub mod target;

pub use error::TargetError;
pub use packwiz::PackwizSyncer;
pub use portainer::PortainerTarget;
pub use target::{build_targets, UpdateTarget};
