use async_trait::async_trait;
use timeline_core::{TimelineConfig, Variant};
use tracing::info;

use crate::{error::TargetError, packwiz::PackwizSyncer, portainer::PortainerTarget};

/// Common interface implemented by everything that can apply a variant
/// (file sync, remote stack deploy, …).
///
/// Targets are invoked one after another, in registration order, from the
/// single update worker. Implementations must tolerate being re-invoked with
/// the same variant after a restart.
#[async_trait]
pub trait UpdateTarget: Send + Sync {
    /// Stable lowercase identifier used in logs (e.g. `"packwiz"`).
    fn name(&self) -> &str;

    /// Apply `variant`. An error aborts the current update job.
    async fn update_variant(&self, variant: &Variant) -> Result<(), TargetError>;
}

/// Build the enabled targets in their required order.
///
/// The file sync runs first so its output is in place before the stack is
/// redeployed (the compose template may mount it).
pub fn build_targets(
    config: &TimelineConfig,
) -> timeline_core::Result<Vec<Box<dyn UpdateTarget>>> {
    let mut targets: Vec<Box<dyn UpdateTarget>> = Vec::new();

    if config.packwiz.enable {
        targets.push(Box::new(PackwizSyncer::from_config(config)?));
    }
    if config.portainer.enable {
        targets.push(Box::new(PortainerTarget::from_config(config)?));
    }

    let names: Vec<&str> = targets.iter().map(|t| t.name()).collect();
    info!(targets = ?names, "update targets configured");
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_are_built_in_sync_then_deploy_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("compose.yml"), "image: {server_image}\n").unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [updater]
            interval = 10
            start_time = "now"

            [portainer]
            enable = true
            hostname = "portainer.local"
            stack_name = "mc"
            template = "compose.yml"

            [packwiz]
            enable = true
            output_path = "out"
            "#,
        )
        .unwrap();
        let config = TimelineConfig::load(path.to_str()).unwrap();

        let targets = build_targets(&config).unwrap();
        let names: Vec<&str> = targets.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["packwiz", "portainer"]);
    }

    #[test]
    fn no_targets_when_nothing_is_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[updater]\ninterval = 10\nstart_time = \"now\"\n").unwrap();
        let config = TimelineConfig::load(path.to_str()).unwrap();
        assert!(build_targets(&config).unwrap().is_empty());
    }
}
