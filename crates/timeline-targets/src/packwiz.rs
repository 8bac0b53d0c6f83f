use std::path::{Path, PathBuf};

use async_trait::async_trait;
use timeline_core::{TimelineConfig, TimelineError, Variant};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::{error::TargetError, target::UpdateTarget};

/// Replaces the output directory with a copy of the variant's pack directory.
///
/// A web server (or the Minecraft container's packwiz bootstrap) serves the
/// output directory, so after a sync it mirrors exactly one pack.
pub struct PackwizSyncer {
    packwiz_dir: PathBuf,
    output_path: PathBuf,
}

impl PackwizSyncer {
    pub fn new(packwiz_dir: PathBuf, output_path: PathBuf) -> Self {
        Self {
            packwiz_dir,
            output_path,
        }
    }

    pub fn from_config(config: &TimelineConfig) -> timeline_core::Result<Self> {
        let output = config.packwiz.output_path.as_deref().ok_or_else(|| {
            TimelineError::Config("packwiz.output_path is required".to_string())
        })?;
        Ok(Self::new(config.packwiz_dir(), config.resolve_path(output)))
    }
}

#[async_trait]
impl UpdateTarget for PackwizSyncer {
    fn name(&self) -> &str {
        "packwiz"
    }

    async fn update_variant(&self, variant: &Variant) -> Result<(), TargetError> {
        let source = variant.pack_dir(&self.packwiz_dir);
        let dest = self.output_path.clone();
        info!(pack = %variant.pack, output = %dest.display(), "syncing packwiz files");

        let copied = tokio::task::spawn_blocking(move || sync_dir(&source, &dest))
            .await
            .map_err(|e| TargetError::Sync(format!("sync task failed: {e}")))??;

        debug!(pack = %variant.pack, files = copied, "packwiz sync complete");
        Ok(())
    }
}

/// Mirror `source` into `dest`, removing whatever `dest` held before.
/// Returns the number of files copied.
fn sync_dir(source: &Path, dest: &Path) -> Result<usize, TargetError> {
    if !source.is_dir() {
        return Err(TargetError::Sync(format!(
            "pack directory {} does not exist",
            source.display()
        )));
    }
    if dest.exists() {
        std::fs::remove_dir_all(dest)?;
    }
    std::fs::create_dir_all(dest)?;

    let mut copied = 0;
    for entry in WalkDir::new(source).follow_links(true).min_depth(1) {
        let entry = entry.map_err(|e| TargetError::Sync(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| TargetError::Sync(e.to_string()))?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}
