use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{TimelineConfig, DEFAULT_SERVER_TYPE, PACKWIZ_VERSION};
use crate::error::{Result, TimelineError};

/// One resolved timeline step.
///
/// Built once at startup with its final `index`; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Variant {
    pub index: usize,
    pub pack: String,
    pub server_image: String,
    pub server_type: String,
    /// Always the resolved version, never the `packwiz` sentinel.
    pub server_version: String,
    pub additional_envs: BTreeMap<String, String>,
}

impl Variant {
    /// Directory holding this variant's pack files.
    pub fn pack_dir(&self, packwiz_dir: &Path) -> PathBuf {
        packwiz_dir.join(&self.pack)
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{:02} {} ({} {} on {})",
            self.index, self.pack, self.server_type, self.server_version, self.server_image
        )
    }
}

/// A variant as written in a timeline file. Omitted fields are inherited
/// from the previous entry of the same file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantSpec {
    pub pack: Option<String>,
    pub server_image: Option<String>,
    pub server_type: Option<String>,
    pub server_version: Option<String>,
    #[serde(default)]
    pub additional_envs: BTreeMap<String, String>,
}

/// Contents of `<config_dir>/<name>.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimelineFile {
    #[serde(default)]
    pub variants: Vec<VariantSpec>,
}

impl TimelineFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| TimelineError::Timeline {
            name: path.display().to_string(),
            reason: e.to_string(),
        })?;
        toml::from_str(&raw).map_err(|source| TimelineError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Load and resolve every configured sub-timeline into one ordered list.
pub fn load_timeline(config: &TimelineConfig) -> Result<Vec<Variant>> {
    let mut named = Vec::with_capacity(config.updater.timelines.len());
    for name in &config.updater.timelines {
        let file = TimelineFile::load(&config.timeline_path(name))?;
        named.push((name.clone(), file));
    }
    resolve_timeline(&config.packwiz_dir(), named)
}

/// Concatenate sub-timelines, skipping empty ones, and assign indices over
/// the surviving sequence.
pub fn resolve_timeline(
    packwiz_dir: &Path,
    timelines: Vec<(String, TimelineFile)>,
) -> Result<Vec<Variant>> {
    let mut variants: Vec<Variant> = Vec::new();

    for (name, file) in timelines {
        if file.variants.is_empty() {
            info!(timeline = %name, "found no variants in timeline, skipping");
            continue;
        }

        let mut inherited = Inherited::default();
        let count = file.variants.len();
        for spec in file.variants {
            let variant = inherited.resolve(&name, spec, variants.len(), packwiz_dir)?;
            info!("Parsed variant {:02}: {}", variant.index, variant);
            variants.push(variant);
        }
        info!(timeline = %name, count, "found variants in timeline");
    }

    Ok(variants)
}

/// Fields carried from one entry of a timeline file to the next.
#[derive(Default)]
struct Inherited {
    pack: Option<String>,
    server_image: Option<String>,
    server_type: Option<String>,
    server_version: Option<String>,
}

impl Inherited {
    fn resolve(
        &mut self,
        timeline: &str,
        spec: VariantSpec,
        index: usize,
        packwiz_dir: &Path,
    ) -> Result<Variant> {
        if let Some(pack) = spec.pack {
            self.pack = Some(pack);
        }
        if let Some(image) = spec.server_image {
            self.server_image = Some(image);
        }
        if let Some(kind) = spec.server_type {
            self.server_type = Some(kind);
        }
        if let Some(version) = spec.server_version {
            self.server_version = Some(version);
        }

        let (Some(pack), Some(server_image)) = (self.pack.clone(), self.server_image.clone())
        else {
            return Err(TimelineError::Timeline {
                name: timeline.to_string(),
                reason: "missing variant information, the first variant needs at least a pack and a server_image"
                    .to_string(),
            });
        };

        let pack_dir = packwiz_dir.join(&pack);
        if !pack_dir.is_dir() {
            return Err(TimelineError::PackNotFound {
                pack,
                dir: packwiz_dir.to_path_buf(),
            });
        }

        let raw_version = self.server_version.as_deref().unwrap_or(PACKWIZ_VERSION);
        let server_version = if raw_version == PACKWIZ_VERSION {
            read_pack_version(&pack_dir)?
        } else {
            raw_version.to_string()
        };

        Ok(Variant {
            index,
            pack,
            server_image,
            server_type: self
                .server_type
                .clone()
                .unwrap_or_else(|| DEFAULT_SERVER_TYPE.to_string()),
            server_version,
            additional_envs: spec.additional_envs,
        })
    }
}

/// Read `versions.minecraft` from a pack's `pack.toml`.
pub fn read_pack_version(pack_dir: &Path) -> Result<String> {
    let path = pack_dir.join("pack.toml");
    let raw = std::fs::read_to_string(&path).map_err(|e| TimelineError::PackMetadata {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    let doc: toml::Table = toml::from_str(&raw).map_err(|source| TimelineError::Toml {
        path: path.clone(),
        source,
    })?;

    doc.get("versions")
        .and_then(|v| v.get("minecraft"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| TimelineError::PackMetadata {
            path,
            reason: "versions.minecraft is missing".to_string(),
        })
}
