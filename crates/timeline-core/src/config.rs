use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TimelineError};

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_TYPE: &str = "VANILLA";
/// Sentinel server version: resolve from the pack's `pack.toml`.
pub const PACKWIZ_VERSION: &str = "packwiz";
/// Sentinel start time: begin as soon as the process starts.
pub const START_NOW: &str = "now";
/// Directory (relative to the config dir) holding one sub-directory per pack.
pub const PACKWIZ_DIR: &str = "packwiz";
/// Longest accepted update interval: 100 years, in minutes.
pub const MAX_INTERVAL_MINUTES: u64 = 100 * 366 * 24 * 60;

/// Top-level config (config.toml + TIMELINE_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineConfig {
    /// Default log filter when RUST_LOG is unset.
    #[serde(default = "default_verbosity")]
    pub verbosity: String,
    pub updater: UpdaterConfig,
    #[serde(default)]
    pub packwiz: PackwizConfig,
    #[serde(default)]
    pub portainer: PortainerConfig,
    /// Directory the config file was loaded from; all relative paths resolve here.
    #[serde(skip)]
    pub config_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Minutes between two updates.
    pub interval: u64,
    /// `"now"` or a daily wall-clock time (`HH:MM` / `HH:MM:SS`, local time).
    pub start_time: String,
    /// Sub-timeline names, each loaded from `<config_dir>/<name>.toml`.
    #[serde(default)]
    pub timelines: Vec<String>,
    #[serde(default)]
    pub save: SaveConfig,
}

/// Progress persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "default_save_path")]
    pub path: String,
    /// Keep the progress file once the timeline has finished.
    #[serde(default)]
    pub keep: bool,
    #[serde(default)]
    pub repeat_after_load: RepeatAfterLoad,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            enable: false,
            path: default_save_path(),
            keep: false,
            repeat_after_load: RepeatAfterLoad::default(),
        }
    }
}

/// Either an explicit flag or the keyword `"auto"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RepeatAfterLoad {
    Flag(bool),
    Keyword(String),
}

impl Default for RepeatAfterLoad {
    fn default() -> Self {
        RepeatAfterLoad::Keyword("auto".to_string())
    }
}

impl RepeatAfterLoad {
    /// Resolve the policy. `auto` repeats the stored step exactly when the
    /// timeline starts immediately.
    pub fn resolve(&self, trigger: &StartTrigger) -> Result<bool> {
        match self {
            RepeatAfterLoad::Flag(flag) => Ok(*flag),
            RepeatAfterLoad::Keyword(k) if k.eq_ignore_ascii_case("auto") => {
                Ok(matches!(trigger, StartTrigger::Now))
            }
            RepeatAfterLoad::Keyword(other) => Err(TimelineError::Config(format!(
                "repeat_after_load must be a boolean or the string \"auto\", got \"{other}\""
            ))),
        }
    }
}

/// File sync target settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PackwizConfig {
    #[serde(default)]
    pub enable: bool,
    pub output_path: Option<String>,
}

/// Remote stack deploy target settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortainerConfig {
    #[serde(default)]
    pub enable: bool,
    pub hostname: Option<String>,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    pub stack_name: Option<String>,
    /// Compose template path, relative to the config dir.
    pub template: Option<String>,
    /// Static headers sent with every request (e.g. `X-API-Key`).
    #[serde(default)]
    pub header: Vec<HeaderConfig>,
}

impl Default for PortainerConfig {
    fn default() -> Self {
        Self {
            enable: false,
            hostname: None,
            scheme: default_scheme(),
            stack_name: None,
            template: None,
            header: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderConfig {
    pub name: String,
    pub value: String,
}

/// When the first update fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartTrigger {
    Now,
    Daily(NaiveTime),
}

impl StartTrigger {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case(START_NOW) {
            return Ok(StartTrigger::Now);
        }
        NaiveTime::parse_from_str(raw, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
            .map(StartTrigger::Daily)
            .map_err(|_| {
                TimelineError::Config(format!(
                    "start_time must be \"now\" or a time like \"18:30\", got \"{raw}\""
                ))
            })
    }
}

impl std::fmt::Display for StartTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartTrigger::Now => write!(f, "{START_NOW}"),
            StartTrigger::Daily(t) => write!(f, "{}", t.format("%H:%M:%S")),
        }
    }
}

fn default_verbosity() -> String {
    "info".to_string()
}
fn default_save_path() -> String {
    "progress.txt".to_string()
}
fn default_scheme() -> String {
    "https".to_string()
}

impl TimelineConfig {
    /// Load config from a TOML file with TIMELINE_* env var overrides.
    ///
    /// Nested keys use a double underscore: `TIMELINE_UPDATER__INTERVAL=5`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = PathBuf::from(config_path.unwrap_or(DEFAULT_CONFIG_PATH));
        if !path.is_file() {
            return Err(TimelineError::Config(format!(
                "config file not found at {}",
                path.display()
            )));
        }

        let mut config: TimelineConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TIMELINE_").split("__"))
            .extract()
            .map_err(|e| TimelineError::Config(e.to_string()))?;

        config.config_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.validate()?;
        Ok(config)
    }

    /// Check everything that can be checked without touching the timelines.
    pub fn validate(&self) -> Result<()> {
        if self.updater.interval == 0 {
            return Err(TimelineError::Config(
                "updater.interval must be a positive number of minutes".to_string(),
            ));
        }
        if self.updater.interval > MAX_INTERVAL_MINUTES {
            return Err(TimelineError::Config(format!(
                "updater.interval must be at most {MAX_INTERVAL_MINUTES} minutes, got {}",
                self.updater.interval
            )));
        }
        let trigger = self.start_trigger()?;
        self.updater.save.repeat_after_load.resolve(&trigger)?;

        if self.packwiz.enable && self.packwiz.output_path.is_none() {
            return Err(TimelineError::Config(
                "packwiz.output_path is required when packwiz is enabled".to_string(),
            ));
        }
        if self.portainer.enable {
            if self.portainer.hostname.is_none() || self.portainer.stack_name.is_none() {
                return Err(TimelineError::Config(
                    "portainer.hostname and portainer.stack_name are required when portainer is enabled"
                        .to_string(),
                ));
            }
            let template = self.template_path().ok_or_else(|| {
                TimelineError::Config(
                    "portainer.template is required when portainer is enabled".to_string(),
                )
            })?;
            if !template.is_file() {
                return Err(TimelineError::TemplateNotFound { path: template });
            }
        }
        Ok(())
    }

    pub fn start_trigger(&self) -> Result<StartTrigger> {
        StartTrigger::parse(&self.updater.start_time)
    }

    pub fn repeat_after_load(&self) -> Result<bool> {
        self.updater
            .save
            .repeat_after_load
            .resolve(&self.start_trigger()?)
    }

    /// Resolve a config-relative path. Absolute paths are returned unchanged.
    pub fn resolve_path(&self, relative: &str) -> PathBuf {
        self.config_dir.join(relative)
    }

    pub fn timeline_path(&self, name: &str) -> PathBuf {
        self.resolve_path(&format!("{name}.toml"))
    }

    pub fn packwiz_dir(&self) -> PathBuf {
        self.resolve_path(PACKWIZ_DIR)
    }

    pub fn progress_path(&self) -> PathBuf {
        self.resolve_path(&self.updater.save.path)
    }

    pub fn template_path(&self) -> Option<PathBuf> {
        self.portainer.template.as_deref().map(|t| self.resolve_path(t))
    }

    /// Log filter derived from `verbosity`; accepts `DEBUG`-style level names.
    pub fn log_filter(&self) -> String {
        self.verbosity.to_ascii_lowercase()
    }
}
