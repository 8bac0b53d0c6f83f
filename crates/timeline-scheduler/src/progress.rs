use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use timeline_core::TimelineConfig;
use tracing::{debug, info};

use crate::error::{Result, SchedulerError};

/// Persists the index of the last applied variant so a restart resumes the
/// timeline instead of starting over.
///
/// The file holds a single decimal integer. A missing file means "no
/// progress"; anything that does not parse is a hard error.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    enabled: bool,
    path: PathBuf,
    /// Leave the file in place once the timeline has finished.
    keep: bool,
    /// Re-apply the stored variant after a restart instead of the next one.
    repeat_after_load: bool,
}

impl ProgressStore {
    pub fn new(enabled: bool, path: PathBuf, keep: bool, repeat_after_load: bool) -> Self {
        Self {
            enabled,
            path,
            keep,
            repeat_after_load,
        }
    }

    /// A store that never touches the filesystem.
    pub fn disabled() -> Self {
        Self::new(false, PathBuf::new(), false, false)
    }

    pub fn from_config(config: &TimelineConfig) -> Result<Self> {
        let save = &config.updater.save;
        Ok(Self::new(
            save.enable,
            config.progress_path(),
            save.keep,
            config.repeat_after_load()?,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Index of the next variant to apply.
    pub fn load(&self) -> Result<usize> {
        if !self.enabled {
            return Ok(0);
        }

        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no progress file found, starting from the beginning");
                return Ok(0);
            }
            Err(source) => return Err(self.io_error(source)),
        };

        let stored: usize = raw
            .trim()
            .parse()
            .map_err(|_| SchedulerError::ProgressParse {
                path: self.path.clone(),
                value: raw.trim().to_string(),
            })?;
        let next = if self.repeat_after_load {
            stored
        } else {
            stored
                .checked_add(1)
                .ok_or_else(|| SchedulerError::ProgressParse {
                    path: self.path.clone(),
                    value: raw.trim().to_string(),
                })?
        };

        info!(
            "Loaded save file, will continue at variant {:02}, delete/modify \"{}\" or disable saving to restart/adjust timeline",
            next,
            self.path.display()
        );
        Ok(next)
    }

    /// Record `index` as the last applied variant. Last write wins.
    pub fn save(&self, index: usize) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        debug!("saving progress {:02} to {}", index, self.path.display());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        // Atomic write
        let temp_path = self.temp_path();
        std::fs::write(&temp_path, index.to_string()).map_err(|e| self.io_error(e))?;
        std::fs::rename(&temp_path, &self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    /// Remove the progress file unless `keep` is set. A missing file is fine.
    ///
    /// Runs even when saving is disabled, so a file left by an earlier run
    /// with saving enabled does not outlive a finished timeline.
    pub fn clear(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        if self.keep {
            debug!("keeping save file at \"{}\"", self.path.display());
            return Ok(());
        }

        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("deleted save file at \"{}\"", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    /// `<path>.tmp`, next to the progress file.
    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> SchedulerError {
        SchedulerError::ProgressIo {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path, repeat: bool, keep: bool) -> ProgressStore {
        ProgressStore::new(true, dir.join("progress.txt"), keep, repeat)
    }

    #[test]
    fn disabled_store_always_starts_at_zero_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.txt");
        std::fs::write(&path, "5").unwrap();

        let s = ProgressStore::new(false, path.clone(), true, false);
        assert_eq!(s.load().unwrap(), 0);
        s.save(9).unwrap();
        s.clear().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "5");
    }

    #[test]
    fn disabled_store_still_clears_a_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.txt");
        std::fs::write(&path, "5").unwrap();

        ProgressStore::new(false, path.clone(), false, false)
            .clear()
            .unwrap();
        assert!(!path.exists());
        ProgressStore::disabled().clear().unwrap();
    }

    #[test]
    fn missing_file_loads_zero_regardless_of_policy() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(store(dir.path(), true, false).load().unwrap(), 0);
        assert_eq!(store(dir.path(), false, false).load().unwrap(), 0);
    }

    #[test]
    fn resume_law() {
        let dir = tempfile::tempdir().unwrap();
        store(dir.path(), false, false).save(3).unwrap();

        assert_eq!(store(dir.path(), false, false).load().unwrap(), 4);
        assert_eq!(store(dir.path(), true, false).load().unwrap(), 3);
    }

    #[test]
    fn last_save_wins() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path(), true, false);
        s.save(1).unwrap();
        s.save(2).unwrap();
        s.save(2).unwrap();
        assert_eq!(s.load().unwrap(), 2);
        assert!(!dir.path().join("progress.txt.tmp").exists());
    }

    #[test]
    fn tmp_suffixed_path_still_writes_through_a_separate_file() {
        let dir = tempfile::tempdir().unwrap();
        let s = ProgressStore::new(true, dir.path().join("state.tmp"), false, true);
        s.save(6).unwrap();
        assert_eq!(s.load().unwrap(), 6);
        assert!(!dir.path().join("state.tmp.tmp").exists());
    }

    #[test]
    fn stored_maximum_cannot_advance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.txt");
        std::fs::write(&path, usize::MAX.to_string()).unwrap();

        assert!(matches!(
            store(dir.path(), false, false).load(),
            Err(SchedulerError::ProgressParse { .. })
        ));
        assert_eq!(store(dir.path(), true, false).load().unwrap(), usize::MAX);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path(), true, false);
        std::fs::write(s.path(), "three").unwrap();
        assert!(matches!(
            s.load(),
            Err(SchedulerError::ProgressParse { ref value, .. }) if value == "three"
        ));

        std::fs::write(s.path(), "-1").unwrap();
        assert!(s.load().is_err());
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path(), true, false);
        std::fs::write(s.path(), " 12\n").unwrap();
        assert_eq!(s.load().unwrap(), 12);
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path(), false, false);
        s.clear().unwrap();
        s.save(0).unwrap();
        s.clear().unwrap();
        assert!(!s.path().exists());
        s.clear().unwrap();
    }

    #[test]
    fn keep_leaves_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path(), false, true);
        s.save(4).unwrap();
        s.clear().unwrap();
        assert_eq!(std::fs::read_to_string(s.path()).unwrap(), "4");
    }

    #[test]
    fn save_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let s = ProgressStore::new(true, dir.path().join("state/progress.txt"), false, true);
        s.save(1).unwrap();
        assert_eq!(s.load().unwrap(), 1);
    }
}
