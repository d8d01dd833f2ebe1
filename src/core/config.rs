//! Resolved engine settings.
//!
//! [`Settings`] is the only configuration surface the engine reads. It is stored as
//! pretty-printed JSON in the per-user configuration directory; every field has a
//! default so partial files are accepted.

use crate::core::dirs::get_config_directory;
use crate::core::error::{Result, TimeMachineError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub debounce_delay_ms: u64,
    /// Reserved for batched event processing; the matching engine does not read it.
    pub batch_size: usize,
    pub cache_max_entries: usize,
    pub cache_max_memory_mb: usize,
    pub branch_cache_ttl_secs: u64,
    /// Snapshots between automatic shadow store maintenance runs. 0 disables.
    pub git_cleanup_threshold: usize,
    /// Snapshots retained per shadow branch. 0 keeps everything.
    pub git_max_commits: usize,
    /// Upper bound on a single git invocation. 0 waits forever.
    pub git_command_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debounce_delay_ms: 1000,
            batch_size: 100,
            cache_max_entries: 10_000,
            cache_max_memory_mb: 10,
            branch_cache_ttl_secs: 30,
            git_cleanup_threshold: 100,
            git_max_commits: 1000,
            git_command_timeout_secs: 60,
        }
    }
}

impl Settings {
    /// Load settings from the user configuration directory, falling back to defaults
    /// when no config file exists.
    pub fn load() -> Result<Self> {
        let config_file = get_config_directory()?.join(CONFIG_FILE_NAME);
        Self::load_from(&config_file)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| TimeMachineError::config_read(path, e))?;
        let settings: Settings =
            serde_json::from_str(&content).map_err(|e| TimeMachineError::config_parse(path, e))?;
        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(get_config_directory()?.join(CONFIG_FILE_NAME))
    }

    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_delay_ms)
    }

    /// At least one second: a zero TTL would never validate.
    pub fn branch_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.branch_cache_ttl_secs.max(1))
    }

    pub fn git_command_timeout(&self) -> Option<Duration> {
        match self.git_command_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn cache_max_memory_bytes(&self) -> usize {
        self.cache_max_memory_mb.saturating_mul(1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let settings = Settings::load_from(&temp_dir.path().join("config.json"))?;
        assert_eq!(settings, Settings::default());
        Ok(())
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{ "debounce_delay_ms": 250 }"#)?;

        let settings = Settings::load_from(&path)?;
        assert_eq!(settings.debounce_delay_ms, 250);
        assert_eq!(settings.cache_max_entries, 10_000);
        assert_eq!(settings.debounce_delay(), Duration::from_millis(250));
        Ok(())
    }

    #[test]
    fn test_malformed_file_is_an_error() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, "{ not json")?;

        let result = Settings::load_from(&path);
        assert!(matches!(result, Err(TimeMachineError::ConfigParse { .. })));
        Ok(())
    }

    #[test]
    fn test_save_and_reload() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("nested").join("config.json");
        let settings = Settings {
            git_max_commits: 5,
            ..Settings::default()
        };
        settings.save_to(&path)?;
        assert_eq!(Settings::load_from(&path)?, settings);
        Ok(())
    }

    #[test]
    fn test_zero_timeout_disables_bound() {
        let settings = Settings {
            git_command_timeout_secs: 0,
            ..Settings::default()
        };
        assert_eq!(settings.git_command_timeout(), None);
        assert_eq!(
            Settings::default().git_command_timeout(),
            Some(Duration::from_secs(60))
        );
    }
}
