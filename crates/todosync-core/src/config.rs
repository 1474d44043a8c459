//! Sync configuration.
//!
//! Loaded from `~/.config/todosync/config.json` when present, otherwise
//! defaults. A few environment variables override the file so the binary can
//! be pointed at another backend without editing it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for the config directory path
const APP_NAME: &str = "todosync";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Overrides `base_url`
pub const ENV_BASE_URL: &str = "TODOSYNC_BASE_URL";

/// Overrides `todo_refresh_secs`
pub const ENV_TODO_REFRESH_SECS: &str = "TODOSYNC_TODO_REFRESH_SECS";

/// Overrides `user_refresh_secs`
pub const ENV_USER_REFRESH_SECS: &str = "TODOSYNC_USER_REFRESH_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub base_url: String,
    pub todo_collection: String,
    pub user_collection: String,
    pub todo_refresh_secs: u64,
    pub user_refresh_secs: u64,
    pub request_timeout_secs: u64,
    pub log_file: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            todo_collection: "todos".to_string(),
            user_collection: "users".to_string(),
            todo_refresh_secs: 5,
            user_refresh_secs: 12,
            request_timeout_secs: 30,
            log_file: None,
        }
    }
}

impl SyncConfig {
    /// Load from the default location, apply environment overrides, validate.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Like [`load`](Self::load) but from an explicit file. A missing file
    /// yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid config {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply overrides read through `var` (normally the process environment).
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = var(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(secs) = var(ENV_TODO_REFRESH_SECS) {
            self.todo_refresh_secs = parse_secs(ENV_TODO_REFRESH_SECS, &secs)?;
        }
        if let Some(secs) = var(ENV_USER_REFRESH_SECS) {
            self.user_refresh_secs = parse_secs(ENV_USER_REFRESH_SECS, &secs)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            bail!("base_url must not be empty");
        }
        if self.todo_collection.is_empty() || self.user_collection.is_empty() {
            bail!("collection names must not be empty");
        }
        for (name, secs) in [
            ("todo_refresh_secs", self.todo_refresh_secs),
            ("user_refresh_secs", self.user_refresh_secs),
            ("request_timeout_secs", self.request_timeout_secs),
        ] {
            if secs == 0 {
                bail!("{name} must be greater than zero");
            }
        }
        Ok(())
    }

    pub fn todo_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.todo_refresh_secs)
    }

    pub fn user_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.user_refresh_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_secs(name: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{name} must be a whole number of seconds, got {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("todosync-config-test-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.base_url, "http://localhost:3000/api");
        assert_eq!(config.todo_refresh_interval(), Duration::from_secs(5));
        assert_eq!(config.user_refresh_interval(), Duration::from_secs(12));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{ "base_url": "http://example.test/api" }"#).unwrap();
        assert_eq!(config.base_url, "http://example.test/api");
        assert_eq!(config.todo_collection, "todos");
        assert_eq!(config.user_refresh_secs, 12);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = SyncConfig::default();
        config
            .apply_overrides(env(&[
                (ENV_BASE_URL, "http://remote:8080"),
                (ENV_TODO_REFRESH_SECS, " 2 "),
            ]))
            .unwrap();

        assert_eq!(config.base_url, "http://remote:8080");
        assert_eq!(config.todo_refresh_secs, 2);
        assert_eq!(config.user_refresh_secs, 12);
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let mut config = SyncConfig::default();
        let err = config
            .apply_overrides(env(&[(ENV_USER_REFRESH_SECS, "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_USER_REFRESH_SECS));
    }

    #[test]
    fn test_zero_interval_is_invalid() {
        let config = SyncConfig {
            todo_refresh_secs: 0,
            ..SyncConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("todo_refresh_secs"));
    }

    #[test]
    fn test_save_then_load_from() {
        let path = temp_path("config.json");
        let config = SyncConfig {
            user_collection: "people".to_string(),
            log_file: Some(PathBuf::from("/tmp/todosync.log")),
            ..SyncConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = SyncConfig::load_from(&path).unwrap();
        assert_eq!(loaded.user_collection, "people");
        assert_eq!(loaded.log_file, config.log_file);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let path = temp_path("broken.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let err = SyncConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid config"));

        let _ = std::fs::remove_file(&path);
    }
}
