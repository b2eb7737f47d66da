use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

use crate::backend::DEFAULT_BASE_URL;

/// Environment variable that overrides the configured backend address
pub const BASE_URL_ENV: &str = "COUNSEL_BASE_URL";

/// What to do with a reply that resolves after the user switched modes
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StaleReplyPolicy {
    /// Append it anyway
    #[default]
    Apply,
    /// Drop it silently
    Discard,
}

impl StaleReplyPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaleReplyPolicy::Apply => "apply",
            StaleReplyPolicy::Discard => "discard",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub base_url: Option<String>,
    pub stale_replies: Option<StaleReplyPolicy>,
}

/// Settings after every source has been consulted, fixed for the process lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_url: String,
    pub stale_replies: StaleReplyPolicy,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    /// Resolve once at startup: flag, then environment, then file, then default.
    pub fn resolve(&self, flag: Option<&str>, env: Option<&str>) -> Settings {
        let base_url = [flag, env, self.base_url.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|url| !url.is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        Settings {
            base_url,
            stale_replies: self.stale_replies.unwrap_or_default(),
        }
    }

    /// Write `settings` out as the config file unless one is already there.
    ///
    /// Returns the path written, or `None` when a file existed.
    pub fn init(settings: &Settings) -> Result<Option<PathBuf>> {
        let path = Self::get_config_path()?;
        if path.exists() {
            return Ok(None);
        }
        Config::from(settings).save()?;
        Ok(Some(path))
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("counsel").join("config.json"))
    }
}

impl From<&Settings> for Config {
    fn from(settings: &Settings) -> Self {
        Self {
            base_url: Some(settings.base_url.clone()),
            stale_replies: Some(settings.stale_replies),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::new());
        assert_eq!(
            config.resolve(None, None),
            Settings {
                base_url: "http://localhost:8000".to_string(),
                stale_replies: StaleReplyPolicy::Apply,
            }
        );
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            base_url: Some("http://legal.internal:9000".to_string()),
            stale_replies: Some(StaleReplyPolicy::Discard),
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_policy_parses_lowercase() {
        let config: Config =
            serde_json::from_str(r#"{"base_url": null, "stale_replies": "discard"}"#).unwrap();
        assert_eq!(config.stale_replies, Some(StaleReplyPolicy::Discard));
    }

    #[test]
    fn test_resolution_precedence() {
        let config = Config {
            base_url: Some("http://from-file".to_string()),
            stale_replies: None,
        };

        assert_eq!(config.resolve(None, None).base_url, "http://from-file");
        assert_eq!(config.resolve(None, Some("http://from-env/")).base_url, "http://from-env");
        assert_eq!(
            config.resolve(Some("http://from-flag"), Some("http://from-env")).base_url,
            "http://from-flag"
        );
        // blank values fall through
        assert_eq!(config.resolve(Some("  "), Some("")).base_url, "http://from-file");
    }

    #[test]
    fn test_written_settings_resolve_back_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let settings = Config::new().resolve(Some("http://counsel.local:8000/"), None);

        Config::from(&settings).save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.base_url.as_deref(), Some("http://counsel.local:8000"));
        assert_eq!(loaded.resolve(None, None), settings);
    }
}
