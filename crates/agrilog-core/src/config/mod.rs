//! Runtime configuration.
//!
//! Values come from an optional JSON file and are then overridden by
//! `AGRILOG_*` environment variables. A missing or unreadable file falls back
//! to defaults; an invalid environment value is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::media::TranscodeOptions;
use crate::remote::MAX_BATCH_WRITES;
use crate::sync::SyncOptions;
use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

const APP_DIR: &str = "agrilog";
const DATABASE_FILE: &str = "agrilog.db";
const CONFIG_FILE: &str = "config.json";
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 15;
const DEFAULT_LOG_LEVEL: &str = "info";

pub const ENV_DB_PATH: &str = "AGRILOG_DB_PATH";
pub const ENV_REMOTE_URL: &str = "AGRILOG_REMOTE_URL";
pub const ENV_REMOTE_API_KEY: &str = "AGRILOG_REMOTE_API_KEY";
pub const ENV_PROBE_URL: &str = "AGRILOG_PROBE_URL";
pub const ENV_PROBE_INTERVAL_SECS: &str = "AGRILOG_PROBE_INTERVAL_SECS";
pub const ENV_BATCH_LIMIT: &str = "AGRILOG_BATCH_LIMIT";
pub const ENV_LOG: &str = "AGRILOG_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    /// Remote document store; sync is disabled when absent.
    pub remote_base_url: Option<String>,
    pub remote_api_key: Option<String>,
    /// Reachability probe target; defaults to the remote base URL.
    pub probe_url: Option<String>,
    pub probe_interval_secs: u64,
    pub batch_limit: usize,
    pub image: TranscodeOptions,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            remote_base_url: None,
            remote_api_key: None,
            probe_url: None,
            probe_interval_secs: DEFAULT_PROBE_INTERVAL_SECS,
            batch_limit: MAX_BATCH_WRITES,
            image: TranscodeOptions::default(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl AppConfig {
    /// Read the config file at `path`, or defaults when it is missing or invalid.
    pub fn load(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Self::default();
            }
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "Failed to read config file");
                return Self::default();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(config) => config,
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "Failed to parse config file");
                Self::default()
            }
        }
    }

    /// Load the file, then apply overrides from the process environment.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let mut config = Self::load(path);
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `AGRILOG_*` overrides and validate the result.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = optional_trimmed(&lookup, ENV_DB_PATH) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(url) = optional_trimmed(&lookup, ENV_REMOTE_URL) {
            self.remote_base_url = Some(url);
        }
        if let Some(key) = optional_trimmed(&lookup, ENV_REMOTE_API_KEY) {
            self.remote_api_key = Some(key);
        }
        if let Some(url) = optional_trimmed(&lookup, ENV_PROBE_URL) {
            self.probe_url = Some(url);
        }
        if let Some(raw) = optional_trimmed(&lookup, ENV_PROBE_INTERVAL_SECS) {
            self.probe_interval_secs = raw.parse::<u64>().map_err(|_| {
                Error::Config(format!(
                    "{ENV_PROBE_INTERVAL_SECS} must be a whole number of seconds"
                ))
            })?;
        }
        if let Some(raw) = optional_trimmed(&lookup, ENV_BATCH_LIMIT) {
            self.batch_limit = raw.parse::<usize>().map_err(|_| {
                Error::Config(format!(
                    "{ENV_BATCH_LIMIT} must be an integer in [1, {MAX_BATCH_WRITES}]"
                ))
            })?;
        }
        if let Some(level) = optional_trimmed(&lookup, ENV_LOG) {
            self.log_level = level;
        }

        self.validate()
    }

    /// Check invariants and normalize URLs.
    pub fn validate(&mut self) -> Result<()> {
        self.remote_base_url = normalize_url(self.remote_base_url.take(), ENV_REMOTE_URL)?;
        self.probe_url = normalize_url(self.probe_url.take(), ENV_PROBE_URL)?;
        self.remote_api_key = normalize_text_option(self.remote_api_key.take());

        if !(1..=MAX_BATCH_WRITES).contains(&self.batch_limit) {
            return Err(Error::Config(format!(
                "{ENV_BATCH_LIMIT} must be in [1, {MAX_BATCH_WRITES}], got {}",
                self.batch_limit
            )));
        }
        if self.probe_interval_secs == 0 {
            return Err(Error::Config(format!(
                "{ENV_PROBE_INTERVAL_SECS} must be at least 1"
            )));
        }
        if !(1..=100).contains(&self.image.jpeg_quality) {
            return Err(Error::Config(format!(
                "image.jpeg_quality must be in [1, 100], got {}",
                self.image.jpeg_quality
            )));
        }
        Ok(())
    }

    pub fn sync_enabled(&self) -> bool {
        self.remote_base_url.is_some()
    }

    /// Where connectivity is probed: the explicit probe URL, else the remote.
    pub fn effective_probe_url(&self) -> Option<&str> {
        self.probe_url
            .as_deref()
            .or(self.remote_base_url.as_deref())
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            batch_limit: self.batch_limit,
        }
    }
}

/// `<config_dir>/agrilog/config.json`, or a relative path when the platform
/// has no config directory.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_default()
        .join(CONFIG_FILE)
}

/// `<data_local_dir>/agrilog/agrilog.db`, or a relative path when the
/// platform has no data directory.
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_default()
        .join(DATABASE_FILE)
}

fn optional_trimmed(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    normalize_text_option(lookup(key))
}

fn normalize_url(value: Option<String>, name: &str) -> Result<Option<String>> {
    let Some(url) = normalize_text_option(value) else {
        return Ok(None);
    };
    if !is_http_url(&url) {
        return Err(Error::Config(format!(
            "{name} must start with http:// or https://"
        )));
    }
    Ok(Some(url.trim_end_matches('/').to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(values: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = values
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |key| values.get(key).cloned()
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();

        let config = AppConfig::load(&dir.path().join("absent.json"));

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.batch_limit, 499);
        assert_eq!(config.probe_interval_secs, 15);
        assert_eq!(config.log_level, "info");
        assert!(!config.sync_enabled());
    }

    #[test]
    fn invalid_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert_eq!(AppConfig::load(&path), AppConfig::default());
    }

    #[test]
    fn file_values_are_read_and_partial_files_keep_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "remote_base_url": "https://sync.example.com",
                "batch_limit": 100,
                "image": { "max_width": 640 }
            }"#,
        )
        .unwrap();

        let config = AppConfig::load(&path);

        assert_eq!(
            config.remote_base_url.as_deref(),
            Some("https://sync.example.com")
        );
        assert_eq!(config.batch_limit, 100);
        assert_eq!(config.image.max_width, 640);
        assert_eq!(config.image.jpeg_quality, 50);
        assert_eq!(config.sync_options().batch_limit, 100);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = AppConfig {
            remote_base_url: Some("https://file.example.com".to_string()),
            ..AppConfig::default()
        };

        config
            .apply_env(lookup(&[
                (ENV_REMOTE_URL, " https://env.example.com/ "),
                (ENV_REMOTE_API_KEY, "  "),
                (ENV_PROBE_INTERVAL_SECS, "30"),
                (ENV_DB_PATH, "/tmp/agrilog/test.db"),
                (ENV_LOG, "debug"),
            ]))
            .unwrap();

        assert_eq!(
            config.remote_base_url.as_deref(),
            Some("https://env.example.com")
        );
        assert_eq!(config.remote_api_key, None);
        assert_eq!(config.probe_interval(), Duration::from_secs(30));
        assert_eq!(config.database_path, PathBuf::from("/tmp/agrilog/test.db"));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.effective_probe_url(), Some("https://env.example.com"));
    }

    #[test]
    fn invalid_env_values_name_the_variable() {
        let cases = [
            (ENV_REMOTE_URL, "sync.example.com"),
            (ENV_BATCH_LIMIT, "0"),
            (ENV_BATCH_LIMIT, "500"),
            (ENV_PROBE_INTERVAL_SECS, "soon"),
        ];

        for (key, value) in cases {
            let mut config = AppConfig::default();
            let error = config.apply_env(lookup(&[(key, value)])).unwrap_err();
            assert!(
                matches!(&error, Error::Config(message) if message.contains(key)),
                "{key}={value} gave {error}"
            );
        }
    }

    #[test]
    fn probe_url_takes_precedence() {
        let mut config = AppConfig::default();
        config
            .apply_env(lookup(&[
                (ENV_REMOTE_URL, "https://sync.example.com"),
                (ENV_PROBE_URL, "https://probe.example.com/health"),
            ]))
            .unwrap();

        assert_eq!(
            config.effective_probe_url(),
            Some("https://probe.example.com/health")
        );
    }

    #[test]
    fn default_paths_end_in_app_directory() {
        assert!(default_database_path().ends_with("agrilog/agrilog.db"));
        assert!(default_config_path().ends_with("agrilog/config.json"));
    }
}
