//! Site configuration
//!
//! `SiteConfig` is read once when a `Site` session is constructed. Every
//! field has a serde default so partial JSON files load, and a couple of
//! switches can be overridden from the environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::services::events::SITE_EVENT_CHANNEL_CAPACITY;

/// Environment variable overriding `reload_after_write`
pub const ENV_RELOAD_AFTER_WRITE: &str = "PAGETREE_RELOAD_AFTER_WRITE";

/// Environment variable overriding `copy_path_attempts`
pub const ENV_COPY_ATTEMPTS: &str = "PAGETREE_COPY_ATTEMPTS";

/// Runtime settings for a site session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    /// Refetch the whole tree from the store after every structural write
    #[serde(default = "default_reload_after_write")]
    pub reload_after_write: bool,

    /// Attempts at drawing a free copy path before giving up
    #[serde(default = "default_copy_path_attempts")]
    pub copy_path_attempts: u32,

    /// Hex characters in the random copy suffix
    #[serde(default = "default_copy_suffix_len")]
    pub copy_suffix_len: usize,

    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Reading speed used for the audit's reading-time estimate
    #[serde(default = "default_words_per_minute")]
    pub words_per_minute: u32,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            reload_after_write: default_reload_after_write(),
            copy_path_attempts: default_copy_path_attempts(),
            copy_suffix_len: default_copy_suffix_len(),
            event_channel_capacity: default_event_channel_capacity(),
            words_per_minute: default_words_per_minute(),
        }
    }
}

fn default_reload_after_write() -> bool {
    true
}

fn default_copy_path_attempts() -> u32 {
    8
}

fn default_copy_suffix_len() -> usize {
    6
}

fn default_event_channel_capacity() -> usize {
    SITE_EVENT_CHANNEL_CAPACITY
}

fn default_words_per_minute() -> u32 {
    200
}

impl SiteConfig {
    /// Load configuration from a JSON file
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config in {}", path.display()))
    }

    /// Apply `PAGETREE_*` environment overrides
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env_overrides(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(ENV_RELOAD_AFTER_WRITE) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.reload_after_write = true,
                "0" | "false" | "no" | "off" => self.reload_after_write = false,
                other => tracing::warn!("Ignoring {}={}", ENV_RELOAD_AFTER_WRITE, other),
            }
        }
        if let Some(raw) = lookup(ENV_COPY_ATTEMPTS) {
            match raw.trim().parse::<u32>() {
                Ok(attempts) if attempts > 0 => self.copy_path_attempts = attempts,
                _ => tracing::warn!("Ignoring {}={}", ENV_COPY_ATTEMPTS, raw),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SiteConfig = serde_json::from_str(r#"{"copyPathAttempts": 3}"#).unwrap();
        assert_eq!(config.copy_path_attempts, 3);
        assert!(config.reload_after_write);
        assert_eq!(config.words_per_minute, 200);
        assert_eq!(config.event_channel_capacity, 128);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_RELOAD_AFTER_WRITE, "false"),
            (ENV_COPY_ATTEMPTS, "12"),
        ]);
        let mut config = SiteConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert!(!config.reload_after_write);
        assert_eq!(config.copy_path_attempts, 12);
    }

    #[test]
    fn test_invalid_overrides_are_ignored() {
        let env: HashMap<&str, &str> =
            HashMap::from([(ENV_RELOAD_AFTER_WRITE, "maybe"), (ENV_COPY_ATTEMPTS, "0")]);
        let mut config = SiteConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config, SiteConfig::default());
    }

    #[tokio::test]
    async fn test_load_from_file() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("site.json");
        tokio::fs::write(&path, r#"{"reloadAfterWrite": false, "wordsPerMinute": 250}"#).await?;

        let config = SiteConfig::load(&path).await?;
        assert!(!config.reload_after_write);
        assert_eq!(config.words_per_minute, 250);
        assert_eq!(config.copy_suffix_len, 6);
        Ok(())
    }
}
