//! Engine configuration.
//!
//! Every tunable of the cache engine lives in `EngineConfig`: the generation
//! tag, the shell resource list, the URL patterns that drive classification,
//! the dynamic store bound and the cross-origin allow-list.
//!
//! Configuration is read from a JSON file; any field left out falls back to
//! the default deployment values below.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Store name family shared by every generation of this application.
const DEFAULT_STORE_PREFIX: &str = "school-schedule-";

/// Generation tag shipped with the current application build.
const DEFAULT_GENERATION: &str = "v1.0.2";

/// Origin the application is served from.
const DEFAULT_ORIGIN: &str = "http://localhost:8788";

/// Path pattern identifying API-class requests.
const DEFAULT_API_PATTERN: &str = r"/functions/api/events";

/// Maximum entries kept in the dynamic store.
/// 50 covers the events API plus a typical webfont set with headroom.
const DEFAULT_MAX_DYNAMIC_ENTRIES: usize = 50;

/// Tag carried by the connectivity signal that refreshes the events API.
const DEFAULT_SYNC_TAG: &str = "sync-events";

/// Network timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Origin of the application (`scheme://host[:port]`).
    pub origin: String,
    /// Prefix shared by every store this engine owns.
    pub store_prefix: String,
    /// Current generation tag.
    pub generation: String,
    /// Resources written into the shell store at install time.
    pub shell_urls: Vec<String>,
    /// Regex matched against the request path to select the API class.
    pub api_pattern: String,
    /// Regexes matched against the full URL to select the dynamic-asset class.
    pub dynamic_patterns: Vec<String>,
    /// Cross-origin URL prefixes that are still intercepted.
    pub allowed_prefixes: Vec<String>,
    pub max_dynamic_entries: usize,
    pub sync_tag: String,
    /// API resource refreshed when the sync signal fires.
    pub sync_endpoint: String,
    pub fetch_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            store_prefix: DEFAULT_STORE_PREFIX.to_string(),
            generation: DEFAULT_GENERATION.to_string(),
            shell_urls: [
                "/",
                "/index.html",
                "/translations.js",
                "/favicon.ico",
                "/apple-touch-icon.png",
                "https://cdn.tailwindcss.com",
                "https://fonts.googleapis.com/css2?family=Inter:wght@300;400;500;600&display=swap",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            api_pattern: DEFAULT_API_PATTERN.to_string(),
            dynamic_patterns: [r"fonts\.gstatic\.com", r"\.woff2$", r"\.woff$"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            allowed_prefixes: [
                "https://cdn.tailwindcss.com",
                "https://fonts.googleapis.com",
                "https://fonts.gstatic.com",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            max_dynamic_entries: DEFAULT_MAX_DYNAMIC_ENTRIES,
            sync_tag: DEFAULT_SYNC_TAG.to_string(),
            sync_endpoint: "/functions/api/events".to_string(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file, or defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
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

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.generation.trim().is_empty() {
            anyhow::bail!("generation tag must not be empty");
        }
        if self.store_prefix.is_empty() {
            anyhow::bail!("store_prefix must not be empty");
        }
        if self.fetch_timeout_secs == 0 {
            anyhow::bail!("fetch_timeout_secs must be at least 1");
        }
        reqwest::Url::parse(&self.origin)
            .with_context(|| format!("origin is not an absolute URL: {}", self.origin))?;
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_dynamic_entries, 50);
        assert_eq!(config.shell_urls.len(), 7);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let json = r#"{"generation": "v2.0.0", "max_dynamic_entries": 5}"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.generation, "v2.0.0");
        assert_eq!(config.max_dynamic_entries, 5);
        assert_eq!(config.store_prefix, "school-schedule-");
        assert_eq!(config.sync_tag, "sync-events");
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.generation, "v1.0.2");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = EngineConfig {
            generation: "v9".to_string(),
            ..EngineConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap().generation, "v9");
    }

    #[test]
    fn test_validate_rejects_relative_origin() {
        let config = EngineConfig {
            origin: "localhost".to_string(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = EngineConfig {
            fetch_timeout_secs: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        let json = r#"{"fetch_timeout_secs": 0}"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, json).unwrap();
        assert!(EngineConfig::load(&path).is_err());
    }
}
