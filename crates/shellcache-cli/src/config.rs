//! Host-side configuration paths.
//!
//! The engine configuration is read from `SHELLCACHE_CONFIG` if set, else
//! `~/.config/shellcache/config.json`. Stores live under
//! `SHELLCACHE_STORE_DIR` if set, else `~/.cache/shellcache/stores`.

use std::path::PathBuf;

use anyhow::Result;
use shellcache_core::EngineConfig;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "shellcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Store directory name inside the cache directory
const STORE_DIR: &str = "stores";

pub fn config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SHELLCACHE_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
    Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
}

pub fn store_dir() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SHELLCACHE_STORE_DIR") {
        return Ok(PathBuf::from(path));
    }
    let cache_dir = dirs::cache_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
    Ok(cache_dir.join(APP_NAME).join(STORE_DIR))
}

pub fn load() -> Result<EngineConfig> {
    EngineConfig::load(&config_path()?)
}
