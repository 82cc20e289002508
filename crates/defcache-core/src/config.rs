//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the content origin, where the definition store lives, the table catalog
//! and a few display settings.
//!
//! Configuration is stored at `~/.config/defcache/config.json`. Every field
//! is optional in the file; missing fields take their defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::client::{DEFAULT_ORIGIN, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::catalog::Catalog;
use crate::grid::DEFAULT_COLUMN_WIDTH;
use crate::index::BoundaryRule;
use crate::populate::MAX_CONCURRENT_FETCHES;
use crate::store::default_path;

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "defcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the content origin
pub const ORIGIN_ENV: &str = "DEFCACHE_ORIGIN";

/// Environment variable overriding the database path
pub const DB_ENV: &str = "DEFCACHE_DB";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub origin: String,
    pub database_path: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub column_width: u16,
    pub concurrency: usize,
    pub boundary_rule: BoundaryRule,
    /// Replaces the built-in table list when set
    pub catalog: Option<Catalog>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            database_path: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            column_width: DEFAULT_COLUMN_WIDTH,
            concurrency: MAX_CONCURRENT_FETCHES,
            boundary_rule: BoundaryRule::default(),
            catalog: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Where the definition store lives
    pub fn database_path(&self) -> Result<PathBuf> {
        match self.database_path {
            Some(ref path) => Ok(path.clone()),
            None => Ok(default_path(&Self::cache_dir()?)),
        }
    }

    /// Tables to populate, in display order
    pub fn catalog(&self) -> Catalog {
        self.catalog.clone().unwrap_or_default()
    }

    /// Apply `DEFCACHE_ORIGIN` / `DEFCACHE_DB` from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(origin) = lookup(ORIGIN_ENV).filter(|v| !v.is_empty()) {
            self.origin = origin;
        }
        if let Some(db) = lookup(DB_ENV).filter(|v| !v.is_empty()) {
            self.database_path = Some(PathBuf::from(db));
        }
    }
}
