//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the API base URL, the last username used to sign in, and where the
//! session token is kept.
//!
//! Configuration is stored at `~/.config/fittrack/config.json`. The
//! `FITTRACK_API_URL` environment variable overrides the stored URL.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::{FileTokenStore, KeyringTokenStore, TokenStore};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "fittrack";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Token file name, used with the file backend
const TOKEN_FILE: &str = "token.json";

/// Environment variable overriding the API base URL
pub const API_URL_ENV: &str = "FITTRACK_API_URL";

/// Base URL used when neither the environment nor the config file sets one
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Where the session token is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenBackend {
    /// OS keychain
    Keyring,
    /// JSON file in the config directory, readable by the owner only
    #[default]
    File,
}

impl TokenBackend {
    /// Open this backend's store, keeping any files under `config_dir`.
    pub fn open(self, config_dir: &Path) -> Arc<dyn TokenStore> {
        match self {
            TokenBackend::Keyring => Arc::new(KeyringTokenStore::new()),
            TokenBackend::File => Arc::new(FileTokenStore::new(config_dir.join(TOKEN_FILE))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_url: Option<String>,
    pub last_username: Option<String>,
    #[serde(default)]
    pub token_backend: TokenBackend,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME))
    }

    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Resolve the base URL: environment first, then the config file, then
    /// the default.
    pub fn api_url(&self) -> String {
        Self::resolve_api_url(std::env::var(API_URL_ENV).ok(), self.api_url.as_deref())
    }

    fn resolve_api_url(env: Option<String>, configured: Option<&str>) -> String {
        env.filter(|url| !url.trim().is_empty())
            .or_else(|| configured.map(str::to_string))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    /// Build the configured token store.
    pub fn token_store(&self) -> Result<Arc<dyn TokenStore>> {
        Ok(self.token_backend.open(&Self::config_dir()?))
    }
}
