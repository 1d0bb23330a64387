//! Configuration management for sigil

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Keyserver used when no configuration file or `--url` override is present.
pub const DEFAULT_KEYSERVER_URL: &str = "https://keys.sigil-tools.io";

/// Environment variable consulted for the keystore auth token.
pub const AUTH_TOKEN_ENV: &str = "SIGIL_AUTH_TOKEN";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding local key pairs
    pub key_dir: PathBuf,

    /// Keyserver configuration
    pub keyserver: KeyserverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyserverConfig {
    /// Base URL of the keystore service
    pub url: String,

    /// Auth token for operations that require one (push)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            key_dir: Self::default_key_dir(),
            keyserver: KeyserverConfig {
                url: DEFAULT_KEYSERVER_URL.into(),
                auth_token: None,
            },
        }
    }
}

impl Config {
    /// Get the default keyring directory
    pub fn default_key_dir() -> PathBuf {
        dirs::data_dir()
            .map(|d| d.join("sigil").join("keys"))
            .unwrap_or_else(|| PathBuf::from(".sigil/keys"))
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("sigil").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Load configuration from file, or fall back to defaults.
    ///
    /// `url_override` (from `--url`) wins over both the file and the default.
    pub fn load_or_create(config_path: Option<&Path>, url_override: Option<&str>) -> Result<Self> {
        let config_path = config_path
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_config_path);

        let mut config = if config_path.exists() {
            info!("Loading configuration from {:?}", config_path);
            let content = fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        if let Some(url) = url_override {
            config.keyserver.url = url.to_string();
        }

        if config.keyserver.auth_token.is_none() {
            if let Ok(token) = std::env::var(AUTH_TOKEN_ENV) {
                if !token.is_empty() {
                    config.keyserver.auth_token = Some(token);
                }
            }
        }

        fs::create_dir_all(&config.key_dir)?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
