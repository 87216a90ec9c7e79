use std::path::{Path, PathBuf};

use regwatch::{DeliveryConfig, StoreConfig, StreamConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CliError, Result};

pub const BASE_URL_ENV: &str = "REGWATCH_BASE_URL";
pub const TOKEN_ENV: &str = "REGWATCH_TOKEN";

const APP_DIR: &str = "regwatch";

/// Application configuration, read from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Bearer token for the registry API.
    pub token: Option<String>,
    /// Colored terminal output.
    pub colored_output: bool,
    pub stream: StreamConfig,
    pub store: StoreConfig,
    pub delivery: DeliveryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            token: None,
            colored_output: true,
            stream: StreamConfig::default(),
            store: StoreConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path` (or the default location), then
    /// apply `.env` and environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Ok(env_file) = dotenvy::dotenv() {
            debug!(path = %env_file.display(), "Loaded .env file");
        }

        let path = path.map(Path::to_path_buf).or_else(default_config_path);
        let mut config = match &path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)?;
                let config: Self = toml::from_str(&content)?;
                debug!(path = %path.display(), "Loaded configuration");
                config
            }
            _ => Self::default(),
        };

        config.apply_overrides(
            std::env::var(BASE_URL_ENV).ok(),
            std::env::var(TOKEN_ENV).ok(),
        );
        if config.store.settings_path.is_none() {
            config.store.settings_path = default_settings_path();
        }
        Ok(config)
    }

    /// Environment values win over the file; empty values are ignored.
    pub fn apply_overrides(&mut self, base_url: Option<String>, token: Option<String>) {
        if let Some(base_url) = base_url.filter(|v| !v.trim().is_empty()) {
            self.stream.base_url = base_url;
        }
        if let Some(token) = token.filter(|v| !v.trim().is_empty()) {
            self.token = Some(token);
        }
    }

    /// The API token, or an error naming where to set it.
    pub fn require_token(&self, path: Option<&Path>) -> Result<&str> {
        self.token.as_deref().ok_or_else(|| {
            let location = path
                .map(Path::to_path_buf)
                .or_else(default_config_path)
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "config.toml".to_string());
            CliError::MissingToken(location)
        })
    }

    /// Write the default configuration to `path` (or the default location).
    pub fn reset(path: Option<&Path>) -> Result<PathBuf> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(default_config_path)
            .ok_or_else(|| CliError::InvalidInput("no configuration directory found".into()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&path, toml::to_string_pretty(&Self::default())?)?;
        Ok(path)
    }

    /// Effective configuration as TOML, with the token masked.
    pub fn show(&self) -> Result<String> {
        let mut shown = self.clone();
        if let Some(token) = shown.token.as_mut() {
            *token = mask(token);
        }
        Ok(toml::to_string_pretty(&shown)?)
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("settings.json"))
}

fn mask(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    if token.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("{visible}****")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sections() {
        let config: AppConfig = toml::from_str(
            r#"
            token = "abc"

            [stream]
            base_url = "https://registry.example.com/api"
            heartbeat_timeout_ms = 30000

            [delivery]
            history_limit = 20
            "#,
        )
        .unwrap();

        assert_eq!(config.token.as_deref(), Some("abc"));
        assert_eq!(config.stream.heartbeat_timeout_ms, 30_000);
        assert_eq!(config.stream.reconnect_max_delay_ms, 30_000);
        assert_eq!(config.delivery.history_limit, 20);
        assert!(config.delivery.load_history);
        assert_eq!(config.store.capacity, 100);
    }

    #[test]
    fn test_overrides() {
        let mut config = AppConfig::default();
        config.stream.base_url = "http://file".to_string();
        config.token = Some("file-token".to_string());

        config.apply_overrides(Some("  ".to_string()), Some("env-token".to_string()));
        assert_eq!(config.stream.base_url, "http://file");
        assert_eq!(config.token.as_deref(), Some("env-token"));

        config.apply_overrides(Some("http://env".to_string()), None);
        assert_eq!(config.stream.base_url, "http://env");
        assert_eq!(config.token.as_deref(), Some("env-token"));
    }

    #[test]
    fn test_show_masks_token() {
        let config = AppConfig {
            token: Some("eyJhbGciOiJIUzI1NiJ9".to_string()),
            ..Default::default()
        };
        let shown = config.show().unwrap();
        assert!(shown.contains("eyJh****"));
        assert!(!shown.contains("eyJhbGciOiJIUzI1NiJ9"));

        assert_eq!(mask("short"), "****");
    }

    #[test]
    fn test_reset_writes_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regwatch").join("config.toml");
        assert_eq!(AppConfig::reset(Some(&path)).unwrap(), path);

        let content = std::fs::read_to_string(&path).unwrap();
        let config: AppConfig = toml::from_str(&content).unwrap();
        assert!(config.colored_output);
        assert_eq!(config.stream.heartbeat_timeout_ms, 60_000);
    }

    #[test]
    fn test_missing_token_names_location() {
        let config = AppConfig::default();
        let err = config.require_token(Some(Path::new("/tmp/rw.toml"))).unwrap_err();
        assert!(err.to_string().contains("/tmp/rw.toml"));
    }
}
