//! Application configuration: defaults, optional JSON file, environment overrides.

use crate::constants::{INITIAL_WINDOW_HEIGHT, INITIAL_WINDOW_WIDTH};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "config.json";

pub const ENV_API_URL: &str = "WILDLIFE_API_URL";
pub const ENV_API_TOKEN: &str = "WILDLIFE_API_TOKEN";
pub const ENV_API_USER: &str = "WILDLIFE_API_USER";
pub const ENV_API_PASSWORD: &str = "WILDLIFE_API_PASSWORD";
pub const ENV_API_TIMEOUT: &str = "WILDLIFE_API_TIMEOUT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the annotation backend, without a trailing slash.
    pub api_base_url: String,
    /// Bearer token sent with every request.
    pub access_token: Option<String>,
    /// Credentials exchanged for a token when none is configured.
    pub username: Option<String>,
    pub password: Option<String>,
    pub request_timeout_secs: u64,
    pub window_width: f32,
    pub window_height: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000".to_string(),
            access_token: None,
            username: None,
            password: None,
            request_timeout_secs: 30,
            window_width: INITIAL_WINDOW_WIDTH,
            window_height: INITIAL_WINDOW_HEIGHT,
        }
    }
}

impl AppConfig {
    /// Loads the configuration from the platform config directory and the process environment.
    pub fn load() -> Self {
        let path = config_path();
        let contents = path.as_ref().and_then(|path| match fs::read_to_string(path) {
            Ok(contents) => {
                log::info!("Loaded configuration from {}", path.display());
                Some(contents)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                log::warn!("Could not read {}: {err}", path.display());
                None
            }
        });
        Self::from_sources(contents.as_deref(), |key| std::env::var(key).ok())
    }

    /// Layers file contents and environment lookups over the defaults.
    pub fn from_sources<F>(file_contents: Option<&str>, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match file_contents {
            Some(contents) => serde_json::from_str(contents).unwrap_or_else(|err| {
                log::warn!("Ignoring unparseable configuration file: {err}");
                Self::default()
            }),
            None => Self::default(),
        };

        if let Some(url) = env(ENV_API_URL) {
            config.api_base_url = url;
        }
        if let Some(token) = env(ENV_API_TOKEN) {
            config.access_token = Some(token);
        }
        if let Some(user) = env(ENV_API_USER) {
            config.username = Some(user);
        }
        if let Some(password) = env(ENV_API_PASSWORD) {
            config.password = Some(password);
        }
        if let Some(timeout) = env(ENV_API_TIMEOUT).and_then(|t| t.parse().ok()) {
            config.request_timeout_secs = timeout;
        }

        config.api_base_url = config.api_base_url.trim_end_matches('/').to_string();
        config
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Credentials usable for a token exchange, when both halves are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(password)) if !user.is_empty() => {
                Some((user.as_str(), password.as_str()))
            }
            _ => None,
        }
    }
}

/// Location of the configuration file, if the platform has a config directory.
pub fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "wildlife", "WildlifeAnnotator")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_sources() {
        let config = AppConfig::from_sources(None, env_from(&[]));
        assert_eq!(config, AppConfig::default());
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_file_then_env_precedence() {
        let file = r#"{ "api_base_url": "http://files:9000/", "request_timeout_secs": 5 }"#;
        let config = AppConfig::from_sources(
            Some(file),
            env_from(&[(ENV_API_TOKEN, "abc"), (ENV_API_TIMEOUT, "12")]),
        );
        assert_eq!(config.api_base_url, "http://files:9000");
        assert_eq!(config.access_token.as_deref(), Some("abc"));
        assert_eq!(config.request_timeout(), Duration::from_secs(12));

        let config = AppConfig::from_sources(Some(file), env_from(&[(ENV_API_URL, "http://env")]));
        assert_eq!(config.api_base_url, "http://env");
        assert_eq!(config.request_timeout_secs, 5);
    }

    #[test]
    fn test_unparseable_file_falls_back_to_defaults() {
        let config = AppConfig::from_sources(Some("not json"), env_from(&[]));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_credentials_need_both_halves() {
        let config = AppConfig::from_sources(None, env_from(&[(ENV_API_USER, "ranger")]));
        assert!(config.credentials().is_none());
        let config = AppConfig::from_sources(
            None,
            env_from(&[(ENV_API_USER, "ranger"), (ENV_API_PASSWORD, "secret")]),
        );
        assert_eq!(config.credentials(), Some(("ranger", "secret")));
    }
}
