use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

pub const ENV_API_URL: &str = "ANALYSIS_API_URL";
pub const ENV_WS_URL: &str = "ANALYSIS_WS_URL";
pub const ENV_API_TOKEN: &str = "ANALYSIS_API_TOKEN";
pub const ENV_CONNECT_TIMEOUT: &str = "ANALYSIS_CONNECT_TIMEOUT_SECS";
pub const ENV_IDLE_TIMEOUT: &str = "ANALYSIS_IDLE_TIMEOUT_SECS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_base_url: String,
    /// Derived from `api_base_url` when unset
    pub ws_base_url: Option<String>,
    pub api_token: Option<String>,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub idle_timeout_secs: Option<u64>,
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ws_base_url: None,
            api_token: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            idle_timeout_secs: None,
            reconnect: ReconnectConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// A connection that lasts this long resets the attempt count
    pub stable_after_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            stable_after_ms: 30_000,
        }
    }
}

impl ClientConfig {
    /// Defaults, then the optional JSON file, then process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: ClientConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.normalize();
        Ok(config)
    }

    /// Override fields from environment-style lookups
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(url) = lookup(ENV_WS_URL) {
            self.ws_base_url = Some(url);
        }
        if let Some(token) = lookup(ENV_API_TOKEN) {
            self.api_token = Some(token);
        }
        if let Some(raw) = lookup(ENV_CONNECT_TIMEOUT) {
            self.connect_timeout_secs = parse_secs(ENV_CONNECT_TIMEOUT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_IDLE_TIMEOUT) {
            let secs = parse_secs(ENV_IDLE_TIMEOUT, &raw)?;
            self.idle_timeout_secs = (secs > 0).then_some(secs);
        }

        self.normalize();
        Ok(())
    }

    /// Configured WebSocket base, or the API base with `http(s)` swapped for `ws(s)`
    pub fn effective_ws_base_url(&self) -> Option<String> {
        if let Some(url) = &self.ws_base_url {
            return Some(url.clone());
        }

        let mut url = Url::parse(&self.api_base_url).ok()?;
        let scheme = match url.scheme() {
            "http" => "ws",
            "https" => "wss",
            "ws" | "wss" => return Some(self.api_base_url.clone()),
            _ => return None,
        };
        url.set_scheme(scheme).ok()?;
        Some(url.as_str().trim_end_matches('/').to_string())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    fn normalize(&mut self) {
        let api = normalize_url(&self.api_base_url);
        self.api_base_url = if api.is_empty() {
            DEFAULT_API_BASE_URL.to_string()
        } else {
            api
        };
        self.ws_base_url = normalize_optional(self.ws_base_url.take()).map(|u| normalize_url(&u));
        self.api_token = normalize_optional(self.api_token.take());
        if self.connect_timeout_secs == 0 {
            self.connect_timeout_secs = DEFAULT_CONNECT_TIMEOUT_SECS;
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = DEFAULT_REQUEST_TIMEOUT_SECS;
        }
        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            self.reconnect.max_delay_ms = self.reconnect.base_delay_ms;
        }
    }
}

fn normalize_url(input: &str) -> String {
    input.trim().trim_end_matches('/').to_string()
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_secs(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.effective_ws_base_url().as_deref(), Some("ws://localhost:8000"));
        assert_eq!(config.idle_timeout(), None);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.stable_after_ms, 30_000);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ClientConfig::default();
        config
            .apply_env(env(&[
                (ENV_API_URL, " https://api.example.com/ "),
                (ENV_API_TOKEN, "  "),
                (ENV_CONNECT_TIMEOUT, "3"),
                (ENV_IDLE_TIMEOUT, "30"),
            ]))
            .unwrap();

        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.api_token, None, "Blank token should be dropped");
        assert_eq!(config.connect_timeout(), Duration::from_secs(3));
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(
            config.effective_ws_base_url().as_deref(),
            Some("wss://api.example.com")
        );
    }

    #[test]
    fn test_explicit_ws_url_wins() {
        let mut config = ClientConfig::default();
        config
            .apply_env(env(&[(ENV_WS_URL, "wss://realtime.example.com/")]))
            .unwrap();
        assert_eq!(
            config.effective_ws_base_url().as_deref(),
            Some("wss://realtime.example.com")
        );
    }

    #[test]
    fn test_zero_idle_timeout_disables() {
        let mut config = ClientConfig::default();
        config.apply_env(env(&[(ENV_IDLE_TIMEOUT, "0")])).unwrap();
        assert_eq!(config.idle_timeout(), None);
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = ClientConfig::default();
        let err = config
            .apply_env(env(&[(ENV_CONNECT_TIMEOUT, "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"api_base_url":"https://detect.example.com/","reconnect":{{"max_attempts":2}}}}"#
        )
        .unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.api_base_url, "https://detect.example.com");
        assert_eq!(config.reconnect.max_attempts, 2);
        assert_eq!(config.reconnect.base_delay_ms, 500);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn test_from_file_errors() {
        let missing = ClientConfig::from_file(Path::new("/nonexistent/analysis.json"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            ClientConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_unsupported_scheme_has_no_ws_url() {
        let config = ClientConfig {
            api_base_url: "ftp://files.example.com".to_string(),
            ..ClientConfig::default()
        };
        assert_eq!(config.effective_ws_base_url(), None);
    }
}
