//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/gatewatch/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/gatewatch/` (~/.config/gatewatch/)
//! - State/Logs: `$XDG_STATE_HOME/gatewatch/` (~/.local/state/gatewatch/)
//!
//! Nothing is persisted besides logs; the activity timeline lives in memory.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Agent gateway endpoints and polling cadence
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Graph projection settings
    #[serde(default)]
    pub graph: GraphConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the agent gateway lives and how to talk to it.
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Websocket URL streaming chat and agent frames
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Base HTTP URL used for the session snapshot poll
    #[serde(default = "default_http_url")]
    pub http_url: String,

    /// Path of the session listing endpoint, appended to `http_url`
    #[serde(default = "default_sessions_path")]
    pub sessions_path: String,

    /// Seconds between session snapshot polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Upper bound for the reconnect backoff
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_secs: u64,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            http_url: default_http_url(),
            sessions_path: default_sessions_path(),
            poll_interval_secs: default_poll_interval(),
            reconnect_max_secs: default_reconnect_max(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl GatewayConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.ws_url.trim().is_empty() {
            return Err(Error::Config("gateway.ws_url must not be empty".to_string()));
        }
        if self.http_url.trim().is_empty() {
            return Err(Error::Config(
                "gateway.http_url must not be empty".to_string(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(Error::Config(
                "gateway.poll_interval_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Full URL of the session listing endpoint.
    pub fn sessions_url(&self) -> String {
        let base = self.http_url.trim_end_matches('/');
        if self.sessions_path.starts_with('/') {
            format!("{}{}", base, self.sessions_path)
        } else {
            format!("{}/{}", base, self.sessions_path)
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_secs(self.reconnect_max_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_ws_url() -> String {
    "ws://127.0.0.1:18789".to_string()
}

fn default_http_url() -> String {
    "http://127.0.0.1:18789".to_string()
}

fn default_sessions_path() -> String {
    "/api/sessions".to_string()
}

fn default_poll_interval() -> u64 {
    10
}

fn default_reconnect_max() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    10
}

/// Graph projection settings
#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    /// Number of most recent actions shown when no session is selected
    #[serde(default = "default_recent_actions")]
    pub recent_actions: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            recent_actions: default_recent_actions(),
        }
    }
}

fn default_recent_actions() -> usize {
    50
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.gateway.validate()?;
        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/gatewatch/config.toml` (~/.config/gatewatch/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("gatewatch").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/gatewatch/` (~/.local/state/gatewatch/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("gatewatch")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("gatewatch.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gateway.poll_interval_secs, 10);
        assert_eq!(config.graph.recent_actions, 50);
        assert_eq!(config.logging.level, "info");
        assert!(config.gateway.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[gateway]
ws_url = "ws://gateway.local:9000/ws"
http_url = "http://gateway.local:9000/"
poll_interval_secs = 3

[graph]
recent_actions = 20

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.gateway.ws_url, "ws://gateway.local:9000/ws");
        assert_eq!(config.gateway.poll_interval_secs, 3);
        assert_eq!(config.gateway.reconnect_max_secs, 30);
        assert_eq!(config.graph.recent_actions, 20);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.gateway.sessions_url(),
            "http://gateway.local:9000/api/sessions"
        );
    }

    #[test]
    fn test_sessions_url_without_leading_slash() {
        let gateway = GatewayConfig {
            sessions_path: "sessions".to_string(),
            ..Default::default()
        };
        assert_eq!(gateway.sessions_url(), "http://127.0.0.1:18789/sessions");
    }

    #[test]
    fn test_gateway_validation() {
        let gateway = GatewayConfig {
            poll_interval_secs: 0,
            ..Default::default()
        };
        assert!(gateway.validate().is_err());

        let gateway = GatewayConfig {
            ws_url: "  ".to_string(),
            ..Default::default()
        };
        assert!(gateway.validate().is_err());
    }

    #[test]
    fn test_load_from_rejects_invalid_gateway() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[gateway]\npoll_interval_secs = 0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("poll_interval_secs"));
    }
}
