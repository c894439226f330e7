//! Configuration module
//!
//! Settings are read from a TOML file. Every section and field has a
//! default, so an empty file (or no file at all) yields a working gateway.
//!
//! ```toml
//! [server]
//! ws_port = 9000
//!
//! [forwarding]
//! enabled = true
//! default_peer_url = "ws://upstream.example:9000/ocpp"
//!
//! [forwarding.chargers.CP001]
//! forwarded_calls = ["RemoteStopTransaction", "Reset"]
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::handlers::consumption::DEFAULT_POLL_INTERVAL_SECS;
use crate::application::handlers::DEFAULT_HEARTBEAT_INTERVAL_SECS;
use crate::application::session::ForwardingMeta;
use crate::application::commands::DEFAULT_COMMAND_TIMEOUT_SECS;
use crate::domain::ForwardingPolicy;

const CONFIG_DIR_NAME: &str = "ocpp-gateway";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Default config location: `~/.config/ocpp-gateway/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub consumption: ConsumptionConfig,
    #[serde(default)]
    pub forwarding: ForwardingConfig,
    #[serde(default)]
    pub authorization: AuthorizationConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AppConfig {
    /// Read and validate the TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.ws_port == 0 {
            return Err(ConfigError::Invalid("server.ws_port must not be 0".into()));
        }
        if self.commands.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "commands.timeout_secs must be positive".into(),
            ));
        }
        let poll = self.consumption.poll_interval_secs;
        if poll != 0 && poll < self.commands.timeout_secs {
            return Err(ConfigError::Invalid(format!(
                "consumption.poll_interval_secs ({}) must not be shorter than commands.timeout_secs ({})",
                poll, self.commands.timeout_secs
            )));
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Invalid("database.url is required".into()));
        }
        Ok(())
    }

    pub fn ws_address(&self) -> String {
        format!("{}:{}", self.server.ws_host, self.server.ws_port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_ws_host")]
    pub ws_host: String,
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,
    /// Interval returned in BootNotification responses (seconds)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u32,
    /// Grace period for connections to tear down (seconds)
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_host: default_ws_host(),
            ws_port: default_ws_port(),
            heartbeat_interval: default_heartbeat_interval(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

impl DatabaseSettings {
    pub fn connection_url(&self) -> String {
        self.url.trim().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `"json"` or `"pretty"`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    #[serde(default = "default_command_timeout")]
    pub timeout_secs: u64,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_command_timeout(),
        }
    }
}

impl CommandsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumptionConfig {
    /// Meter-value poll period in seconds; 0 disables polling
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for ConsumptionConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl ConsumptionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Per-charger relay settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChargerForwarding {
    /// Overrides `forwarding.default_peer_url` for this charger
    #[serde(default)]
    pub peer_url: Option<String>,
    #[serde(default)]
    pub forwarded_messages: Vec<String>,
    #[serde(default)]
    pub forwarded_calls: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForwardingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub default_peer_url: Option<String>,
    #[serde(default)]
    pub chargers: HashMap<String, ChargerForwarding>,
}

impl ForwardingConfig {
    /// Relay settings for `charge_point_id`, or `None` when it is not
    /// forwarded.
    pub fn resolve(&self, charge_point_id: &str) -> Option<ForwardingMeta> {
        if !self.enabled {
            return None;
        }
        let charger = self.chargers.get(charge_point_id);
        let peer_url = charger
            .and_then(|c| c.peer_url.as_deref())
            .or(self.default_peer_url.as_deref())
            .map(str::trim)
            .filter(|url| !url.is_empty())?;
        let policy = charger
            .map(|c| ForwardingPolicy {
                forwarded_messages: c.forwarded_messages.clone(),
                forwarded_calls: c.forwarded_calls.clone(),
            })
            .unwrap_or_default();
        Some(ForwardingMeta::new(peer_url, policy))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizationConfig {
    /// Tags answered with `Accepted`; compared after normalization
    #[serde(default)]
    pub accepted_tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

fn default_ws_host() -> String {
    "0.0.0.0".to_string()
}

fn default_ws_port() -> u16 {
    9000
}

fn default_heartbeat_interval() -> u32 {
    DEFAULT_HEARTBEAT_INTERVAL_SECS
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_database_url() -> String {
    "sqlite://./ocpp-gateway.db?mode=rwc".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_command_timeout() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_metrics_listen() -> String {
    "0.0.0.0:9100".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.ws_address(), "0.0.0.0:9000");
        assert_eq!(config.server.heartbeat_interval, 300);
        assert_eq!(config.commands.timeout(), Duration::from_secs(30));
        assert_eq!(config.consumption.poll_interval(), Duration::from_secs(60));
        assert!(!config.forwarding.enabled);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn parses_sections() {
        let config = AppConfig::from_toml_str(
            r#"
            [server]
            ws_port = 9100

            [logging]
            level = "debug"
            format = "json"

            [authorization]
            accepted_tags = ["AB12CD34"]

            [forwarding]
            enabled = true
            default_peer_url = "ws://peer:9000/ocpp"

            [forwarding.chargers.CP002]
            peer_url = "ws://other:9000"
            forwarded_calls = ["Reset"]
            "#,
        )
        .unwrap();
        assert_eq!(config.server.ws_port, 9100);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.authorization.accepted_tags, vec!["AB12CD34"]);
        assert_eq!(
            config.forwarding.chargers["CP002"].forwarded_calls,
            vec!["Reset"]
        );
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            AppConfig::from_toml_str("[commands]\ntimeout_secs = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AppConfig::from_toml_str(
                "[commands]\ntimeout_secs = 30\n[consumption]\npoll_interval_secs = 10"
            ),
            Err(ConfigError::Invalid(_))
        ));
        assert!(AppConfig::from_toml_str(
            "[commands]\ntimeout_secs = 30\n[consumption]\npoll_interval_secs = 0"
        )
        .is_ok());
        assert!(matches!(
            AppConfig::from_toml_str("[server]\nws_port = \"x\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn forwarding_resolution() {
        let mut forwarding = ForwardingConfig {
            enabled: true,
            default_peer_url: Some("ws://peer/ocpp".into()),
            chargers: HashMap::new(),
        };
        forwarding.chargers.insert(
            "CP002".into(),
            ChargerForwarding {
                peer_url: Some("ws://other".into()),
                forwarded_messages: vec![],
                forwarded_calls: vec!["Reset".into()],
            },
        );

        let default = forwarding.resolve("CP001").unwrap();
        assert_eq!(default.peer_url, "ws://peer/ocpp");
        assert_eq!(default.policy, ForwardingPolicy::default());

        let custom = forwarding.resolve("CP002").unwrap();
        assert_eq!(custom.peer_url, "ws://other");
        assert_eq!(custom.policy.forwarded_calls, vec!["Reset"]);

        forwarding.enabled = false;
        assert!(forwarding.resolve("CP001").is_none());
    }

    #[test]
    fn charger_without_any_peer_is_not_forwarded() {
        let mut forwarding = ForwardingConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(forwarding.resolve("CP001").is_none());
        forwarding.default_peer_url = Some("   ".into());
        assert!(forwarding.resolve("CP001").is_none());
    }
}
