//! Application configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

const VALID_LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub default_server: Option<String>,
    pub servers: BTreeMap<String, ServerConfig>,
    pub daemon: DaemonConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Http,
    Unix,
}

/// Connection details for one named server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub transport: TransportKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfig {
    pub socket_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_addr: Option<String>,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotifyConfig {
    pub initial_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub subscriber_capacity: usize,
    pub topic_capacity: usize,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for (name, server) in &self.servers {
            server.validate().map_err(|e| match e {
                Error::Validation(msg) => Error::Validation(format!("Server '{}': {}", name, msg)),
                other => other,
            })?;
        }

        if let Some(ref name) = self.default_server {
            if !self.servers.contains_key(name) {
                return Err(Error::Validation(format!(
                    "Default server '{}' is not defined",
                    name
                )));
            }
        }

        self.daemon.validate()?;
        self.notify.validate()?;
        Ok(())
    }

    /// Look up a server by name, falling back to `default_server`
    pub fn server(&self, name: Option<&str>) -> Result<&ServerConfig> {
        let name = name
            .or(self.default_server.as_deref())
            .ok_or_else(|| Error::NotFound("No server named and no default server".to_string()))?;

        self.servers
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("Server '{}'", name)))
    }
}

impl Default for Config {
    fn default() -> Self {
        let daemon = DaemonConfig::default();
        let mut servers = BTreeMap::new();
        servers.insert("local".to_string(), ServerConfig::unix(&daemon.socket_path));

        Self {
            version: "1.0.0".to_string(),
            default_server: Some("local".to_string()),
            servers,
            daemon,
            notify: NotifyConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            transport: TransportKind::Http,
            url: Some(url.into()),
            socket_path: None,
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn unix(socket_path: impl Into<String>) -> Self {
        Self {
            transport: TransportKind::Unix,
            url: None,
            socket_path: Some(socket_path.into()),
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate server configuration
    pub fn validate(&self) -> Result<()> {
        match self.transport {
            TransportKind::Http => {
                let url = self
                    .url
                    .as_deref()
                    .ok_or_else(|| Error::Validation("HTTP server requires a url".to_string()))?;
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(Error::Validation(format!(
                        "Invalid url '{}'. Must start with http:// or https://",
                        url
                    )));
                }
            }
            TransportKind::Unix => match self.socket_path.as_deref() {
                Some(path) if !path.trim().is_empty() => {}
                _ => {
                    return Err(Error::Validation(
                        "Unix socket server requires a socket_path".to_string(),
                    ))
                }
            },
        }

        if self.username.is_some() != self.password.is_some() {
            return Err(Error::Validation(
                "Username and password must be set together".to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(Error::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl DaemonConfig {
    /// Validate daemon configuration
    pub fn validate(&self) -> Result<()> {
        if self.socket_path.trim().is_empty() {
            return Err(Error::Validation("Socket path cannot be empty".to_string()));
        }

        if let Some(ref addr) = self.http_addr {
            if addr.parse::<std::net::SocketAddr>().is_err() {
                return Err(Error::Validation(format!(
                    "Invalid HTTP listen address '{}'",
                    addr
                )));
            }
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(Error::Validation(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: "/tmp/chainrpcd.sock".to_string(),
            http_addr: None,
            log_level: "info".to_string(),
        }
    }
}

impl NotifyConfig {
    /// Validate notification configuration
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Validation(
                "Poll interval must be greater than 0".to_string(),
            ));
        }

        if self.subscriber_capacity == 0 {
            return Err(Error::Validation(
                "Subscriber capacity must be greater than 0".to_string(),
            ));
        }

        if self.topic_capacity == 0 {
            return Err(Error::Validation(
                "Topic capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 2_000,
            poll_interval_ms: 10_000,
            subscriber_capacity: 16,
            topic_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.version, "1.0.0");
        assert!(config.validate().is_ok());

        let server = config.server(None).unwrap();
        assert_eq!(server.transport, TransportKind::Unix);
        assert_eq!(server.socket_path.as_deref(), Some("/tmp/chainrpcd.sock"));
    }

    #[test]
    fn test_server_lookup() {
        let mut config = Config::default();
        config.servers.insert(
            "node".to_string(),
            ServerConfig::http("http://127.0.0.1:8332").with_credentials("user", "pass"),
        );

        assert_eq!(
            config.server(Some("node")).unwrap().transport,
            TransportKind::Http
        );
        assert!(matches!(
            config.server(Some("missing")),
            Err(Error::NotFound(_))
        ));

        config.default_server = None;
        assert!(config.server(None).is_err());
    }

    #[test]
    fn test_server_config_validation() {
        let node = ServerConfig::http("http://localhost:8332");
        assert!(node.validate().is_ok());
        assert!(ServerConfig::http("localhost:8332").validate().is_err());
        assert!(ServerConfig::unix("").validate().is_err());

        let mut config = ServerConfig::http("http://localhost:8332");
        config.username = Some("user".to_string());
        assert!(config.validate().is_err());

        config.password = Some("pass".to_string());
        config.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_server_must_exist() {
        let config = Config {
            default_server: Some("nope".to_string()),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_daemon_config_validation() {
        let mut config = DaemonConfig::default();
        assert!(config.validate().is_ok());

        config.http_addr = Some("127.0.0.1:18443".to_string());
        assert!(config.validate().is_ok());

        config.http_addr = Some("not-an-address".to_string());
        assert!(config.validate().is_err());

        config.http_addr = None;
        config.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_notify_config() {
        let config = NotifyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.initial_delay(), Duration::from_secs(2));
        assert_eq!(config.poll_interval(), Duration::from_secs(10));

        let invalid = NotifyConfig {
            subscriber_capacity: 0,
            ..NotifyConfig::default()
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"servers":{"node":{"transport":"http","url":"http://127.0.0.1:8332"}},"default_server":"node"}"#,
        )
        .unwrap();

        assert_eq!(config.daemon, DaemonConfig::default());
        assert_eq!(config.servers["node"].timeout_secs, 30);
        assert!(config.validate().is_ok());
    }
}
