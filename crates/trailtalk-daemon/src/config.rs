//! Daemon configuration loaded from TOML.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DaemonError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

impl Config {
    /// Address the rendezvous listener binds to.
    pub fn bind_addr(&self) -> Result<SocketAddr, DaemonError> {
        format!("{}:{}", self.daemon.bind, self.daemon.port)
            .parse()
            .map_err(|e| DaemonError::Config(format!("invalid bind address: {e}")))
    }

    /// Timeout applied to outbound dial attempts.
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.daemon.dial_timeout_ms)
    }
}

/// Daemon network and runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_true")]
    pub discovery: bool,
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            discovery: true,
            dial_timeout_ms: default_dial_timeout_ms(),
            log_level: default_log_level(),
        }
    }
}

/// Local user identity carried in friend requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Account ID sent in friend requests. Defaults to the peer ID.
    #[serde(default)]
    pub user_id: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            user_id: String::new(),
        }
    }
}

/// A previously-bonded peer, always part of the directory on refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    pub id: Uuid,
    pub name: String,
    /// host:port, or bare host (the default port is assumed).
    pub address: String,
}

fn default_port() -> u16 {
    48100
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_true() -> bool {
    true
}

fn default_dial_timeout_ms() -> u64 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "trailtalk".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("port = 48100"));
    }

    #[test]
    fn parse_example_config() {
        let toml_str = r#"
[daemon]
port = 48100
bind = "0.0.0.0"
discovery = true
dial_timeout_ms = 5000
log_level = "info"

[identity]
name = "summit-phone"
user_id = "u42"

[[peers]]
id = "6f1c24b2-58a3-4b7e-9d35-0a4be61b8f01"
name = "ridge-tablet"
address = "192.168.1.42:48100"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.daemon.port, 48100);
        assert_eq!(config.identity.name, "summit-phone");
        assert_eq!(config.identity.user_id, "u42");
        assert_eq!(config.peers.len(), 1);
        assert_eq!(config.peers[0].name, "ridge-tablet");
    }

    #[test]
    fn bind_addr_combines_bind_and_port() {
        let mut config = Config::default();
        config.daemon.bind = "127.0.0.1".to_string();
        config.daemon.port = 4242;
        assert_eq!(config.bind_addr().unwrap(), "127.0.0.1:4242".parse().unwrap());
    }
}
