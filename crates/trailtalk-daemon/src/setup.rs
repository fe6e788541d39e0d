//! Config loading and persistent peer identity.

use std::path::{Path, PathBuf};

use tracing::info;
use uuid::Uuid;

use trailtalk_types::PeerId;

use crate::config::Config;
use crate::error::DaemonError;

/// Load configuration from the given path, or the default location.
pub fn load_config(path: Option<&str>) -> Result<Config, DaemonError> {
    let config_path = match path {
        Some(p) => PathBuf::from(p),
        None => default_config_path(),
    };

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| DaemonError::Config(format!("failed to read config: {e}")))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| DaemonError::Config(format!("failed to parse config: {e}")))?;
        info!(path = %config_path.display(), "loaded config");
        Ok(config)
    } else {
        info!("no config file found, using defaults");
        Ok(Config::default())
    }
}

/// Load or create a persistent peer ID.
pub fn load_or_create_peer_id(config_dir: &Path) -> Result<PeerId, DaemonError> {
    let id_path = config_dir.join("peer-id");

    if id_path.exists() {
        let content = std::fs::read_to_string(&id_path)
            .map_err(|e| DaemonError::Config(format!("failed to read peer-id: {e}")))?;
        let uuid: Uuid = content
            .trim()
            .parse()
            .map_err(|e| DaemonError::Config(format!("invalid peer-id: {e}")))?;
        info!(id = %uuid, "loaded peer ID");
        Ok(PeerId::from_uuid(uuid))
    } else {
        std::fs::create_dir_all(config_dir)
            .map_err(|e| DaemonError::Config(format!("failed to create config dir: {e}")))?;

        let id = PeerId::new();
        std::fs::write(&id_path, id.as_uuid().to_string())
            .map_err(|e| DaemonError::Config(format!("failed to write peer-id: {e}")))?;

        info!(id = %id, "created new peer ID");
        Ok(id)
    }
}

/// Account ID carried in friend requests: the configured one, or the peer
/// ID when none is set.
pub fn effective_user_id(config: &Config, peer_id: PeerId) -> String {
    if config.identity.user_id.is_empty() {
        peer_id.to_string()
    } else {
        config.identity.user_id.clone()
    }
}

/// Get the default config directory path.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("trailtalk")
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}
