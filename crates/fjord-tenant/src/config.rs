//! Auth configuration
//!
//! Deserialized from the `server` section of the service config file.
//! Resolution chain: explicit path, then `FJORD_CONFIG_FILE`, then
//! `~/.fjord/fjord.conf`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

const CONFIG_ENV: &str = "FJORD_CONFIG_FILE";
const DEFAULT_CONFIG_DIR: &str = ".fjord";
const DEFAULT_CONFIG_FILE: &str = "fjord.conf";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file missing from every resolution location
    #[error("config file not found; create ~/{DEFAULT_CONFIG_DIR}/{DEFAULT_CONFIG_FILE} or set {CONFIG_ENV}")]
    NotFound,
    /// Config file unreadable or unparsable
    #[error("invalid config: {0}")]
    Invalid(String),
    /// No root credential while binding a non-loopback address
    #[error(
        "root_api_key is not configured and host '{host}' is non-localhost; \
         this would expose an unauthenticated root endpoint to the network"
    )]
    UnsafeBind {
        /// The offending bind host
        host: String,
    },
}

/// Access-layer settings from the `server` config section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Statically configured root credential; `None` disables authentication
    /// (development mode, localhost only)
    #[serde(default)]
    pub root_api_key: Option<String>,
    /// Agent id assumed when a request names none
    #[serde(default)]
    pub default_agent_id: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4912
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            root_api_key: None,
            default_agent_id: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    server: Option<AuthConfig>,
}

impl AuthConfig {
    /// Load from the resolution chain
    pub fn load(explicit_path: Option<&str>) -> Result<Self, ConfigError> {
        let path = resolve_config_path(explicit_path).ok_or(ConfigError::NotFound)?;
        Self::from_file(&path)
    }

    /// Load from a specific file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Invalid(format!("failed to read {}: {e}", path.display())))?;
        Self::from_json(&content)
    }

    /// Parse the config document; a missing `server` section means defaults
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = serde_json::from_str(content)
            .map_err(|e| ConfigError::Invalid(format!("failed to parse config: {e}")))?;
        Ok(file.server.unwrap_or_default())
    }

    /// Validate for safe startup
    ///
    /// No root credential means authentication is disabled, which is only
    /// acceptable on a loopback bind. Anything else refuses to start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root_api_key.is_some() {
            return Ok(());
        }
        if !is_localhost(&self.host) {
            return Err(ConfigError::UnsafeBind { host: self.host.clone() });
        }
        tracing::warn!("root_api_key not configured, authentication disabled (dev mode)");
        Ok(())
    }
}

fn is_localhost(host: &str) -> bool {
    matches!(host, "127.0.0.1" | "localhost" | "::1")
}

fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }
    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        let p = PathBuf::from(env_path);
        if p.exists() {
            return Some(p);
        }
    }
    let home = std::env::var_os("HOME")?;
    let p = PathBuf::from(home).join(DEFAULT_CONFIG_DIR).join(DEFAULT_CONFIG_FILE);
    p.exists().then_some(p)
}
