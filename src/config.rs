//! Configuration loading and management.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Client configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server to connect to.
    pub server: ServerConfig,
    /// Engine tuning.
    #[serde(default)]
    pub client: ClientConfig,
    /// Registration identity.
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Log output configuration.
    #[serde(default)]
    pub log: LogConfig,
}

/// Remote server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Hostname or IP address.
    pub hostname: String,
    /// Port. Defaults depend on `tls` and the transport, see
    /// [`ServerConfig::resolved_port`].
    pub port: Option<u16>,
    /// Whether to wrap the connection in TLS.
    #[serde(default)]
    pub tls: bool,
    /// Request path for WebSocket connections (e.g. "/webirc").
    pub path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            port: None,
            tls: false,
            path: None,
        }
    }
}

impl ServerConfig {
    /// Port to dial: the configured one, else 6697/6667 for sockets and
    /// 443/80 for WebSocket, TLS first.
    pub fn resolved_port(&self, websocket: bool) -> u16 {
        if let Some(port) = self.port {
            return port;
        }
        match (websocket, self.tls) {
            (true, true) => 443,
            (true, false) => 80,
            (false, true) => 6697,
            (false, false) => 6667,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Bytes requested per transport read.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Replace the socket transport with WebSocket.
    #[serde(default)]
    pub websocket: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            websocket: false,
        }
    }
}

fn default_buffer_size() -> usize {
    4096
}

/// Registration identity sent after connecting.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_nick")]
    pub nick: String,
    #[serde(default = "default_nick")]
    pub username: String,
    #[serde(default = "default_realname")]
    pub realname: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            nick: default_nick(),
            username: default_nick(),
            realname: default_realname(),
        }
    }
}

fn default_nick() -> String {
    "slircc".to_string()
}

fn default_realname() -> String {
    "Straylight IRC Client".to_string()
}

/// Log output configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.hostname.trim().is_empty() {
            return Err(ConfigError::Invalid("server.hostname is empty".into()));
        }
        if self.client.buffer_size == 0 {
            return Err(ConfigError::Invalid("client.buffer_size must be positive".into()));
        }
        if self.identity.nick.is_empty() || self.identity.nick.contains(' ') {
            return Err(ConfigError::Invalid(format!(
                "identity.nick {:?} is not a valid nickname",
                self.identity.nick
            )));
        }
        Ok(())
    }
}
