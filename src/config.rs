//! Server configuration and persisted client settings

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Lowest port a server may listen on (0 still means "any free port")
pub const MIN_PORT: u16 = 1024;

pub const DEFAULT_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 7777;

/// Longest accepted frame, newline excluded
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024;

/// Frames queued per session before it is considered stalled
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Per-connection limits, shared by server sessions and the client
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    /// Outbound frames buffered per session
    pub outbound_capacity: usize,
    /// Upper bound for writing one frame to a peer
    pub write_timeout: Duration,
    pub max_frame_length: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

/// Room server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub session: SessionLimits,
    /// How often the drain checks for an empty roster
    pub drain_poll_interval: Duration,
    /// Pause after a failed accept
    pub accept_retry_delay: Duration,
    /// Give up waiting for members after this long; `None` waits forever
    pub drain_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            session: SessionLimits::default(),
            drain_poll_interval: DRAIN_POLL_INTERVAL,
            accept_retry_delay: ACCEPT_RETRY_DELAY,
            drain_timeout: None,
        }
    }
}

/// Resolve the listen address for `address:port`
///
/// `localhost` maps to `127.0.0.1`; port 0 asks the OS for a free port.
pub fn listen_addr(address: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    if port != 0 && port < MIN_PORT {
        return Err(ConfigError::InvalidPort(port.to_string()));
    }
    let address = address.trim();
    let ip = if address.eq_ignore_ascii_case("localhost") {
        IpAddr::from([127, 0, 0, 1])
    } else {
        address
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::InvalidAddress(address.to_string()))?
    };
    Ok(SocketAddr::new(ip, port))
}

/// Parse a port given as text
pub fn parse_port(port: &str) -> Result<u16, ConfigError> {
    port.trim()
        .parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| ConfigError::InvalidPort(port.to_string()))
}

/// Persisted client settings
///
/// The three values a client needs to start a session, stored as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    pub server: String,
    pub port: String,
    pub name: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT.to_string(),
            name: String::new(),
        }
    }
}

impl ClientSettings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Load settings, falling back to defaults when the file does not exist yet
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject empty values and unparseable ports
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.trim().is_empty() {
            return Err(ConfigError::MissingField("server"));
        }
        if self.port.trim().is_empty() {
            return Err(ConfigError::MissingField("port"));
        }
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField("name"));
        }
        parse_port(&self.port)?;
        Ok(())
    }

    pub fn port(&self) -> Result<u16, ConfigError> {
        parse_port(&self.port)
    }
}
