//! # Configuration
//!
//! Per-request timeouts, socket client limits, and server settings read
//! from the environment.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use polywire::DEFAULT_MAX_FRAME_LEN;

use crate::error::ConfigError;
use crate::protocol::Protocol;

/// Connect and read bounds for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Options {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Options {
    pub const fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self { connect_timeout, read_timeout }
    }

    /// Whether these are the library defaults, in which case per-service
    /// settings from discovery take precedence.
    pub fn is_default(&self) -> bool {
        *self == Options::default()
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(60))
    }
}

/// Settings of the socket client transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketClientConfig {
    /// Timeouts used for socket targets unless the caller supplies others.
    pub options: Options,
    pub max_frame_len: usize,
}

impl Default for SocketClientConfig {
    fn default() -> Self {
        Self {
            options: Options::new(Duration::from_millis(5000), Duration::from_millis(5000)),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// What the socket server does with a connection when every worker is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverflowPolicy {
    /// Stop accepting until a worker frees up.
    Block,
    /// Answer with a `ServerBusy` fault and close.
    Reject,
}

impl FromStr for OverflowPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "block" => Ok(OverflowPolicy::Block),
            "reject" => Ok(OverflowPolicy::Reject),
            _ => Err(ConfigError::Invalid { key: "overflow policy".into(), value: s.to_string() }),
        }
    }
}

/// Instance metadata key advertising a protocol's port, e.g. `socket-port`.
pub fn port_metadata_key(protocol: Protocol) -> String {
    format!("{}-port", protocol.name())
}

/// Settings of the server side listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub socket_port: u16,
    /// Maximum connections served concurrently.
    pub max_workers: usize,
    pub overflow: OverflowPolicy,
    /// Bound on reading one request envelope.
    pub read_timeout: Duration,
    pub max_frame_len: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            socket_port: Protocol::Socket.default_port(),
            max_workers: 64,
            overflow: OverflowPolicy::Block,
            read_timeout: Duration::from_secs(30),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

fn parse_setting<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key: key.to_string(), value: raw }),
        None => Ok(default),
    }
}

impl ServerSettings {
    /// Reads settings from environment variables with defaults.
    ///
    /// Environment variables:
    /// - `POLYRPC_SOCKET_PORT`: socket listener port (default: 12345)
    /// - `POLYRPC_MAX_WORKERS`: concurrent connection workers (default: 64)
    /// - `POLYRPC_OVERFLOW`: `block` or `reject` when workers are busy (default: block)
    /// - `POLYRPC_READ_TIMEOUT_MS`: request read timeout in ms (default: 30000)
    /// - `POLYRPC_MAX_FRAME_LEN`: largest accepted envelope in bytes (default: 16 MiB)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading from an arbitrary lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let default = Self::default();
        let read_timeout_ms = parse_setting(
            &lookup,
            "POLYRPC_READ_TIMEOUT_MS",
            default.read_timeout.as_millis() as u64,
        )?;

        let settings = Self {
            socket_port: parse_setting(&lookup, "POLYRPC_SOCKET_PORT", default.socket_port)?,
            max_workers: parse_setting(&lookup, "POLYRPC_MAX_WORKERS", default.max_workers)?,
            overflow: parse_setting(&lookup, "POLYRPC_OVERFLOW", default.overflow)?,
            read_timeout: Duration::from_millis(read_timeout_ms),
            max_frame_len: parse_setting(&lookup, "POLYRPC_MAX_FRAME_LEN", default.max_frame_len)?,
        };
        if settings.max_workers == 0 {
            return Err(ConfigError::Invalid { key: "POLYRPC_MAX_WORKERS".into(), value: "0".into() });
        }
        Ok(settings)
    }

    /// Applies the `socket-port` entry this instance advertises to discovery.
    pub fn with_instance_metadata(mut self, metadata: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let key = port_metadata_key(Protocol::Socket);
        if let Some(raw) = metadata.get(&key) {
            self.socket_port = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value: raw.clone() })?;
        }
        Ok(self)
    }
}
