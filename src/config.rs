//! Server configuration
//!
//! Defaults suit local development. `from_env` overlays `SOCKET_*`
//! environment variables; the binary may further override the listen
//! address from its first argument.

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Default host to bind
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port to bind
pub const DEFAULT_PORT: u16 = 8080;

/// Default WebSocket upgrade path
pub const DEFAULT_PATH: &str = "/echo";

/// Default dispatch queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default per-connection outbound buffer
pub const DEFAULT_OUTBOUND_BUFFER: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Request path accepted for the WebSocket upgrade
    pub path: String,
    /// Envelopes buffered ahead of the dispatcher before read loops wait
    pub queue_capacity: usize,
    /// Frames buffered per connection before new ones are dropped
    pub outbound_buffer: usize,
    /// Full listen address, takes precedence over `host`/`port`
    pub addr: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            path: DEFAULT_PATH.to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            addr: None,
        }
    }
}

impl ServerConfig {
    /// Build from defaults overlaid with `SOCKET_*` environment variables
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (used by `from_env` and tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("SOCKET_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("SOCKET_PORT") {
            config.port = parse_var("SOCKET_PORT", &port)?;
        }
        if let Some(path) = lookup("SOCKET_PATH") {
            config.path = path;
        }
        if let Some(capacity) = lookup("SOCKET_QUEUE_CAPACITY") {
            config.queue_capacity = parse_var("SOCKET_QUEUE_CAPACITY", &capacity)?;
        }
        if let Some(buffer) = lookup("SOCKET_OUTBOUND_BUFFER") {
            config.outbound_buffer = parse_var("SOCKET_OUTBOUND_BUFFER", &buffer)?;
        }
        if let Some(addr) = lookup("SOCKET_ADDR") {
            config.addr = Some(addr);
        }

        config.validate()?;
        Ok(config)
    }

    /// Override the listen address
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = Some(addr.into());
        self
    }

    /// Listen address
    pub fn addr(&self) -> String {
        match &self.addr {
            Some(addr) => addr.clone(),
            None => format!("{}:{}", self.host, self.port),
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.queue_capacity == 0 {
            return Err(AppError::Config("queue_capacity must be at least 1".into()));
        }
        if self.outbound_buffer == 0 {
            return Err(AppError::Config("outbound_buffer must be at least 1".into()));
        }
        if !self.path.starts_with('/') {
            return Err(AppError::Config(format!(
                "path must start with '/': {}",
                self.path
            )));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T, AppError> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::Config(format!("invalid value for {}: {:?}", key, value)))
}
