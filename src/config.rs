use serde::{Deserialize, Serialize};
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;

use crate::errors::ServerError;

pub const DEFAULT_PORT: u16 = 9000;

/// Connections that send nothing for this long are closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Overrides the default pool width when set to a positive integer.
pub const WORKER_THREADS_ENV: &str = "GRIDCALC_WORKER_THREADS";

/// Pool width used by [`ServerConfig::default`]: [`WORKER_THREADS_ENV`] if it parses,
/// else the available parallelism.
pub fn default_worker_threads() -> usize {
    env::var(WORKER_THREADS_ENV)
        .ok()
        .and_then(|raw| parse_worker_threads(&raw))
        .or_else(|| thread::available_parallelism().ok())
        .map_or(1, NonZeroUsize::get)
}

fn parse_worker_threads(raw: &str) -> Option<NonZeroUsize> {
    raw.trim().parse().ok()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    bind_address: IpAddr,
    port: u16,
    idle_timeout: Duration,
    worker_threads: usize,
    max_line_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            worker_threads: default_worker_threads(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_bind_address(mut self, address: IpAddr) -> Self {
        self.bind_address = address;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    pub fn with_max_line_length(mut self, length: usize) -> Self {
        self.max_line_length = length;
        self
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.worker_threads == 0 {
            return Err(ServerError::ConfigError(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        if self.idle_timeout.is_zero() {
            return Err(ServerError::ConfigError(
                "idle_timeout must be greater than zero".to_string(),
            ));
        }
        if self.max_line_length == 0 {
            return Err(ServerError::ConfigError(
                "max_line_length must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
