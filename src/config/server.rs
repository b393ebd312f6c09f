//! Server and expiry configuration types.

use std::time::Duration;

use serde::Deserialize;

/// Default TTL for pending calls.
pub const DEFAULT_TTL_MS: u64 = 30_000;
/// Default sweep interval.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1_000;

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host used by the health service when no endpoint is configured.
    pub host: String,
    /// Port used by the health service when no endpoint is configured.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8888,
        }
    }
}

impl ServerConfig {
    /// Get the socket address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Pending-call expiry configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExpiryConfig {
    /// Age after which an unanswered call is failed with a timeout.
    pub ttl_ms: u64,
    /// How often the sweeper scans correlation tables.
    pub sweep_interval_ms: u64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TTL_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
        }
    }
}

impl ExpiryConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}
