//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables. Every field
//! is validated at startup; an invalid configuration never reaches runtime.

mod endpoint;
mod server;
mod url;

pub use endpoint::{
    EndpointConfig, SinkConfig, DEFAULT_APP_NAME, DEFAULT_CORRELATION_FIELD,
    ENDPOINT_ID_SEPARATOR,
};
pub use server::{ExpiryConfig, ServerConfig, DEFAULT_SWEEP_INTERVAL_MS, DEFAULT_TTL_MS};
pub use url::{ServiceUrl, GRPC_SCHEME};

use std::collections::HashSet;

use serde::Deserialize;

use crate::pipeline::PipelineConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "eventgate.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "EVENTGATE_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "EVENTGATE";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "EVENTGATE_LOG";

/// Startup configuration errors. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unsupported scheme '{scheme}' in '{url}', the url must begin with \"grpc\"")]
    UnsupportedScheme { url: String, scheme: String },

    #[error("Missing mandatory field '{field}'")]
    MissingField { field: String },

    #[error("Duplicate endpoint id '{0}'")]
    DuplicateEndpoint(String),

    #[error("Stream '{stream}' is served twice on {address}")]
    DuplicateStream { address: String, stream: String },

    #[error("Sink '{url}' has no source.id; it is mandatory for receiving responses")]
    MissingSourceId { url: String },

    #[error("Sink '{url}' references unknown source.id '{source_id}'")]
    UnknownSource { url: String, source_id: String },

    #[error("'{field}' must be greater than zero")]
    InvalidDuration { field: String },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Pending-call expiry.
    pub expiry: ExpiryConfig,
    /// Processing pipeline.
    pub pipeline: PipelineConfig,
    /// Inbound endpoints.
    pub endpoints: Vec<EndpointConfig>,
    /// Response sinks.
    pub sinks: Vec<SinkConfig>,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `eventgate.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Parse configuration from an in-memory YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, File, FileFormat};

        let config = ConfigLib::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Validate everything that must hold before any endpoint starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.expiry.ttl_ms == 0 {
            return Err(ConfigError::InvalidDuration {
                field: "expiry.ttl_ms".to_string(),
            });
        }
        if self.expiry.sweep_interval_ms == 0 {
            return Err(ConfigError::InvalidDuration {
                field: "expiry.sweep_interval_ms".to_string(),
            });
        }

        let mut ids = HashSet::new();
        let mut routes = HashSet::new();
        for endpoint in &self.endpoints {
            let url = ServiceUrl::parse(&endpoint.url)?;
            if endpoint.stream.is_empty() {
                return Err(ConfigError::MissingField {
                    field: format!("stream ({})", endpoint.url),
                });
            }
            if endpoint.correlation_field.is_empty() {
                return Err(ConfigError::MissingField {
                    field: format!("correlation_field ({})", endpoint.url),
                });
            }
            if endpoint.ttl_ms == Some(0) {
                return Err(ConfigError::InvalidDuration {
                    field: format!("endpoints[{}].ttl_ms", endpoint.endpoint_id()),
                });
            }

            let id = endpoint.endpoint_id();
            if !ids.insert(id.clone()) {
                return Err(ConfigError::DuplicateEndpoint(id));
            }
            if !routes.insert((url.address(), endpoint.stream.clone())) {
                return Err(ConfigError::DuplicateStream {
                    address: url.address(),
                    stream: endpoint.stream.clone(),
                });
            }
        }

        for sink in &self.sinks {
            let source_id = sink.validated_source_id()?;
            if !ids.contains(source_id) {
                return Err(ConfigError::UnknownSource {
                    url: sink.url.clone(),
                    source_id: source_id.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}
