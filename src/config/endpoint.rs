//! Inbound endpoint and response sink configuration.

use serde::Deserialize;

use super::{ConfigError, ServiceUrl};
use crate::codec::CodecType;

/// Default application name used to derive endpoint ids.
pub const DEFAULT_APP_NAME: &str = "eventgate";
/// Default metadata key carrying the correlation id.
pub const DEFAULT_CORRELATION_FIELD: &str = "message.id";
/// Separator between app and stream in derived endpoint ids.
pub const ENDPOINT_ID_SEPARATOR: &str = "::";

fn default_app() -> String {
    DEFAULT_APP_NAME.to_string()
}

fn default_correlation_field() -> String {
    DEFAULT_CORRELATION_FIELD.to_string()
}

/// Inbound endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// `grpc://host:port/service/method[/sequence]`.
    pub url: String,
    /// Explicit endpoint id. Defaults to `<app>::<stream>`.
    #[serde(default)]
    pub id: Option<String>,
    /// Application name used when deriving the id.
    #[serde(default = "default_app")]
    pub app: String,
    /// Stream name messages are routed to via the `stream.id` header.
    pub stream: String,
    /// Payload codec.
    #[serde(default)]
    pub codec: CodecType,
    /// Metadata key holding the correlation id.
    #[serde(default = "default_correlation_field")]
    pub correlation_field: String,
    /// Metadata keys every message must carry.
    #[serde(default)]
    pub required_fields: Vec<String>,
    /// Per-endpoint TTL override in milliseconds.
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

impl EndpointConfig {
    /// Minimal config for a URL and stream, everything else defaulted.
    pub fn new(url: impl Into<String>, stream: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            id: None,
            app: default_app(),
            stream: stream.into(),
            codec: CodecType::default(),
            correlation_field: default_correlation_field(),
            required_fields: Vec::new(),
            ttl_ms: None,
        }
    }

    /// The configured id, or `<app>::<stream>`.
    pub fn endpoint_id(&self) -> String {
        match &self.id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => format!("{}{}{}", self.app, ENDPOINT_ID_SEPARATOR, self.stream),
        }
    }
}

/// Response sink configuration.
///
/// A sink answers calls received by the endpoint named in `source_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    /// `grpc://host:port/service/method[/sequence]`.
    pub url: String,
    /// Id of the endpoint whose calls this sink answers. Mandatory.
    #[serde(default)]
    pub source_id: Option<String>,
    /// Attribute or transport key holding the correlation id.
    #[serde(default = "default_correlation_field")]
    pub message_id_field: String,
    /// Codec used to encode results.
    #[serde(default)]
    pub codec: CodecType,
}

impl SinkConfig {
    /// Sink answering the given endpoint.
    pub fn new(url: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source_id: Some(source_id.into()),
            message_id_field: default_correlation_field(),
            codec: CodecType::default(),
        }
    }

    /// Validate the URL and return the mandatory source id.
    pub fn validated_source_id(&self) -> Result<&str, ConfigError> {
        ServiceUrl::parse(&self.url)?;
        match self.source_id.as_deref() {
            Some(id) if !id.is_empty() => Ok(id),
            _ => Err(ConfigError::MissingSourceId {
                url: self.url.clone(),
            }),
        }
    }
}
