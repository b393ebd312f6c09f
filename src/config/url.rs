//! Endpoint URL parsing.
//!
//! Endpoints and sinks are addressed as
//! `grpc://host:port/service/method[/sequence]`.

use std::fmt;

use ::url::Url;

use super::ConfigError;

/// Only scheme accepted for endpoint and sink URLs.
pub const GRPC_SCHEME: &str = "grpc";

/// Parsed `grpc://host:port/service/method[/sequence]` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUrl {
    pub host: String,
    pub port: u16,
    pub service: String,
    pub method: String,
    pub sequence: Option<String>,
}

impl ServiceUrl {
    /// Parse and validate a URL.
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let parsed = Url::parse(url).map_err(|e| invalid(&e.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(invalid("missing '//' authority after the scheme"));
        }
        // Url lowercases the scheme.
        if parsed.scheme() != GRPC_SCHEME {
            return Err(ConfigError::UnsupportedScheme {
                url: url.to_string(),
                scheme: parsed.scheme().to_string(),
            });
        }

        let host = parsed
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| invalid("missing host"))?;
        let port = parsed.port().ok_or_else(|| invalid("missing port"))?;

        let segments: Vec<&str> = parsed
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        let (service, method, sequence) = match segments.as_slice() {
            [service, method] => (*service, *method, None),
            [service, method, sequence] => (*service, *method, Some(sequence.to_string())),
            [] | [_] => return Err(invalid("expected /service/method after the address")),
            _ => return Err(invalid("too many path segments")),
        };

        Ok(Self {
            host: host.to_string(),
            port,
            service: service.to_string(),
            method: method.to_string(),
            sequence,
        })
    }

    /// `host:port` suitable for binding or connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Fully qualified gRPC method path (`/service/method`).
    pub fn method_path(&self) -> String {
        format!("/{}/{}", self.service, self.method)
    }
}

impl fmt::Display for ServiceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}:{}/{}/{}",
            GRPC_SCHEME, self.host, self.port, self.service, self.method
        )?;
        if let Some(sequence) = &self.sequence {
            write!(f, "/{sequence}")?;
        }
        Ok(())
    }
}
