//! Broker error taxonomy.
//!
//! Every variant except [`BrokerError::Conflict`] and [`BrokerError::Config`]
//! is a per-message error: it is logged and contained at the message boundary
//! and never aborts the endpoint or other in-flight calls.

use tonic::Status;

use crate::codec::CodecError;
use crate::config::ConfigError;

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors that can occur while registering, correlating or delivering.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// An endpoint with this id is already live.
    #[error("Endpoint '{0}' is already registered")]
    Conflict(String),

    /// No endpoint is bound under this id.
    #[error("Endpoint '{0}' not found")]
    NotFound(String),

    /// A delivery named an endpoint that is not (or no longer) registered.
    #[error("Unknown endpoint '{0}'")]
    UnknownEndpoint(String),

    #[error("Failed to decode payload: {0}")]
    Decode(#[from] CodecError),

    #[error("Endpoint '{endpoint}' requires transport property '{field}'")]
    MissingCorrelationField { endpoint: String, field: String },

    #[error("Correlation id '{correlation_id}' is already pending on endpoint '{endpoint}'")]
    DuplicateCorrelation {
        endpoint: String,
        correlation_id: String,
    },

    /// Already answered, already expired, or never registered.
    #[error("Correlation id '{correlation_id}' is not pending on endpoint '{endpoint}'")]
    UnresolvedCorrelation {
        endpoint: String,
        correlation_id: String,
    },

    /// The endpoint is shutting down and accepts no new calls.
    #[error("Endpoint '{0}' is closed")]
    EndpointClosed(String),

    #[error("Processing pipeline unavailable: {0}")]
    PipelineUnavailable(String),

    #[error("Responder task is not running")]
    ResponderStopped,

    /// Invalid endpoint or sink configuration, raised while binding.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl BrokerError {
    /// Whether the error only affects the single message that caused it.
    pub fn is_per_message(&self) -> bool {
        !matches!(self, BrokerError::Conflict(_) | BrokerError::Config(_))
    }
}

impl From<BrokerError> for Status {
    fn from(err: BrokerError) -> Self {
        match &err {
            BrokerError::Decode(_) | BrokerError::MissingCorrelationField { .. } => {
                Status::invalid_argument(err.to_string())
            }
            BrokerError::Conflict(_) | BrokerError::DuplicateCorrelation { .. } => {
                Status::already_exists(err.to_string())
            }
            BrokerError::NotFound(_)
            | BrokerError::UnknownEndpoint(_)
            | BrokerError::UnresolvedCorrelation { .. } => Status::not_found(err.to_string()),
            BrokerError::EndpointClosed(_)
            | BrokerError::PipelineUnavailable(_)
            | BrokerError::ResponderStopped => Status::unavailable(err.to_string()),
            BrokerError::Config(_) => Status::failed_precondition(err.to_string()),
        }
    }
}
