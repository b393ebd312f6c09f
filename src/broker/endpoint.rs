//! Inbound endpoint.
//!
//! Decodes each inbound message, correlates it, parks its response channel in
//! the endpoint's [`CorrelationTable`], and forwards the decoded event to the
//! processing pipeline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::table::{Completion, CorrelationTable, PendingResponse, ResponseChannel};
use crate::codec::{Attributes, PayloadCodec};
use crate::config::{ConfigError, EndpointConfig, ServiceUrl};
use crate::error::{BrokerError, Result};
use crate::pipeline::{Event, Pipeline};

/// Resolved, validated endpoint settings.
#[derive(Debug, Clone)]
pub struct EndpointSettings {
    /// Process-unique endpoint id.
    pub id: String,
    /// Stream name messages are routed to (`stream.id` header).
    pub stream: String,
    /// Listening address and method.
    pub url: ServiceUrl,
    /// Metadata key holding the correlation id; generated when absent.
    pub correlation_field: String,
    /// Metadata keys that must be present on every message.
    pub required_fields: Vec<String>,
    /// Age after which an unanswered call is failed with a timeout.
    pub ttl: Duration,
}

impl EndpointSettings {
    /// Resolve settings from configuration, falling back to `default_ttl`.
    pub fn from_config(
        config: &EndpointConfig,
        default_ttl: Duration,
    ) -> std::result::Result<Self, ConfigError> {
        let url = ServiceUrl::parse(&config.url)?;
        let ttl = match config.ttl_ms {
            Some(0) => {
                return Err(ConfigError::InvalidDuration {
                    field: format!("endpoints[{}].ttl_ms", config.endpoint_id()),
                })
            }
            Some(ms) => Duration::from_millis(ms),
            None => default_ttl,
        };

        Ok(Self {
            id: config.endpoint_id(),
            stream: config.stream.clone(),
            url,
            correlation_field: config.correlation_field.clone(),
            required_fields: config.required_fields.clone(),
            ttl,
        })
    }
}

/// A live inbound endpoint and its correlation table.
pub struct InboundEndpoint {
    settings: EndpointSettings,
    codec: Arc<dyn PayloadCodec>,
    pipeline: Arc<dyn Pipeline>,
    table: CorrelationTable,
}

impl InboundEndpoint {
    /// Create an endpoint with an empty correlation table.
    pub fn new(
        settings: EndpointSettings,
        codec: Arc<dyn PayloadCodec>,
        pipeline: Arc<dyn Pipeline>,
    ) -> Self {
        let table = CorrelationTable::new(settings.id.clone());
        Self {
            settings,
            codec,
            pipeline,
            table,
        }
    }

    /// Build an endpoint straight from configuration.
    pub fn from_config(
        config: &EndpointConfig,
        default_ttl: Duration,
        pipeline: Arc<dyn Pipeline>,
    ) -> std::result::Result<Self, ConfigError> {
        let settings = EndpointSettings::from_config(config, default_ttl)?;
        Ok(Self::new(settings, config.codec.build(), pipeline))
    }

    pub fn id(&self) -> &str {
        &self.settings.id
    }

    pub fn stream(&self) -> &str {
        &self.settings.stream
    }

    pub fn ttl(&self) -> Duration {
        self.settings.ttl
    }

    pub fn settings(&self) -> &EndpointSettings {
        &self.settings
    }

    pub fn table(&self) -> &CorrelationTable {
        &self.table
    }

    /// Correlate one message and park its response channel.
    ///
    /// Returns the correlation id the eventual result must be delivered
    /// under. On any error nothing stays parked and no event reaches the
    /// pipeline, except that a pipeline refusal completes the parked
    /// channel with a rejection before returning.
    pub async fn handle_incoming_message(
        &self,
        payload: &[u8],
        metadata: &HashMap<String, String>,
        channel: ResponseChannel,
    ) -> Result<String> {
        let (attributes, transport) = self.accept(payload, metadata)?;

        let correlation_id = match metadata.get(&self.settings.correlation_field) {
            Some(id) if !id.is_empty() => id.clone(),
            _ => uuid::Uuid::new_v4().to_string(),
        };

        if let Err(e) = self
            .table
            .insert(PendingResponse::new(correlation_id.clone(), channel))
            .await
        {
            warn!(
                endpoint = %self.settings.id,
                correlation_id = %correlation_id,
                error = %e,
                "Dropping request"
            );
            return Err(e);
        }

        let event = Event {
            endpoint_id: self.settings.id.clone(),
            stream: self.settings.stream.clone(),
            correlation_id: Some(correlation_id.clone()),
            attributes,
            transport,
            received_at: chrono::Utc::now(),
        };

        if let Err(e) = self.pipeline.submit(event) {
            if let Some(pending) = self.table.claim(&correlation_id).await {
                pending.complete(Completion::Rejected(e.to_string()));
            }
            return Err(e);
        }

        debug!(
            endpoint = %self.settings.id,
            correlation_id = %correlation_id,
            "Request parked awaiting response"
        );
        Ok(correlation_id)
    }

    /// Forward one message without parking a response channel.
    ///
    /// The event carries no correlation id even when the metadata holds one:
    /// nothing waits for its result, and the id may belong to a parked call.
    pub fn handle_event(&self, payload: &[u8], metadata: &HashMap<String, String>) -> Result<()> {
        let (attributes, transport) = self.accept(payload, metadata)?;

        self.pipeline.submit(Event {
            endpoint_id: self.settings.id.clone(),
            stream: self.settings.stream.clone(),
            correlation_id: None,
            attributes,
            transport,
            received_at: chrono::Utc::now(),
        })
    }

    /// Close the table and fail every pending call with a shutdown outcome.
    ///
    /// Returns the number of calls that were still pending.
    pub async fn shutdown(&self) -> usize {
        let drained = self.table.close_and_drain().await;
        let count = drained.len();
        for pending in drained {
            pending.complete(Completion::Shutdown);
        }
        info!(
            endpoint = %self.settings.id,
            pending = count,
            "Endpoint closed, pending calls discarded"
        );
        count
    }

    /// Decode the payload and extract required transport properties.
    fn accept(
        &self,
        payload: &[u8],
        metadata: &HashMap<String, String>,
    ) -> Result<(Attributes, HashMap<String, String>)> {
        let attributes = self.codec.decode(payload).map_err(|e| {
            warn!(
                endpoint = %self.settings.id,
                codec = self.codec.name(),
                error = %e,
                "Dropping request, payload could not be decoded"
            );
            BrokerError::Decode(e)
        })?;

        let mut transport = HashMap::with_capacity(self.settings.required_fields.len());
        for field in &self.settings.required_fields {
            match metadata.get(field) {
                Some(value) => {
                    transport.insert(field.clone(), value.clone());
                }
                None => {
                    warn!(
                        endpoint = %self.settings.id,
                        field = %field,
                        "Dropping request, required transport property not present"
                    );
                    return Err(BrokerError::MissingCorrelationField {
                        endpoint: self.settings.id.clone(),
                        field: field.clone(),
                    });
                }
            }
        }

        Ok((attributes, transport))
    }
}

impl std::fmt::Debug for InboundEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundEndpoint")
            .field("settings", &self.settings)
            .field("codec", &self.codec.name())
            .finish_non_exhaustive()
    }
}
