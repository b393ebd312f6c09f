//! Response sink - outbound boundary from the pipeline back to callers.
//!
//! A sink answers the calls received by exactly one inbound endpoint (its
//! source). Publishing encodes the result with the sink's codec and hands it
//! to the responder task; it never waits for the caller.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::broker::{ResponderHandle, CORRELATION_ID_HEADER};
use crate::codec::{Attributes, CodecError, PayloadCodec};
use crate::config::{ConfigError, ServiceUrl, SinkConfig};
use crate::error::{BrokerError, Result};
use crate::pipeline::Event;
use crate::proto::Event as ProtoEvent;

/// Publishes pipeline results to the calls of one source endpoint.
#[derive(Clone)]
pub struct ResponseSink {
    url: ServiceUrl,
    source_id: String,
    message_id_field: String,
    codec: Arc<dyn PayloadCodec>,
    responder: ResponderHandle,
}

impl ResponseSink {
    /// Build a sink from configuration.
    ///
    /// Fails when the URL is invalid or `source_id` is missing.
    pub fn from_config(
        config: &SinkConfig,
        responder: ResponderHandle,
    ) -> std::result::Result<Self, ConfigError> {
        let source_id = config.validated_source_id()?.to_string();
        let url = ServiceUrl::parse(&config.url)?;
        Ok(Self {
            url,
            source_id,
            message_id_field: config.message_id_field.clone(),
            codec: config.codec.build(),
            responder,
        })
    }

    /// Id of the endpoint this sink answers.
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn url(&self) -> &ServiceUrl {
        &self.url
    }

    /// Encode `attributes` and deliver them as the answer to `correlation_id`.
    pub fn publish(&self, attributes: &Attributes, correlation_id: &str) -> Result<()> {
        let encoded = self.codec.encode(attributes)?;
        let payload = String::from_utf8(encoded).map_err(|_| CodecError::InvalidUtf8)?;

        let mut result = ProtoEvent {
            payload,
            headers: Default::default(),
        };
        result
            .headers
            .insert(self.message_id_field.clone(), correlation_id.to_string());
        result
            .headers
            .insert(CORRELATION_ID_HEADER.to_string(), correlation_id.to_string());

        self.responder
            .deliver(self.source_id.clone(), correlation_id, result)?;
        debug!(
            source = %self.source_id,
            correlation_id = %correlation_id,
            "Result published"
        );
        Ok(())
    }

    /// Publish `attributes` as the answer to the call that produced `event`.
    ///
    /// Only events whose call was parked can be answered. The correlation id
    /// is read from the event's `message_id_field` transport property,
    /// falling back to the id the endpoint assigned.
    pub fn publish_event(&self, event: &Event, attributes: &Attributes) -> Result<()> {
        let Some(assigned) = event.correlation_id.as_ref() else {
            warn!(
                source = %self.source_id,
                "Dropping result, event was not parked awaiting a reply"
            );
            return Err(BrokerError::MissingCorrelationField {
                endpoint: event.endpoint_id.clone(),
                field: self.message_id_field.clone(),
            });
        };
        let correlation_id = event
            .transport
            .get(&self.message_id_field)
            .unwrap_or(assigned);

        self.publish(attributes, correlation_id)
    }
}

impl std::fmt::Debug for ResponseSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseSink")
            .field("url", &self.url.to_string())
            .field("source_id", &self.source_id)
            .field("codec", &self.codec.name())
            .finish_non_exhaustive()
    }
}
