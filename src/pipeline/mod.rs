//! Processing pipeline boundary.
//!
//! The broker hands decoded events to a [`Pipeline`] and never waits on the
//! outcome. Results come back later through the responder
//! ([`crate::broker::ResponderHandle`]), usually via a
//! [`crate::sink::ResponseSink`].

mod echo;

pub use echo::{EchoProcessor, ProcessorHandle};

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::codec::Attributes;
use crate::error::{BrokerError, Result};

/// Default bounded capacity of the channel pipeline.
pub const DEFAULT_PIPELINE_CAPACITY: usize = 1024;

/// A decoded, correlated inbound event.
#[derive(Debug, Clone)]
pub struct Event {
    /// Endpoint that accepted the message; results are delivered back to it.
    pub endpoint_id: String,
    /// Stream (sequence) name the endpoint is bound to.
    pub stream: String,
    /// Correlation id of the call, or `None` for fire-and-forget ingest.
    pub correlation_id: Option<String>,
    /// Attributes decoded from the payload.
    pub attributes: Attributes,
    /// Required transport properties extracted from the message metadata.
    pub transport: HashMap<String, String>,
    /// When the endpoint accepted the message.
    pub received_at: DateTime<Utc>,
}

/// Consumer side of the processing pipeline.
///
/// `submit` must not block: it is called on the inbound call path.
pub trait Pipeline: Send + Sync {
    /// Accept an event, best-effort.
    fn submit(&self, event: Event) -> Result<()>;
}

/// Pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bounded channel capacity.
    pub capacity: usize,
    /// Built-in processor run by the server binary.
    pub processor: ProcessorType,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_PIPELINE_CAPACITY,
            processor: ProcessorType::Echo,
        }
    }
}

/// Built-in processor selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorType {
    /// Answer each correlated event with its own attributes.
    #[default]
    Echo,
    /// Run no processor; events are queued for an embedding application.
    None,
}

/// Receiving half of a [`ChannelPipeline`].
pub type PipelineReceiver = mpsc::Receiver<Event>;

/// In-process pipeline over a bounded mpsc channel.
///
/// A full or closed channel rejects the event instead of waiting.
#[derive(Debug, Clone)]
pub struct ChannelPipeline {
    sender: mpsc::Sender<Event>,
}

impl ChannelPipeline {
    /// Create a pipeline and the receiver the processing side reads from.
    pub fn new(capacity: usize) -> (Self, PipelineReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl Pipeline for ChannelPipeline {
    fn submit(&self, event: Event) -> Result<()> {
        let endpoint_id = event.endpoint_id.clone();
        match self.sender.try_send(event) {
            Ok(()) => {
                debug!(endpoint = %endpoint_id, "Event submitted to pipeline");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(endpoint = %endpoint_id, "Pipeline full, rejecting event");
                Err(BrokerError::PipelineUnavailable("pipeline is full".to_string()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(endpoint = %endpoint_id, "Pipeline closed, rejecting event");
                Err(BrokerError::PipelineUnavailable(
                    "pipeline is closed".to_string(),
                ))
            }
        }
    }
}
