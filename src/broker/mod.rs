//! Correlation broker.
//!
//! Parks the response channel of each inbound call under a correlation id,
//! lets the processing pipeline answer it later from any task, and
//! guarantees every parked call reaches exactly one terminal state:
//! answered, expired, or discarded on shutdown.
//!
//! - [`CorrelationTable`]: per-endpoint map of pending calls
//! - [`EndpointRegistry`]: live endpoints by id
//! - [`InboundEndpoint`]: decode, correlate, park, submit
//! - [`Responder`]: route a result back to its pending call
//! - [`ExpirySweeper`]: fail calls that outlive their TTL

mod endpoint;
mod registry;
mod responder;
mod sweeper;
mod table;

pub use endpoint::{EndpointSettings, InboundEndpoint};
pub use registry::EndpointRegistry;
pub use responder::{spawn_responder, Delivery, Responder, ResponderHandle};
pub use sweeper::{ExpirySweeper, SweeperHandle};
pub use table::{build_reply, Completion, CorrelationTable, PendingResponse, ResponseChannel};

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::config::{Config, SinkConfig};
use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::sink::ResponseSink;

/// Metadata key routing a message to the endpoint bound to that stream.
pub const STREAM_ID_HEADER: &str = "stream.id";
/// Metadata key echoed on results and used for request tracing.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Running broker: registry plus its responder and sweeper tasks.
#[derive(Debug)]
pub struct Broker {
    registry: Arc<EndpointRegistry>,
    responder: ResponderHandle,
    responder_task: JoinHandle<()>,
    sweeper: SweeperHandle,
}

impl Broker {
    /// Spawn the responder and sweeper over a fresh registry.
    pub fn start(config: &Config) -> Self {
        let registry = Arc::new(EndpointRegistry::new());
        let (responder, responder_task) = spawn_responder(Responder::new(registry.clone()));
        let sweeper =
            ExpirySweeper::new(registry.clone(), config.expiry.sweep_interval()).spawn();

        Self {
            registry,
            responder,
            responder_task,
            sweeper,
        }
    }

    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    /// Handle for queueing results to the responder task.
    pub fn responder(&self) -> ResponderHandle {
        self.responder.clone()
    }

    /// Build and register every configured endpoint, all feeding `pipeline`.
    ///
    /// Fails on the first invalid endpoint or id conflict.
    pub async fn bind_endpoints(
        &self,
        config: &Config,
        pipeline: Arc<dyn Pipeline>,
    ) -> Result<Vec<Arc<InboundEndpoint>>> {
        let mut bound = Vec::with_capacity(config.endpoints.len());
        for endpoint_config in &config.endpoints {
            let endpoint = Arc::new(InboundEndpoint::from_config(
                endpoint_config,
                config.expiry.ttl(),
                pipeline.clone(),
            )?);
            self.registry.register(endpoint.clone()).await?;
            bound.push(endpoint);
        }
        Ok(bound)
    }

    /// Build one response sink per sink configuration.
    pub fn build_sinks(&self, sinks: &[SinkConfig]) -> Result<Vec<ResponseSink>> {
        sinks
            .iter()
            .map(|sink| Ok(ResponseSink::from_config(sink, self.responder())?))
            .collect()
    }

    /// Unregister every endpoint and stop the background tasks.
    ///
    /// Returns the number of endpoints that were shut down.
    pub async fn shutdown(self) -> usize {
        let stopped = self.registry.shutdown_all().await;
        self.sweeper.shutdown().await;
        self.responder.stop();
        let _ = self.responder_task.await;
        info!(endpoints = stopped, "Broker shut down");
        stopped
    }
}
