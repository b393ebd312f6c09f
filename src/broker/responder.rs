//! Outbound responder.
//!
//! Routes a pipeline result back to the call that produced it: registry
//! lookup, remove-and-claim from the endpoint's table, then a single terminal
//! write. The pipeline reaches it through [`ResponderHandle`], which queues
//! deliveries for a dedicated task instead of calling in place.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::registry::EndpointRegistry;
use super::table::Completion;
use crate::error::{BrokerError, Result};
use crate::proto::Event as ProtoEvent;

/// A result addressed to one pending call.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub endpoint_id: String,
    pub correlation_id: String,
    pub result: ProtoEvent,
}

/// Completes pending calls with pipeline results.
#[derive(Debug, Clone)]
pub struct Responder {
    registry: Arc<EndpointRegistry>,
}

impl Responder {
    pub fn new(registry: Arc<EndpointRegistry>) -> Self {
        Self { registry }
    }

    /// Complete the call `correlation_id` on `endpoint_id` with `result`.
    ///
    /// Unknown endpoints and unresolved ids are logged and the result is
    /// discarded; neither is fatal to the caller.
    pub async fn deliver(
        &self,
        endpoint_id: &str,
        correlation_id: &str,
        result: ProtoEvent,
    ) -> Result<()> {
        let endpoint = self.registry.lookup(endpoint_id).await.map_err(|_| {
            warn!(
                endpoint = %endpoint_id,
                correlation_id = %correlation_id,
                "Discarding result for unknown endpoint"
            );
            BrokerError::UnknownEndpoint(endpoint_id.to_string())
        })?;

        let pending = endpoint.table().claim(correlation_id).await.ok_or_else(|| {
            warn!(
                endpoint = %endpoint_id,
                correlation_id = %correlation_id,
                "Discarding result, correlation id is not pending (answered, expired or never registered)"
            );
            BrokerError::UnresolvedCorrelation {
                endpoint: endpoint_id.to_string(),
                correlation_id: correlation_id.to_string(),
            }
        })?;

        pending.complete(Completion::Result(result));
        debug!(
            endpoint = %endpoint_id,
            correlation_id = %correlation_id,
            "Response delivered"
        );
        Ok(())
    }
}

/// Message-passing front of the responder task.
///
/// Cloneable and cheap; `send` never waits.
#[derive(Debug, Clone)]
pub struct ResponderHandle {
    sender: mpsc::UnboundedSender<Delivery>,
    cancel: Arc<watch::Sender<bool>>,
}

impl ResponderHandle {
    /// Queue a delivery for the responder task.
    pub fn send(&self, delivery: Delivery) -> Result<()> {
        self.sender
            .send(delivery)
            .map_err(|_| BrokerError::ResponderStopped)
    }

    /// Convenience wrapper around [`ResponderHandle::send`].
    pub fn deliver(
        &self,
        endpoint_id: impl Into<String>,
        correlation_id: impl Into<String>,
        result: ProtoEvent,
    ) -> Result<()> {
        self.send(Delivery {
            endpoint_id: endpoint_id.into(),
            correlation_id: correlation_id.into(),
            result,
        })
    }

    /// Signal the responder task to stop.
    ///
    /// Deliveries already queued are dropped.
    pub fn stop(&self) {
        let _ = self.cancel.send(true);
    }
}

/// Spawn the responder task.
///
/// The task ends when stopped or when every handle has been dropped.
pub fn spawn_responder(responder: Responder) -> (ResponderHandle, JoinHandle<()>) {
    let (sender, mut receiver) = mpsc::unbounded_channel::<Delivery>();
    let (cancel_tx, mut cancel_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        info!("Responder task started");
        loop {
            tokio::select! {
                delivery = receiver.recv() => {
                    let Some(delivery) = delivery else {
                        info!("All responder handles dropped, stopping");
                        break;
                    };
                    // Outcome is already logged inside deliver.
                    let _ = responder
                        .deliver(&delivery.endpoint_id, &delivery.correlation_id, delivery.result)
                        .await;
                }
                _ = cancel_rx.changed() => {
                    if *cancel_rx.borrow() {
                        info!("Responder task stopped");
                        break;
                    }
                }
            }
        }
    });

    let handle = ResponderHandle {
        sender,
        cancel: Arc::new(cancel_tx),
    };
    (handle, task)
}
