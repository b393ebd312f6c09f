//! Echo processor.
//!
//! Default processing stage for the server binary: every correlated event is
//! answered with its own decoded attributes through the sink bound to the
//! endpoint that accepted it.

use std::collections::HashMap;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Event, PipelineReceiver};
use crate::sink::ResponseSink;

/// Drains a pipeline receiver and echoes each event back to its caller.
#[derive(Debug)]
pub struct EchoProcessor {
    receiver: PipelineReceiver,
    sinks: HashMap<String, ResponseSink>,
}

impl EchoProcessor {
    /// Create a processor publishing through `sinks`, keyed by source id.
    pub fn new(receiver: PipelineReceiver, sinks: impl IntoIterator<Item = ResponseSink>) -> Self {
        let sinks = sinks
            .into_iter()
            .map(|sink| (sink.source_id().to_string(), sink))
            .collect();
        Self { receiver, sinks }
    }

    /// Answer one event. Returns whether a result was published.
    ///
    /// Fire-and-forget events have no call waiting and are only consumed.
    pub fn process(&self, event: &Event) -> bool {
        if event.correlation_id.is_none() {
            debug!(
                endpoint = %event.endpoint_id,
                "Event not awaiting a reply, consumed"
            );
            return false;
        }

        let Some(sink) = self.sinks.get(&event.endpoint_id) else {
            debug!(
                endpoint = %event.endpoint_id,
                "No sink bound to endpoint, event consumed"
            );
            return false;
        };

        match sink.publish_event(event, &event.attributes) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    endpoint = %event.endpoint_id,
                    error = %e,
                    "Failed to publish echo result"
                );
                false
            }
        }
    }

    /// Run until stopped or until every pipeline sender is dropped.
    pub fn spawn(mut self) -> ProcessorHandle {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            info!(sinks = self.sinks.len(), "Echo processor started");
            loop {
                tokio::select! {
                    event = self.receiver.recv() => {
                        let Some(event) = event else {
                            info!("Pipeline closed, echo processor exiting");
                            break;
                        };
                        self.process(&event);
                    }
                    _ = cancel_rx.changed() => {
                        if *cancel_rx.borrow() {
                            info!("Echo processor stopped");
                            break;
                        }
                    }
                }
            }
        });

        ProcessorHandle {
            cancel: cancel_tx,
            task,
        }
    }
}

/// Handle to a running processor task.
#[derive(Debug)]
pub struct ProcessorHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ProcessorHandle {
    pub fn stop(&self) {
        let _ = self.cancel.send(true);
    }

    /// Stop and wait for the task to exit.
    pub async fn shutdown(self) {
        self.stop();
        let _ = self.task.await;
    }
}
