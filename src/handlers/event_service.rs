//! gRPC `EventService` implementation.
//!
//! One handler serves every endpoint bound to the same host:port. Each
//! inbound message is routed by its `stream.id` header to the endpoint bound
//! to that stream; a server hosting a single endpoint also accepts messages
//! without the header.
//!
//! Transport properties are the message's own headers layered over the
//! call's ASCII gRPC metadata. A header on the message wins over call
//! metadata with the same key. Metadata keys arrive lowercased.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tonic::metadata::{KeyAndValueRef, MetadataMap};
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info, warn};

use crate::broker::{build_reply, Completion, InboundEndpoint, ResponseChannel, STREAM_ID_HEADER};
use crate::config::DEFAULT_CORRELATION_FIELD;
use crate::error::BrokerError;
use crate::proto::event_service_server::{EventService, EventServiceServer};
use crate::proto::{Ack, Event, Reply};

/// Outbound half of an `Exchange` call.
pub type ReplyStream = Pin<Box<dyn Stream<Item = Result<Reply, Status>> + Send + 'static>>;

/// `EventService` for the endpoints hosted on one address.
#[derive(Debug, Clone)]
pub struct EventServiceHandler {
    address: String,
    endpoints: Arc<HashMap<String, Arc<InboundEndpoint>>>,
}

impl EventServiceHandler {
    /// Create a handler routing to `endpoints` by stream name.
    pub fn new(
        address: impl Into<String>,
        endpoints: impl IntoIterator<Item = Arc<InboundEndpoint>>,
    ) -> Self {
        let endpoints = endpoints
            .into_iter()
            .map(|endpoint| (endpoint.stream().to_string(), endpoint))
            .collect();
        Self {
            address: address.into(),
            endpoints: Arc::new(endpoints),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Wrap into the generated tonic server.
    pub fn into_server(self) -> EventServiceServer<Self> {
        EventServiceServer::new(self)
    }

    /// Resolve the endpoint a message is addressed to.
    pub fn route(&self, headers: &HashMap<String, String>) -> Result<Arc<InboundEndpoint>, Status> {
        let Some(stream) = headers.get(STREAM_ID_HEADER) else {
            if self.endpoints.len() == 1 {
                if let Some(endpoint) = self.endpoints.values().next() {
                    return Ok(endpoint.clone());
                }
            }
            warn!(
                address = %self.address,
                "Dropping request, '{}' header required to select an endpoint",
                STREAM_ID_HEADER
            );
            return Err(Status::not_found(format!(
                "Header '{STREAM_ID_HEADER}' is required on {}",
                self.address
            )));
        };

        self.endpoints.get(stream).cloned().ok_or_else(|| {
            warn!(
                address = %self.address,
                stream = %stream,
                "Dropping request, no endpoint bound to stream"
            );
            Status::not_found(format!(
                "No endpoint bound to stream '{stream}' on {}",
                self.address
            ))
        })
    }

    /// Correlate one message of an `Exchange` call.
    ///
    /// Messages that cannot be routed or decoded are answered with a
    /// rejection on the shared stream. Missing fields and duplicate ids are
    /// only logged, so no reply can be mistaken for another call's answer.
    async fn exchange_message(&self, message: Event, replies: &mpsc::UnboundedSender<Reply>) {
        let endpoint = match self.route(&message.headers) {
            Ok(endpoint) => endpoint,
            Err(status) => {
                let correlation_id = header_or_empty(&message.headers, DEFAULT_CORRELATION_FIELD);
                let _ = replies.send(build_reply(
                    &correlation_id,
                    Completion::Rejected(status.message().to_string()),
                ));
                return;
            }
        };

        let result = endpoint
            .handle_incoming_message(
                message.payload.as_bytes(),
                &message.headers,
                ResponseChannel::Stream(replies.clone()),
            )
            .await;

        match result {
            Ok(correlation_id) => {
                debug!(
                    endpoint = %endpoint.id(),
                    correlation_id = %correlation_id,
                    "Exchange message accepted"
                );
            }
            Err(e @ BrokerError::Decode(_)) => {
                let correlation_id =
                    header_or_empty(&message.headers, &endpoint.settings().correlation_field);
                let _ = replies.send(build_reply(
                    &correlation_id,
                    Completion::Rejected(e.to_string()),
                ));
            }
            // Already answered with a rejection by the endpoint.
            Err(BrokerError::PipelineUnavailable(_)) => {}
            Err(e) => {
                debug!(endpoint = %endpoint.id(), error = %e, "Exchange message dropped");
            }
        }
    }
}

fn header_or_empty(headers: &HashMap<String, String>, key: &str) -> String {
    headers.get(key).cloned().unwrap_or_default()
}

/// ASCII entries of the call metadata as transport properties.
fn call_metadata(metadata: &MetadataMap) -> HashMap<String, String> {
    metadata
        .iter()
        .filter_map(|entry| match entry {
            KeyAndValueRef::Ascii(key, value) => value
                .to_str()
                .ok()
                .map(|value| (key.as_str().to_string(), value.to_string())),
            KeyAndValueRef::Binary(..) => None,
        })
        .collect()
}

/// Layer a message's own headers over the call metadata.
fn with_call_metadata(
    call: &HashMap<String, String>,
    headers: HashMap<String, String>,
) -> HashMap<String, String> {
    if call.is_empty() {
        return headers;
    }
    let mut merged = call.clone();
    merged.extend(headers);
    merged
}

#[tonic::async_trait]
impl EventService for EventServiceHandler {
    async fn consume(&self, request: Request<Streaming<Event>>) -> Result<Response<Ack>, Status> {
        let call = call_metadata(request.metadata());
        let mut inbound = request.into_inner();
        let mut accepted = 0u64;

        while let Some(mut message) = inbound.message().await? {
            message.headers = with_call_metadata(&call, message.headers);
            let Ok(endpoint) = self.route(&message.headers) else {
                continue;
            };
            match endpoint.handle_event(message.payload.as_bytes(), &message.headers) {
                Ok(()) => accepted += 1,
                Err(e) => {
                    debug!(endpoint = %endpoint.id(), error = %e, "Consumed message dropped");
                }
            }
        }

        debug!(address = %self.address, accepted = accepted, "Consume stream closed");
        Ok(Response::new(Ack {}))
    }

    async fn process(&self, request: Request<Event>) -> Result<Response<Reply>, Status> {
        let call = call_metadata(request.metadata());
        let mut message = request.into_inner();
        message.headers = with_call_metadata(&call, message.headers);
        let endpoint = self.route(&message.headers)?;

        let (tx, mut rx) = oneshot::channel();
        if let Err(e) = endpoint
            .handle_incoming_message(
                message.payload.as_bytes(),
                &message.headers,
                ResponseChannel::Unary(tx),
            )
            .await
        {
            // A call that was parked and then refused already holds its reply.
            return match rx.try_recv() {
                Ok(reply) => Ok(Response::new(reply)),
                Err(_) => Err(e.into()),
            };
        }

        match rx.await {
            Ok(reply) => Ok(Response::new(reply)),
            Err(_) => Err(Status::aborted("Call dropped without a reply")),
        }
    }

    type ExchangeStream = ReplyStream;

    async fn exchange(
        &self,
        request: Request<Streaming<Event>>,
    ) -> Result<Response<Self::ExchangeStream>, Status> {
        let call = call_metadata(request.metadata());
        let mut inbound = request.into_inner();
        let (tx, rx) = mpsc::unbounded_channel::<Reply>();
        let handler = self.clone();

        tokio::spawn(async move {
            loop {
                match inbound.message().await {
                    Ok(Some(mut message)) => {
                        message.headers = with_call_metadata(&call, message.headers);
                        handler.exchange_message(message, &tx).await
                    }
                    Ok(None) => {
                        debug!(address = %handler.address, "Exchange inbound half-closed");
                        break;
                    }
                    Err(status) => {
                        info!(address = %handler.address, error = %status, "Exchange inbound failed");
                        break;
                    }
                }
            }
            // Pending entries keep their own clones; the outbound stream ends
            // once the last of them is resolved.
            drop(tx);
        });

        let outbound = UnboundedReceiverStream::new(rx).map(Ok::<_, Status>);
        Ok(Response::new(Box::pin(outbound) as Self::ExchangeStream))
    }
}
