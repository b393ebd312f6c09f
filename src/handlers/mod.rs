//! gRPC handlers.

mod event_service;

pub use event_service::{EventServiceHandler, ReplyStream};

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::info;

use crate::broker::InboundEndpoint;
use crate::proto::event_service_server::EventServiceServer;
use crate::utils::bootstrap::grpc_trace_layer;

/// Group endpoints by the `host:port` they listen on.
///
/// Each group is served by one tonic server.
pub fn group_by_address(
    endpoints: &[Arc<InboundEndpoint>],
) -> BTreeMap<String, Vec<Arc<InboundEndpoint>>> {
    let mut groups: BTreeMap<String, Vec<Arc<InboundEndpoint>>> = BTreeMap::new();
    for endpoint in endpoints {
        groups
            .entry(endpoint.settings().url.address())
            .or_default()
            .push(endpoint.clone());
    }
    groups
}

/// Serve `handler` on `listener` until `shutdown` flips to true.
///
/// Health reports SERVING for the event service as soon as the server starts.
pub async fn serve(
    listener: TcpListener,
    handler: EventServiceHandler,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), tonic::transport::Error> {
    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<EventServiceServer<EventServiceHandler>>()
        .await;

    let local_addr = listener.local_addr().ok();
    info!(address = %handler.address(), local = ?local_addr, "Event service listening");

    Server::builder()
        .layer(grpc_trace_layer())
        .add_service(health_service)
        .add_service(handler.into_server())
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::EndpointConfig;
    use crate::pipeline::ChannelPipeline;

    fn endpoint(url: &str, stream: &str) -> Arc<InboundEndpoint> {
        let (pipeline, _rx) = ChannelPipeline::new(1);
        Arc::new(
            InboundEndpoint::from_config(
                &EndpointConfig::new(url, stream),
                Duration::from_secs(30),
                Arc::new(pipeline),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_group_by_address() {
        let endpoints = vec![
            endpoint("grpc://localhost:8181/s/process", "A"),
            endpoint("grpc://localhost:8181/s/exchange", "B"),
            endpoint("grpc://localhost:8282/s/process", "C"),
        ];

        let groups = group_by_address(&endpoints);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["localhost:8181"].len(), 2);
        assert_eq!(groups["localhost:8282"][0].stream(), "C");
    }
}
