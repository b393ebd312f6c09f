//! Shared utilities for integration tests.
//!
//! Starts a complete gateway in-process (broker, pipeline, processor and a
//! tonic server on an ephemeral port) and connects a client to it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tonic::transport::Channel;

use eventgate::broker::{Broker, InboundEndpoint};
use eventgate::config::{Config, EndpointConfig, SinkConfig};
use eventgate::handlers::{serve, EventServiceHandler};
use eventgate::pipeline::{ChannelPipeline, EchoProcessor, PipelineReceiver, ProcessorHandle};

pub use eventgate::proto::event_service_client::EventServiceClient;
pub use eventgate::proto::{reply, Event, FailureKind, Reply};

pub const PROCESS_URL: &str = "grpc://127.0.0.1:8181/eventgate.EventService/process";
pub const EXCHANGE_URL: &str = "grpc://127.0.0.1:8181/eventgate.EventService/exchange/mySequence";

/// What answers events submitted to the pipeline.
pub enum Processing {
    /// Echo every correlated event back through a sink.
    Echo,
    /// Nothing answers; calls can only expire or be shut down.
    Silent,
}

pub struct Gateway {
    pub broker: Option<Broker>,
    pub client: EventServiceClient<Channel>,
    pub endpoints: Vec<Arc<InboundEndpoint>>,
    pub port: u16,
    processor: Option<ProcessorHandle>,
    _receiver: Option<PipelineReceiver>,
    shutdown: watch::Sender<bool>,
    server: JoinHandle<()>,
}

/// Config with one endpoint per stream and a sink for each.
pub fn config(streams: &[(&str, &str)], ttl_ms: u64, sweep_interval_ms: u64) -> Config {
    let mut config = Config::for_test();
    config.expiry.ttl_ms = ttl_ms;
    config.expiry.sweep_interval_ms = sweep_interval_ms;
    for (url, stream) in streams {
        let mut endpoint = EndpointConfig::new(*url, *stream);
        endpoint.id = Some(stream.to_string());
        config.endpoints.push(endpoint);
        config.sinks.push(SinkConfig::new(*url, *stream));
    }
    config
}

pub async fn start_gateway(config: Config, processing: Processing) -> Gateway {
    config.validate().unwrap();

    let broker = Broker::start(&config);
    let (pipeline, receiver) = ChannelPipeline::new(config.pipeline.capacity);
    let endpoints = broker
        .bind_endpoints(&config, Arc::new(pipeline))
        .await
        .unwrap();

    let (processor, held) = match processing {
        Processing::Echo => {
            let sinks = broker.build_sinks(&config.sinks).unwrap();
            (Some(EchoProcessor::new(receiver, sinks).spawn()), None)
        }
        Processing::Silent => (None, Some(receiver)),
    };

    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (shutdown, shutdown_rx) = watch::channel(false);
    let handler = EventServiceHandler::new(format!("127.0.0.1:{port}"), endpoints.clone());
    let server = tokio::spawn(async move {
        serve(listener, handler, shutdown_rx).await.ok();
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = EventServiceClient::connect(format!("http://127.0.0.1:{port}"))
        .await
        .unwrap();

    Gateway {
        broker: Some(broker),
        client,
        endpoints,
        port,
        processor,
        _receiver: held,
        shutdown,
        server,
    }
}

impl Gateway {
    /// Drain every endpoint, then stop the server and processor.
    pub async fn stop(mut self) {
        if let Some(broker) = self.broker.take() {
            broker.shutdown().await;
        }
        if let Some(processor) = self.processor.take() {
            processor.shutdown().await;
        }
        let _ = self.shutdown.send(true);
        let _ = tokio::time::timeout(Duration::from_secs(2), self.server).await;
    }
}

pub fn event(payload: &str, headers: &[(&str, &str)]) -> Event {
    Event {
        payload: payload.to_string(),
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>(),
    }
}

pub fn failure_kind(reply: &Reply) -> Option<FailureKind> {
    match reply.outcome.as_ref()? {
        reply::Outcome::Failure(f) => Some(f.kind()),
        reply::Outcome::Result(_) => None,
    }
}

pub fn result_payload(reply: &Reply) -> Option<&str> {
    match reply.outcome.as_ref()? {
        reply::Outcome::Result(event) => Some(event.payload.as_str()),
        reply::Outcome::Failure(_) => None,
    }
}
