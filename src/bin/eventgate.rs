//! eventgate: correlating gRPC front-end
//!
//! Accepts events over gRPC, hands them to the processing pipeline, and routes
//! each pipeline result back to the call that produced it.
//!
//! ## Architecture
//! ```text
//! [client] --(Process/Exchange)--> [InboundEndpoint] --> [Pipeline]
//!     ^                                  |                    |
//!     |                          [CorrelationTable]           v
//!     +------------(Reply)---------- [Responder] <---- [ResponseSink]
//! ```
//!
//! ## Configuration
//! - First argument: optional path to a YAML config file
//! - EVENTGATE_CONFIG: config file path
//! - EVENTGATE__*: overrides (e.g. EVENTGATE__EXPIRY__TTL_MS=5000)
//! - EVENTGATE_LOG: tracing filter (default: info)

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use eventgate::broker::Broker;
use eventgate::config::Config;
use eventgate::handlers::{group_by_address, serve, EventServiceHandler};
use eventgate::pipeline::{ChannelPipeline, EchoProcessor, ProcessorType};
use eventgate::utils::bootstrap::{init_tracing, shutdown_signal};

const SERVER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref())?;
    config.validate()?;

    info!(
        endpoints = config.endpoints.len(),
        sinks = config.sinks.len(),
        ttl_ms = config.expiry.ttl_ms,
        "eventgate starting"
    );

    let broker = Broker::start(&config);
    let (pipeline, receiver) = ChannelPipeline::new(config.pipeline.capacity);
    let endpoints = broker.bind_endpoints(&config, Arc::new(pipeline)).await?;

    let (processor, _held_receiver) = match config.pipeline.processor {
        ProcessorType::Echo => {
            let sinks = broker.build_sinks(&config.sinks)?;
            (Some(EchoProcessor::new(receiver, sinks).spawn()), None)
        }
        ProcessorType::None => {
            warn!("No processor configured, events queue until the pipeline is full");
            (None, Some(receiver))
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut servers = Vec::new();

    let groups = group_by_address(&endpoints);
    if groups.is_empty() {
        warn!(address = %config.server.addr(), "No endpoints configured, serving health only");
        let listener = TcpListener::bind(config.server.addr()).await?;
        let handler = EventServiceHandler::new(config.server.addr(), Vec::new());
        servers.push(tokio::spawn(serve(listener, handler, shutdown_rx.clone())));
    }
    for (address, group) in groups {
        let listener = TcpListener::bind(&address).await?;
        let handler = EventServiceHandler::new(address, group);
        servers.push(tokio::spawn(serve(listener, handler, shutdown_rx.clone())));
    }

    info!(servers = servers.len(), "eventgate started");

    shutdown_signal().await;

    // Drain first: pending calls complete with a shutdown reply, which lets
    // in-flight requests finish before the servers stop.
    broker.shutdown().await;
    if let Some(processor) = processor {
        processor.shutdown().await;
    }

    let _ = shutdown_tx.send(true);
    for server in servers {
        match tokio::time::timeout(SERVER_DRAIN_TIMEOUT, server).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => error!(error = %e, "Server error"),
            Ok(Err(e)) => error!(error = %e, "Server task failed"),
            Err(_) => warn!("Server did not stop within the drain timeout"),
        }
    }

    info!("eventgate stopped");
    Ok(())
}
