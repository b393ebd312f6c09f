//! Bootstrap utilities for the eventgate binary.

use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::broker::CORRELATION_ID_HEADER;
use crate::config::LOG_ENV_VAR;

/// Initialize tracing with the EVENTGATE_LOG environment variable.
///
/// Defaults to "info" level if EVENTGATE_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// gRPC trace layer opening one span per request.
///
/// The span carries the request path and the `x-correlation-id` header.
pub fn grpc_trace_layer() -> TraceLayer<
    tower_http::classify::SharedClassifier<tower_http::classify::GrpcErrorsAsFailures>,
    impl Fn(&http::Request<tonic::body::BoxBody>) -> tracing::Span + Clone,
> {
    TraceLayer::new_for_grpc().make_span_with(|request: &http::Request<tonic::body::BoxBody>| {
        let correlation_id = request
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let path = request.uri().path();
        tracing::info_span!("grpc", %correlation_id, %path)
    })
}

/// Resolve once Ctrl+C is received.
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
    }
}
