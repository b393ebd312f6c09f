//! Endpoint registry - process-wide map of live inbound endpoints.
//!
//! Owned explicitly and passed by `Arc` to whatever needs it; independent
//! instances never share state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::endpoint::InboundEndpoint;
use crate::error::{BrokerError, Result};

/// Thread-safe registry of live endpoints keyed by endpoint id.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: RwLock<HashMap<String, Arc<InboundEndpoint>>>,
}

impl EndpointRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an endpoint under its id.
    ///
    /// Fails with [`BrokerError::Conflict`] if the id is already live.
    pub async fn register(&self, endpoint: Arc<InboundEndpoint>) -> Result<()> {
        let id = endpoint.id().to_string();
        let mut endpoints = self.endpoints.write().await;
        if endpoints.contains_key(&id) {
            warn!(endpoint = %id, "Endpoint id already registered");
            return Err(BrokerError::Conflict(id));
        }

        info!(
            endpoint = %id,
            stream = %endpoint.stream(),
            url = %endpoint.settings().url,
            "Registering endpoint"
        );
        endpoints.insert(id, endpoint);
        Ok(())
    }

    /// Remove a binding, failing every call still pending on it first.
    ///
    /// The registry write lock is held across the drain, so a concurrent
    /// lookup sees either the endpoint or [`BrokerError::NotFound`].
    pub async fn unregister(&self, id: &str) -> Result<Arc<InboundEndpoint>> {
        let mut endpoints = self.endpoints.write().await;
        let endpoint = endpoints
            .get(id)
            .cloned()
            .ok_or_else(|| BrokerError::NotFound(id.to_string()))?;

        let discarded = endpoint.shutdown().await;
        endpoints.remove(id);

        info!(endpoint = %id, discarded = discarded, "Endpoint unregistered");
        Ok(endpoint)
    }

    /// Find a live endpoint by id.
    pub async fn lookup(&self, id: &str) -> Result<Arc<InboundEndpoint>> {
        let endpoints = self.endpoints.read().await;
        endpoints.get(id).cloned().ok_or_else(|| {
            debug!(endpoint = %id, "Endpoint lookup missed");
            BrokerError::NotFound(id.to_string())
        })
    }

    /// Snapshot of every live endpoint.
    pub async fn endpoints(&self) -> Vec<Arc<InboundEndpoint>> {
        self.endpoints.read().await.values().cloned().collect()
    }

    /// Get list of all registered ids.
    pub async fn ids(&self) -> Vec<String> {
        self.endpoints.read().await.keys().cloned().collect()
    }

    /// Unregister every endpoint, draining each one.
    pub async fn shutdown_all(&self) -> usize {
        let ids = self.ids().await;
        let mut stopped = 0;
        for id in ids {
            if self.unregister(&id).await.is_ok() {
                stopped += 1;
            }
        }
        stopped
    }

    pub async fn len(&self) -> usize {
        self.endpoints.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
