//! Expiry sweeper.
//!
//! Periodically scans every registered endpoint and fails calls that have
//! waited longer than the endpoint TTL with a timeout reply. Entries are
//! claimed through the same remove-and-claim path the responder uses, so a
//! racing delivery and expiry never both complete a call.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::registry::EndpointRegistry;
use super::table::Completion;

/// Periodic TTL eviction over all registered endpoints.
#[derive(Debug, Clone)]
pub struct ExpirySweeper {
    registry: Arc<EndpointRegistry>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(registry: Arc<EndpointRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Run one sweep now. Returns how many calls were expired.
    pub async fn sweep_once(&self) -> usize {
        let now = Instant::now();
        let mut expired_total = 0;

        for endpoint in self.registry.endpoints().await {
            let expired = endpoint.table().expire_older_than(endpoint.ttl(), now).await;
            if expired.is_empty() {
                continue;
            }

            for pending in expired {
                warn!(
                    endpoint = %endpoint.id(),
                    correlation_id = %pending.correlation_id(),
                    age = ?pending.age(now),
                    "Pending call expired without a response"
                );
                pending.complete(Completion::Timeout);
                expired_total += 1;
            }
        }

        if expired_total > 0 {
            debug!(expired = expired_total, "Sweep complete");
        }
        expired_total
    }

    /// Spawn the periodic sweep loop.
    pub fn spawn(self) -> SweeperHandle {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            info!(interval = ?self.interval, "Expiry sweeper started");

            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep_once().await;
                    }
                    _ = cancel_rx.changed() => {
                        if *cancel_rx.borrow() {
                            info!("Expiry sweeper stopped");
                            break;
                        }
                    }
                }
            }
        });

        SweeperHandle {
            cancel: cancel_tx,
            task,
        }
    }
}

/// Handle to a running sweeper.
#[derive(Debug)]
pub struct SweeperHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop.
    pub fn stop(&self) {
        let _ = self.cancel.send(true);
    }

    /// Stop and wait for the loop to exit.
    pub async fn shutdown(self) {
        self.stop();
        let _ = self.task.await;
    }
}
