//! Per-endpoint correlation table.
//!
//! Maps a correlation id to the response channel parked by the inbound call.
//! Every terminal transition (answered, expired, drained on shutdown) starts
//! by removing the entry under the table lock, so exactly one path ever owns a
//! [`PendingResponse`] and can complete it.

use std::collections::HashMap;
use std::time::Duration;

use prost_types::Timestamp;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{BrokerError, Result};
use crate::proto::{reply, Event as ProtoEvent, Failure, FailureKind, Reply};

/// Outbound half of an inbound call.
#[derive(Debug)]
pub enum ResponseChannel {
    /// Single-reply call (`Process`).
    Unary(oneshot::Sender<Reply>),
    /// Shared outbound half of a streaming call (`Exchange`).
    ///
    /// Each pending entry holds its own clone; the stream ends once the
    /// reader and every pending entry have dropped theirs.
    Stream(mpsc::UnboundedSender<Reply>),
}

impl ResponseChannel {
    fn send(self, reply: Reply) -> bool {
        match self {
            ResponseChannel::Unary(tx) => tx.send(reply).is_ok(),
            ResponseChannel::Stream(tx) => tx.send(reply).is_ok(),
        }
    }
}

/// Terminal outcome written to a pending call.
#[derive(Debug, Clone)]
pub enum Completion {
    /// Answer produced by the processing pipeline.
    Result(ProtoEvent),
    /// No answer within the endpoint TTL.
    Timeout,
    /// Endpoint stopped while the call was pending.
    Shutdown,
    /// Parked, but could not be handed to the pipeline.
    Rejected(String),
}

impl Completion {
    /// Label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Completion::Result(_) => "completed",
            Completion::Timeout => "expired",
            Completion::Shutdown => "discarded-on-shutdown",
            Completion::Rejected(_) => "rejected",
        }
    }
}

/// Build the wire reply for a correlation id and outcome.
pub fn build_reply(correlation_id: &str, completion: Completion) -> Reply {
    let outcome = match completion {
        Completion::Result(event) => reply::Outcome::Result(event),
        Completion::Timeout => reply::Outcome::Failure(Failure {
            kind: FailureKind::Timeout as i32,
            message: "no response within the configured ttl".to_string(),
        }),
        Completion::Shutdown => reply::Outcome::Failure(Failure {
            kind: FailureKind::Shutdown as i32,
            message: "endpoint shut down before a response was produced".to_string(),
        }),
        Completion::Rejected(message) => reply::Outcome::Failure(Failure {
            kind: FailureKind::Rejected as i32,
            message,
        }),
    };

    let now = chrono::Utc::now();
    Reply {
        correlation_id: correlation_id.to_string(),
        outcome: Some(outcome),
        completed_at: Some(Timestamp {
            seconds: now.timestamp(),
            nanos: now.timestamp_subsec_nanos() as i32,
        }),
    }
}

/// A parked response channel awaiting a result, expiry, or shutdown.
///
/// Only reachable through the table until claimed; completing consumes it,
/// so a second write to the same channel cannot be expressed.
#[derive(Debug)]
pub struct PendingResponse {
    correlation_id: String,
    channel: ResponseChannel,
    registered_at: Instant,
}

impl PendingResponse {
    /// Park a channel, stamped with the current time.
    pub fn new(correlation_id: impl Into<String>, channel: ResponseChannel) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            channel,
            registered_at: Instant::now(),
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn registered_at(&self) -> Instant {
        self.registered_at
    }

    /// Age relative to `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.registered_at)
    }

    /// Write the terminal reply.
    ///
    /// Returns false when the caller has already gone away; the transition
    /// is terminal either way.
    pub fn complete(self, completion: Completion) -> bool {
        let label = completion.label();
        let reply = build_reply(&self.correlation_id, completion);
        let delivered = self.channel.send(reply);
        if !delivered {
            debug!(
                correlation_id = %self.correlation_id,
                outcome = label,
                "Caller disconnected before reply could be written"
            );
        }
        delivered
    }
}

#[derive(Debug, Default)]
struct TableState {
    entries: HashMap<String, PendingResponse>,
    closed: bool,
}

/// Correlation id -> pending response, owned by one endpoint.
#[derive(Debug)]
pub struct CorrelationTable {
    endpoint_id: String,
    state: Mutex<TableState>,
}

impl CorrelationTable {
    /// Create an empty, open table for an endpoint.
    pub fn new(endpoint_id: impl Into<String>) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            state: Mutex::new(TableState::default()),
        }
    }

    /// Insert if absent.
    ///
    /// An existing entry under the same id is left untouched and the new one
    /// is rejected with [`BrokerError::DuplicateCorrelation`].
    pub async fn insert(&self, pending: PendingResponse) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(BrokerError::EndpointClosed(self.endpoint_id.clone()));
        }
        if state.entries.contains_key(&pending.correlation_id) {
            return Err(BrokerError::DuplicateCorrelation {
                endpoint: self.endpoint_id.clone(),
                correlation_id: pending.correlation_id,
            });
        }
        state
            .entries
            .insert(pending.correlation_id.clone(), pending);
        Ok(())
    }

    /// Remove and claim an entry.
    ///
    /// At most one caller receives `Some` for a given registration.
    pub async fn claim(&self, correlation_id: &str) -> Option<PendingResponse> {
        self.state.lock().await.entries.remove(correlation_id)
    }

    /// Remove and claim every entry strictly older than `ttl` at `now`.
    pub async fn expire_older_than(&self, ttl: Duration, now: Instant) -> Vec<PendingResponse> {
        let mut state = self.state.lock().await;
        let stale: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, pending)| pending.age(now) > ttl)
            .map(|(id, _)| id.clone())
            .collect();

        stale
            .iter()
            .filter_map(|id| state.entries.remove(id))
            .collect()
    }

    /// Close the table to new entries and claim everything still pending.
    pub async fn close_and_drain(&self) -> Vec<PendingResponse> {
        let mut state = self.state.lock().await;
        state.closed = true;
        state.entries.drain().map(|(_, pending)| pending).collect()
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    pub async fn contains(&self, correlation_id: &str) -> bool {
        self.state.lock().await.entries.contains_key(correlation_id)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
