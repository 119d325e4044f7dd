//! Request bridge between the MCP server and the Studio plugin
//!
//! The plugin cannot accept connections, so tool calls are parked in a
//! correlation store until the plugin polls for them and posts a result back.
//! Tracker and store share one lock so a handler never sees a half-applied update.

pub mod error;
pub mod store;
pub mod tracker;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

pub use error::BridgeError;
use store::{CallResult, CorrelationStore, DeliveredCall};
use tracker::{ConnectionSnapshot, ConnectionTracker, StatusReport};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The single call the MCP tool layer makes into the bridge.
#[async_trait]
pub trait RequestSender: Send + Sync {
    async fn send_request(&self, endpoint: &str, payload: Value) -> Result<Value, BridgeError>;
}

#[derive(Debug, Default)]
struct BridgeInner {
    tracker: ConnectionTracker,
    store: CorrelationStore,
}

#[derive(Debug)]
pub struct BridgeService {
    inner: Mutex<BridgeInner>,
    request_timeout: Duration,
}

impl Default for BridgeService {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

impl BridgeService {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(BridgeInner::default()),
            request_timeout,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub async fn mark_transport_listening(&self) {
        self.inner.lock().await.tracker.mark_transport_listening();
    }

    pub async fn mark_tool_protocol_active(&self) {
        self.inner.lock().await.tracker.mark_tool_protocol_active();
    }

    /// Handles a plugin poll: records contact and hands out the oldest queued
    /// call, if any.
    pub async fn poll(&self) -> Result<Option<DeliveredCall>, BridgeError> {
        let mut inner = self.inner.lock().await;
        if !inner.tracker.is_tool_protocol_active() {
            return Err(BridgeError::NotReady);
        }

        inner.tracker.mark_remote_seen();
        Ok(inner.store.dequeue_next())
    }

    pub async fn mark_remote_ready(&self) {
        self.inner.lock().await.tracker.mark_remote_seen();
    }

    /// Marks the plugin gone, then fails everything still outstanding. Both
    /// happen under one lock so a concurrent poll cannot pick up a call that
    /// is about to be cancelled.
    pub async fn disconnect_remote(&self) -> usize {
        let mut inner = self.inner.lock().await;
        inner.tracker.mark_remote_disconnected("explicit_disconnect");
        inner.store.cancel_all("remote disconnected")
    }

    /// Routes a plugin result to the caller waiting on `id`.
    pub async fn deliver_response(&self, id: Uuid, result: CallResult) -> Result<(), BridgeError> {
        if self.inner.lock().await.store.complete(id, result) {
            Ok(())
        } else {
            Err(BridgeError::UnknownCorrelation { id })
        }
    }

    /// Expires calls older than the configured request timeout.
    pub async fn cleanup_old_requests(&self) -> usize {
        let expired = self
            .inner
            .lock()
            .await
            .store
            .expire_older_than(self.request_timeout);
        if expired > 0 {
            warn!(
                expired,
                timeout_secs = self.request_timeout.as_secs(),
                "expired stale requests"
            );
        }
        expired
    }

    pub async fn expire_idle_remote(&self, idle: Duration) -> bool {
        self.inner.lock().await.tracker.expire_idle_remote(idle)
    }

    /// Fails every outstanding call; used on shutdown.
    pub async fn cancel_all(&self, reason: &str) -> usize {
        self.inner.lock().await.store.cancel_all(reason)
    }

    pub async fn snapshot(&self) -> ConnectionSnapshot {
        self.inner.lock().await.tracker.snapshot()
    }

    pub async fn status(&self) -> StatusReport {
        let inner = self.inner.lock().await;
        StatusReport::new(inner.tracker.snapshot(), inner.store.len())
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.lock().await.store.len()
    }
}

#[async_trait]
impl RequestSender for BridgeService {
    async fn send_request(&self, endpoint: &str, payload: Value) -> Result<Value, BridgeError> {
        let (id, receiver) = self.inner.lock().await.store.enqueue(endpoint, payload);
        debug!(request_id = %id, endpoint, "awaiting plugin response");

        receiver.await.unwrap_or(Err(BridgeError::Abandoned))
    }
}
