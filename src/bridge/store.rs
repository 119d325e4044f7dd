//! Outstanding plugin calls, in arrival order.
//!
//! `queue` holds the ids still waiting for a poll; `calls` holds every call
//! that has not settled yet, queued or delivered. An id leaves both the
//! moment its completion slot is settled.

use std::collections::{HashMap, VecDeque};

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

use super::error::BridgeError;

pub type CallResult = Result<Value, BridgeError>;
pub type CompletionReceiver = oneshot::Receiver<CallResult>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Queued,
    Delivered,
}

#[derive(Debug)]
pub struct PendingCall {
    pub id: Uuid,
    pub endpoint: String,
    pub payload: Value,
    pub created_at: Instant,
    state: CallState,
    completion: oneshot::Sender<CallResult>,
}

impl PendingCall {
    pub fn state(&self) -> CallState {
        self.state
    }

    fn settle(self, result: CallResult) {
        // The caller may have stopped waiting; nothing left to notify then.
        let _ = self.completion.send(result);
    }
}

/// A call handed to the plugin by `dequeue_next`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveredCall {
    pub id: Uuid,
    pub endpoint: String,
    pub payload: Value,
}

/// Pending calls keyed by id, plus the poll order of those not yet delivered.
///
/// `calls` decides settlement: a call is outstanding exactly while its id is in
/// the map, and removing it is the only way to settle it. `queue` only orders
/// the `Queued` ids for `dequeue_next`; delivered calls live in the map alone.
#[derive(Debug, Default)]
pub struct CorrelationStore {
    calls: HashMap<Uuid, PendingCall>,
    queue: VecDeque<Uuid>,
}

impl CorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(
        &mut self,
        endpoint: impl Into<String>,
        payload: Value,
    ) -> (Uuid, CompletionReceiver) {
        let (completion, receiver) = oneshot::channel();
        let id = Uuid::new_v4();
        let call = PendingCall {
            id,
            endpoint: endpoint.into(),
            payload,
            created_at: Instant::now(),
            state: CallState::Queued,
            completion,
        };

        debug!(request_id = %id, endpoint = %call.endpoint, "request queued");
        self.calls.insert(id, call);
        self.queue.push_back(id);
        (id, receiver)
    }

    /// Pops the oldest queued call and marks it delivered.
    pub fn dequeue_next(&mut self) -> Option<DeliveredCall> {
        while let Some(id) = self.queue.pop_front() {
            let Some(call) = self.calls.get_mut(&id) else {
                continue;
            };

            call.state = CallState::Delivered;
            debug!(request_id = %id, endpoint = %call.endpoint, "request delivered to plugin");
            return Some(DeliveredCall {
                id,
                endpoint: call.endpoint.clone(),
                payload: call.payload.clone(),
            });
        }

        None
    }

    /// Settles `id` with `result`. Returns false when `id` is unknown or
    /// already settled.
    pub fn complete(&mut self, id: Uuid, result: CallResult) -> bool {
        let Some(call) = self.calls.remove(&id) else {
            return false;
        };

        if call.state == CallState::Queued {
            self.queue.retain(|queued| *queued != id);
        }

        debug!(
            request_id = %id,
            endpoint = %call.endpoint,
            elapsed_ms = call.created_at.elapsed().as_millis(),
            "request completed"
        );
        call.settle(result);
        true
    }

    /// Fails every call older than `max_age` with a timeout. Returns how many
    /// calls expired.
    pub fn expire_older_than(&mut self, max_age: Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<Uuid> = self
            .calls
            .values()
            .filter(|call| now.duration_since(call.created_at) > max_age)
            .map(|call| call.id)
            .collect();

        if expired.is_empty() {
            return 0;
        }

        self.queue.retain(|id| !expired.contains(id));
        for id in &expired {
            if let Some(call) = self.calls.remove(id) {
                info!(request_id = %id, endpoint = %call.endpoint, "request expired");
                let waited = now.duration_since(call.created_at);
                call.settle(Err(BridgeError::Timeout { waited }));
            }
        }

        expired.len()
    }

    /// Fails every outstanding call with a disconnect and empties the store.
    pub fn cancel_all(&mut self, reason: &str) -> usize {
        self.queue.clear();
        let cancelled = self.calls.len();
        for (id, call) in self.calls.drain() {
            info!(request_id = %id, endpoint = %call.endpoint, reason, "request cancelled");
            call.settle(Err(BridgeError::disconnected(reason)));
        }

        cancelled
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn state_of(&self, id: &Uuid) -> Option<CallState> {
        self.calls.get(id).map(PendingCall::state)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn dequeues_in_enqueue_order_exactly_once() {
        let mut store = CorrelationStore::new();
        let ids: Vec<Uuid> = (0..5)
            .map(|index| store.enqueue("/api/op", json!({ "index": index })).0)
            .collect();

        let delivered: Vec<DeliveredCall> = std::iter::from_fn(|| store.dequeue_next()).collect();

        assert_eq!(delivered.iter().map(|call| call.id).collect::<Vec<_>>(), ids);
        assert_eq!(delivered[3].payload, json!({ "index": 3 }));
        assert!(store.dequeue_next().is_none());
        assert_eq!(store.len(), 5);
        assert_eq!(store.queued_len(), 0);
        assert_eq!(store.state_of(&ids[0]), Some(CallState::Delivered));
    }

    #[tokio::test]
    async fn complete_settles_once_and_ignores_repeats() {
        let mut store = CorrelationStore::new();
        let (id, receiver) = store.enqueue("/api/op", json!({ "x": 1 }));
        store.dequeue_next().expect("queued call");

        assert!(store.complete(id, Ok(json!({ "y": 2 }))));
        assert!(!store.complete(id, Ok(json!({ "y": 3 }))));
        assert!(!store.complete(Uuid::new_v4(), Ok(json!(null))));

        let result = receiver.await.expect("settled");
        assert_eq!(result, Ok(json!({ "y": 2 })));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn complete_tolerates_calls_that_were_never_polled() {
        let mut store = CorrelationStore::new();
        let (first, first_rx) = store.enqueue("/api/first", json!({}));
        let (second, _second_rx) = store.enqueue("/api/second", json!({}));

        assert!(store.complete(first, Ok(json!("early"))));
        assert_eq!(first_rx.await.expect("settled"), Ok(json!("early")));

        let next = store.dequeue_next().expect("second call");
        assert_eq!(next.id, second);
        assert!(store.dequeue_next().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_only_touches_old_calls() {
        let mut store = CorrelationStore::new();
        let (old, old_rx) = store.enqueue("/api/old", json!({}));
        store.dequeue_next().expect("old call");

        tokio::time::advance(Duration::from_secs(20)).await;
        let (young, _young_rx) = store.enqueue("/api/young", json!({}));

        tokio::time::advance(Duration::from_secs(15)).await;
        assert_eq!(store.expire_older_than(Duration::from_secs(30)), 1);

        let result = old_rx.await.expect("settled");
        assert!(matches!(result, Err(BridgeError::Timeout { .. })));
        assert_eq!(store.state_of(&old), None);
        assert_eq!(store.state_of(&young), Some(CallState::Queued));
        assert!(!store.complete(old, Ok(json!("late"))));

        let next = store.dequeue_next().expect("young call");
        assert_eq!(next.id, young);
    }

    #[tokio::test]
    async fn cancel_all_empties_store_and_fails_waiters() {
        let mut store = CorrelationStore::new();
        let (_, queued_rx) = store.enqueue("/api/a", json!({}));
        let (_, delivered_rx) = store.enqueue("/api/b", json!({}));
        store.dequeue_next().expect("first call");

        assert_eq!(store.cancel_all("remote disconnected"), 2);
        assert!(store.is_empty());
        assert!(store.dequeue_next().is_none());

        for receiver in [queued_rx, delivered_rx] {
            assert_eq!(
                receiver.await.expect("settled"),
                Err(BridgeError::disconnected("remote disconnected"))
            );
        }
    }

    #[tokio::test]
    async fn map_decides_settlement_for_queued_and_delivered_calls() {
        let mut store = CorrelationStore::new();
        let (delivered, delivered_rx) = store.enqueue("/api/delivered", json!({}));
        let (queued, queued_rx) = store.enqueue("/api/queued", json!({}));
        let (last, _last_rx) = store.enqueue("/api/last", json!({}));
        store.dequeue_next().expect("first call");

        // Only the map knows about the delivered call.
        assert_eq!(store.queued_len(), 2);
        assert_eq!(store.len(), 3);

        assert!(store.complete(delivered, Ok(json!("done"))));
        assert!(store.complete(queued, Ok(json!("early"))));
        assert!(!store.complete(delivered, Ok(json!("again"))));
        assert!(!store.complete(queued, Ok(json!("again"))));

        assert_eq!(delivered_rx.await.expect("settled"), Ok(json!("done")));
        assert_eq!(queued_rx.await.expect("settled"), Ok(json!("early")));
        assert_eq!(store.queued_len(), 1);
        assert_eq!(store.dequeue_next().map(|call| call.id), Some(last));
    }

    #[test]
    fn settling_after_the_caller_left_is_harmless() {
        let mut store = CorrelationStore::new();
        let (id, receiver) = store.enqueue("/api/op", json!({}));
        drop(receiver);

        assert!(store.complete(id, Ok(json!({}))));
        assert!(store.is_empty());
    }
}
