use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::protocol::RequestId;
use crate::Result;

/// Tracks pending requests waiting for responses
///
/// Owns id allocation and a HashMap from request ids to oneshot senders.
/// When a response arrives, the sender delivers the settled outcome to the
/// waiting future. Each entry settles exactly once: completion consumes the
/// sender, so a duplicate response or a response after timeout is a no-op.
pub(crate) struct PendingRequests {
    // ---
    next_id: u64,
    max_id: u64,
    requests: HashMap<RequestId, oneshot::Sender<Result<Value>>>,
}

impl PendingRequests {
    // ---

    /// Create an empty registry whose id allocation wraps past `max_id`.
    pub fn new(max_id: u64) -> Self {
        // ---
        Self {
            next_id: 0,
            max_id,
            requests: HashMap::new(),
        }
    }

    /// Allocate the next request id, wrapping back to 1 past the ceiling.
    ///
    /// Wrap-around reusing a still-outstanding id is not guarded against;
    /// the ceiling is expected to vastly exceed realistic concurrency.
    fn allocate(&mut self) -> RequestId {
        // ---
        self.next_id = if self.next_id >= self.max_id {
            1
        } else {
            self.next_id + 1
        };
        RequestId::from(self.next_id)
    }

    /// Register a new pending request.
    ///
    /// Returns the allocated id and a receiver that resolves when the
    /// matching response arrives.
    pub fn register(&mut self) -> (RequestId, oneshot::Receiver<Result<Value>>) {
        // ---
        let id = self.allocate();
        let (tx, rx) = oneshot::channel();
        self.requests.insert(id, tx);
        (id, rx)
    }

    /// Settle a pending request with the response outcome.
    ///
    /// Returns true if the id was found. A receiver that has already been
    /// dropped (request timed out) absorbs the outcome silently; the entry
    /// is removed either way.
    pub fn complete(&mut self, id: RequestId, outcome: Result<Value>) -> bool {
        // ---
        if let Some(tx) = self.requests.remove(&id) {
            if tx.send(outcome).is_err() {
                debug!(%id, "response arrived after request was abandoned");
            }
            true
        } else {
            false
        }
    }

    /// Remove a pending request without settling it.
    ///
    /// Used to undo registration when the transport send fails.
    pub fn discard(&mut self, id: RequestId) -> bool {
        // ---
        self.requests.remove(&id).is_some()
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        // ---
        self.requests.len()
    }
}
