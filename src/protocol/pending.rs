//! Correlation map for in-flight requests

use super::error::ProtocolError;
use super::types::SubscriptionKind;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::oneshot;

/// Delivers the outcome of one request to its caller
pub type Responder = oneshot::Sender<Result<Value, ProtocolError>>;

/// Subscription to register when the acknowledgement arrives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeIntent {
    pub kind: SubscriptionKind,
    pub target: String,
}

/// A request waiting for its response
#[derive(Debug)]
pub struct PendingRequest {
    pub req_id: u64,
    pub created_at: Instant,
    pub subscribe: Option<SubscribeIntent>,
    responder: Responder,
}

impl PendingRequest {
    pub fn new(req_id: u64, responder: Responder, subscribe: Option<SubscribeIntent>) -> Self {
        Self {
            req_id,
            created_at: Instant::now(),
            subscribe,
            responder,
        }
    }

    /// Hand the outcome to the waiting caller; consumes the entry
    pub fn complete(self, result: Result<Value, ProtocolError>) {
        // The caller may have given up already (timeout or cancellation).
        let _ = self.responder.send(result);
    }
}

/// Pending requests keyed by `req_id`
///
/// Every entry leaves the map exactly once: through [`take`](Self::take) on a
/// response, [`remove`](Self::remove) on timeout, or
/// [`reject_all`](Self::reject_all) on disconnect.
#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: HashMap<u64, PendingRequest>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, request: PendingRequest) {
        self.entries.insert(request.req_id, request);
    }

    pub fn contains(&self, req_id: u64) -> bool {
        self.entries.contains_key(&req_id)
    }

    /// Remove the entry for a response that just arrived
    pub fn take(&mut self, req_id: u64) -> Option<PendingRequest> {
        self.entries.remove(&req_id)
    }

    /// Drop an entry whose caller stopped waiting; true if it was still pending
    pub fn remove(&mut self, req_id: u64) -> bool {
        self.entries.remove(&req_id).is_some()
    }

    /// Fail every pending request with the same error; returns how many
    pub fn reject_all(&mut self, err: ProtocolError) -> usize {
        let count = self.entries.len();
        for (_, request) in self.entries.drain() {
            request.complete(Err(err.clone()));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
