// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Registry of calls waiting for their reply, keyed by correlation id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use nested_protocol::Response;
use tokio::sync::oneshot;
use tracing::debug;

type Slot = oneshot::Sender<Response>;

/// Shared map of correlation id to reply slot.
#[derive(Clone, Default)]
pub struct PendingCalls {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `correlation_id`. The id stays registered until the returned
    /// [`PendingCall`] is fulfilled or dropped.
    pub fn register(&self, correlation_id: impl Into<String>) -> PendingCall {
        let correlation_id = correlation_id.into();
        let (tx, rx) = oneshot::channel();
        let previous = self.slots().insert(correlation_id.clone(), tx);
        debug_assert!(previous.is_none(), "correlation id reused");
        PendingCall {
            correlation_id,
            rx,
            registry: self.clone(),
        }
    }

    /// Hand `response` to the call registered under `correlation_id`.
    ///
    /// Returns `false` when no such call is waiting (already answered,
    /// abandoned on timeout, or never issued); the response is discarded.
    pub fn fulfill(&self, correlation_id: &str, response: Response) -> bool {
        let Some(slot) = self.slots().remove(correlation_id) else {
            debug!(correlation_id, "discarding reply for unknown correlation id");
            return false;
        };
        if slot.send(response).is_err() {
            debug!(correlation_id, "caller stopped waiting, reply discarded");
            return false;
        }
        true
    }

    pub fn is_pending(&self, correlation_id: &str) -> bool {
        self.slots().contains_key(correlation_id)
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One outstanding call.
pub struct PendingCall {
    correlation_id: String,
    rx: oneshot::Receiver<Response>,
    registry: PendingCalls,
}

impl PendingCall {
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Wait for the reply. Returns `None` if the slot was dropped unanswered.
    pub async fn wait(&mut self) -> Option<Response> {
        (&mut self.rx).await.ok()
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        self.registry.slots().remove(&self.correlation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nested_protocol::status;

    fn reply(code: i32) -> Response {
        Response {
            status: code,
            message: None,
            object: None,
        }
    }

    #[tokio::test]
    async fn test_fulfill_delivers_once() {
        let registry = PendingCalls::new();
        let mut call = registry.register("corr-1");
        assert!(registry.is_pending("corr-1"));

        assert!(registry.fulfill("corr-1", reply(status::OK)));
        assert!(!registry.fulfill("corr-1", reply(status::INTERNAL_ERROR)));
        assert_eq!(call.wait().await.unwrap().status, status::OK);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_id_discarded() {
        let registry = PendingCalls::new();
        let _call = registry.register("corr-1");
        assert!(!registry.fulfill("corr-2", reply(status::OK)));
        assert!(registry.is_pending("corr-1"));
    }

    #[test]
    fn test_drop_unregisters() {
        let registry = PendingCalls::new();
        let call = registry.register("corr-1");
        assert_eq!(call.correlation_id(), "corr-1");
        drop(call);
        assert!(registry.is_empty());
        assert!(!registry.fulfill("corr-1", reply(status::OK)));
    }

    #[tokio::test]
    async fn test_calls_are_independent() {
        let registry = PendingCalls::new();
        let mut a = registry.register("a");
        let mut b = registry.register("b");
        registry.fulfill("b", reply(status::NOT_FOUND));
        registry.fulfill("a", reply(status::OK));
        assert_eq!(a.wait().await.unwrap().status, status::OK);
        assert_eq!(b.wait().await.unwrap().status, status::NOT_FOUND);
    }
}
