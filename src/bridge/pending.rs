// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::protocol::CommandResult;

/// The correlation table: one single-use resolution slot per outstanding
/// command id.
///
/// Exactly one resolution happens per registration: the oneshot channel
/// enforces at-most-once delivery, and a result arriving for an id that
/// already timed out (and was discarded) finds no slot and is dropped.
#[derive(Debug, Default)]
pub struct PendingCommands {
    inner: Mutex<HashMap<String, oneshot::Sender<CommandResult>>>,
}

impl PendingCommands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending slot for `id` and return its receiver. Re-using an
    /// id that is still pending replaces the slot; the superseded waiter
    /// observes a dropped channel and fails.
    pub fn register(&self, id: impl Into<String>) -> oneshot::Receiver<CommandResult> {
        let (sender, receiver) = oneshot::channel();
        let mut inner = self.inner.lock().expect("pending lock poisoned");
        inner.insert(id.into(), sender);
        receiver
    }

    /// Deliver `result` to the waiter registered under `id`. Returns false
    /// when no waiter exists (already resolved, timed out, or never known).
    pub fn complete(&self, id: &str, result: CommandResult) -> bool {
        let sender = {
            let mut inner = self.inner.lock().expect("pending lock poisoned");
            inner.remove(id)
        };
        match sender {
            Some(sender) => sender.send(result).is_ok(),
            None => false,
        }
    }

    /// Drop the slot for `id` without resolving it. Used by the timeout path
    /// so a late result cannot reach a second waiter.
    pub fn discard(&self, id: &str) {
        let mut inner = self.inner.lock().expect("pending lock poisoned");
        inner.remove(id);
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("pending lock poisoned");
        inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_resolves_the_registered_waiter() {
        let pending = PendingCommands::new();
        let receiver = pending.register("c-1");
        assert!(pending.complete("c-1", CommandResult::ok()));
        let result = receiver.await.expect("resolved");
        assert!(result.success);
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn completing_twice_delivers_only_once() {
        let pending = PendingCommands::new();
        let receiver = pending.register("c-1");
        assert!(pending.complete("c-1", CommandResult::ok()));
        assert!(!pending.complete("c-1", CommandResult::fail("duplicate")));
        let result = receiver.await.expect("resolved once");
        assert!(result.success);
    }

    #[tokio::test]
    async fn discarded_ids_reject_late_results() {
        let pending = PendingCommands::new();
        let receiver = pending.register("c-1");
        pending.discard("c-1");
        assert!(!pending.complete("c-1", CommandResult::ok()));
        assert!(receiver.await.is_err());
    }

    #[tokio::test]
    async fn reusing_a_pending_id_supersedes_the_old_waiter() {
        let pending = PendingCommands::new();
        let first = pending.register("c-1");
        let second = pending.register("c-1");
        assert!(pending.complete("c-1", CommandResult::ok()));
        assert!(first.await.is_err());
        assert!(second.await.expect("second resolved").success);
    }
}
