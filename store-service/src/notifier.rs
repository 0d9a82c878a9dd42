//! Internal notifier fan-out (spec.md §5 "batch RPC fan-out to the internal
//! notifier; fire-and-forget; failure must not affect the caller's
//! result"). The tenant admin/notifier service itself is an external
//! collaborator out of scope (spec.md §1); this crate only owns the
//! abstraction a caller plugs a concrete notifier into.

use std::sync::Arc;

use async_trait::async_trait;
use store_core::BatchUpdateResult;
use tracing::warn;

/// A sink for "a batch write committed" events. Implementations talk to
/// whatever downstream system cares (cache invalidation, webhooks, a
/// message bus); this crate never blocks a write on their outcome.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_batch_committed(&self, tenant_code: &str, result: &BatchUpdateResult) -> Result<(), String>;
}

/// The default notifier for tests and standalone use: does nothing.
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify_batch_committed(&self, _tenant_code: &str, _result: &BatchUpdateResult) -> Result<(), String> {
        Ok(())
    }
}

/// Dispatches `result` to `notifier` on its own task and returns
/// immediately. A notifier failure is logged, never propagated — per
/// spec.md §5, "notifications about completed writes may be dropped on
/// cancellation" and must never affect the caller's result.
pub fn fire_and_forget(notifier: Arc<dyn Notifier>, tenant_code: String, result: BatchUpdateResult) {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify_batch_committed(&tenant_code, &result).await {
            warn!(tenant_code, error = %e, "notifier fan-out failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_notifier_never_fails() {
        let notifier = NoopNotifier;
        let result = notifier.notify_batch_committed("ACME", &BatchUpdateResult::default()).await;
        assert!(result.is_ok());
    }
}
