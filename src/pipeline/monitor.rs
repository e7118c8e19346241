//! Downstream consumer liveness
//!
//! The hosting request layer exposes one capability: "has the consumer gone
//! away". The monitor polls it on a short fixed interval and trips the
//! shared cancel token the moment the consumer disappears.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::utils::cancel::CancelToken;

/// Polling interval for consumer liveness checks
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Liveness signal provided by the hosting layer.
///
/// This is the only interface the pipeline needs from the surrounding
/// server framework.
#[async_trait]
pub trait ConnectionWatcher: Send + Sync {
    /// Whether the downstream consumer has gone away
    async fn is_disconnected(&self) -> bool;
}

/// Watcher for consumers that cannot disconnect (buffered mode, tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConnected;

#[async_trait]
impl ConnectionWatcher for AlwaysConnected {
    async fn is_disconnected(&self) -> bool {
        false
    }
}

/// Poll the watcher until disconnection or until the run is already being
/// cancelled by other means.
pub(crate) async fn watch_connection(watcher: Arc<dyn ConnectionWatcher>, cancel: CancelToken) {
    while !cancel.is_cancelled() {
        if watcher.is_disconnected().await {
            tracing::info!("consumer disconnected, cancelling pipeline");
            cancel.cancel();
            break;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
