//! Store availability gate used before every store access.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domains::storage::DocumentStore;

pub struct StoreGuard {
    store: Arc<dyn DocumentStore>,
    short_retry: Duration,
    long_retry: Duration,
}

impl StoreGuard {
    pub fn new(store: Arc<dyn DocumentStore>, short_retry: Duration, long_retry: Duration) -> Self {
        Self {
            store,
            short_retry,
            long_retry,
        }
    }

    /// Block until the store answers a connection check.
    ///
    /// On a failed check: wait the short interval and reconnect once; if that
    /// fails too, keep reconnecting every long interval. Returns `false` only
    /// when `cancel` fires first.
    pub async fn ensure(&self, cancel: &CancellationToken) -> bool {
        let Err(e) = self.store.check_connection().await else {
            return true;
        };
        warn!(error = %e, "Database connection check failed");

        if !sleep_or_cancel(self.short_retry, cancel).await {
            return false;
        }
        match self.store.reconnect().await {
            Ok(()) => return true,
            Err(e) => error!(error = %e, "Failed to reconnect to database"),
        }

        loop {
            info!(
                retry_in_secs = self.long_retry.as_secs(),
                "Waiting before next reconnection attempt"
            );
            if !sleep_or_cancel(self.long_retry, cancel).await {
                return false;
            }
            match self.store.reconnect().await {
                Ok(()) => return true,
                Err(e) => error!(error = %e, "Failed to reconnect to database"),
            }
        }
    }
}

/// `false` when cancelled before the delay elapsed.
pub(crate) async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
