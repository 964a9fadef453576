//! Background expiry sweep for the translation cache.
//! Runs on a fixed interval, independent of user activity. Safe against
//! in-flight lookups and stores: every cache operation is synchronous and
//! non-suspending, so a sweep never observes a half-applied mutation.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::translate::TranslationCache;

/// Spawn the sweep loop. The returned handle can be aborted on shutdown.
pub fn spawn_expiry_sweep(cache: Arc<TranslationCache>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "expiry_sweep_started");

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.expire();
            if removed > 0 {
                info!(removed, remaining = cache.len(), "expiry_sweep_removed");
            } else {
                debug!(
                    entries = cache.len(),
                    lru_idle_secs = cache.lru_idle().map(|d| d.as_secs()).unwrap_or(0),
                    "expiry_sweep_clean"
                );
            }
        }
    })
}
