//! TTL Sweep Task
//!
//! Background task that periodically clears expired weak entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheStore;

/// Spawns a background task that periodically clears expired cache entries.
///
/// Each tick extracts the keys whose deadline has passed from the store's expiry tracker and
/// clears them through the store, so `clear` notifications fire as for any other removal.
///
/// # Arguments
/// * `cache` - shared cache store
/// * `interval` - time between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(RwLock::new(CacheStore::new(1_000_000, 10_000, 3600)));
/// let sweep = spawn_expiry_task(cache.clone(), Duration::from_secs(10));
/// // Later, during shutdown:
/// sweep.abort();
/// ```
pub fn spawn_expiry_task(cache: Arc<RwLock<CacheStore>>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(?interval, "Starting TTL sweep task");

        loop {
            tokio::time::sleep(interval).await;

            let removed = {
                let mut cache_guard = cache.write().await;
                cache_guard.purge_expired()
            };

            if removed > 0 {
                info!("TTL sweep: removed {} expired entries", removed);
            } else {
                debug!("TTL sweep: no expired entries found");
            }
        }
    })
}
