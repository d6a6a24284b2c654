//! Expiration Sweep Task
//!
//! Background task that periodically drops entries whose sliding window
//! has elapsed from a [`MemoryBackend`].

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::MemoryBackend;

/// Spawns a background task that periodically sweeps expired entries.
///
/// Expired entries are already reported absent on read; the sweep only
/// reclaims the memory of entries nobody reads again.
///
/// # Arguments
/// * `backend` - shared reference to the backend to sweep
/// * `cleanup_interval_secs` - seconds between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort it on shutdown.
///
/// # Example
/// ```ignore
/// let backend = Arc::new(MemoryBackend::new());
/// let handle = spawn_cleanup_task(backend.clone(), 1);
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_cleanup_task(backend: Arc<MemoryBackend>, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting expiration sweep with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = backend.cleanup_expired();

            if removed > 0 {
                info!("Expiration sweep: removed {} expired entries", removed);
            } else {
                debug!("Expiration sweep: no expired entries found");
            }
        }
    })
}
