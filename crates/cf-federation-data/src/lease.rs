//! The global lease (§4.3): a 15-second lease on a well-known blob, renewed
//! every 5 seconds for as long as the controller runs. While the lease is
//! held, `has_global_lock` is a cheap in-memory predicate; processing must
//! suspend whenever it reports `false`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::store::FederationData;

const LEASE_BLOB_NAME: &str = "global.lock";
const LEASE_DURATION_SECS: i64 = 15;
const RENEWAL_INTERVAL: Duration = Duration::from_secs(5);

/// Tracks whether the current process currently holds the global lease.
#[derive(Clone)]
pub struct GlobalLease {
    held: Arc<AtomicBool>,
    lease_id: Arc<Mutex<Option<Uuid>>>,
}

impl Default for GlobalLease {
    fn default() -> Self {
        Self {
            held: Arc::new(AtomicBool::new(false)),
            lease_id: Arc::new(Mutex::new(None)),
        }
    }
}

impl GlobalLease {
    /// Cheap predicate: does this process currently hold the lease?
    #[must_use]
    pub fn has_global_lock(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Runs the acquire/renew loop until `cancel` fires. Acquires a 15-s
    /// lease on `<fedglobal>/global.lock`, then renews it every 5 s. A
    /// renewal failure is treated as losing the lock: `has_global_lock`
    /// flips to `false` until the next acquisition succeeds, and the
    /// caller's processing loops must check it before doing any work.
    pub async fn run(&self, data: &FederationData, cancel: CancellationToken) {
        let container = data.client().namespace().fedglobal_container();
        let mut ticker = tokio::time::interval(RENEWAL_INTERVAL);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("global lease loop cancelled");
                    return;
                }
                _ = ticker.tick() => {
                    self.tick(data, &container).await;
                }
            }
        }
    }

    async fn tick(&self, data: &FederationData, container: &str) {
        let mut guard = self.lease_id.lock().await;
        match *guard {
            Some(lease_id) => match data
                .client()
                .renew_lease(container, LEASE_BLOB_NAME, lease_id, LEASE_DURATION_SECS)
                .await
            {
                Ok(true) => {
                    self.held.store(true, Ordering::Release);
                }
                Ok(false) | Err(_) => {
                    warn!("global lease renewal failed, suspending processing until re-acquired");
                    self.held.store(false, Ordering::Release);
                    *guard = None;
                }
            },
            None => {
                match data.client().acquire_lease(container, LEASE_BLOB_NAME, LEASE_DURATION_SECS).await {
                    Ok(lease_id) => {
                        info!("acquired global lease");
                        *guard = Some(lease_id);
                        self.held.store(true, Ordering::Release);
                    }
                    Err(err) => {
                        error!(%err, "global lease unavailable, another process holds it");
                        self.held.store(false, Ordering::Release);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_starts_unheld() {
        let lease = GlobalLease::default();
        assert!(!lease.has_global_lock());
    }
}
