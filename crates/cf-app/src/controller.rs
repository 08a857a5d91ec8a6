//! Federation controller daemon wiring: constructs the scheduler, performs
//! its first registry refresh, and drives its background loops until
//! shutdown (§4.8).

use cf_batch::BatchClient;
use cf_config::ResolvedConfig;
use cf_events::EventBus;
use cf_federation_data::{FederationData, GlobalLease};
use cf_scheduler::FederationScheduler;
use cf_storage::StorageClient;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::env::ControllerEnv;
use crate::error::{AppError, AppResult};

/// Constructs the scheduler over `storage`, performs an initial registry
/// refresh so `cancel`'s background loops start from a populated registry,
/// spawns those loops, and blocks until `cancel` fires.
///
/// # Errors
///
/// Returns [`AppError::Scheduler`] if the initial registry refresh fails.
pub async fn run(
    env: &ControllerEnv,
    resolved: &ResolvedConfig,
    storage: StorageClient,
    events: EventBus,
    cancel: CancellationToken,
) -> AppResult<()> {
    info!(node_id = %env.node_id, "starting federation controller");

    let data = FederationData::new(storage);
    let batch = BatchClient::new();
    let lease = GlobalLease::default();
    let blackout_interval = i64::try_from(resolved.blackout_interval).unwrap_or(i64::MAX);

    let scheduler = FederationScheduler::new(data, batch, events, lease, blackout_interval);
    scheduler
        .refresh_registry()
        .await
        .map_err(|source| AppError::scheduler("refresh_registry", source))?;
    info!(federations = scheduler.federation_count().await, "initial federation registry populated");

    let handles = scheduler.spawn(cancel.clone());
    cancel.cancelled().await;
    info!("shutdown signal received, waiting for scheduler loops to exit");
    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}
