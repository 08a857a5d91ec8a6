//! Federation controller daemon entry point.
//!
//! Reads `AZ_BATCH_NODE_ID` and `AZURE_SUBSCRIPTION_ID` from the environment,
//! and the configuration document path from `CASCADEFED_CONFIG_PATH` (§6).

use std::process::ExitCode;

use cf_app::bootstrap::{build_storage_client, connect_postgres, init_app_logging};
use cf_app::env::{ControllerEnv, config_path};
use cf_app::{AppError, controller};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("federation-controller: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> cf_app::AppResult<()> {
    let env = ControllerEnv::from_process()?;
    let path = config_path(None);
    let resolved = cf_config::ConfigLoader::load(&path).map_err(|source| AppError::config("load", source))?;

    let _logging_guard = init_app_logging(&resolved)?;
    let pool = connect_postgres().await?;
    let storage = build_storage_client(&resolved, pool, None).await?;
    let events = cf_events::EventBus::new();

    let cancel = CancellationToken::new();
    let daemon_cancel = cancel.clone();
    let daemon = tokio::spawn(async move { controller::run(&env, &resolved, storage, events, daemon_cancel).await });

    tokio::signal::ctrl_c().await.map_err(|source| AppError::io("wait for ctrl-c", None, source))?;
    info!("shutdown signal received");
    cancel.cancel();

    match daemon.await {
        Ok(result) => result,
        Err(source) => {
            error!(%source, "controller task panicked");
            Err(AppError::io("join controller task", None, std::io::Error::other(source)))
        }
    }
}
