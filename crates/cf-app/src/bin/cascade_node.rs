//! Cascade node daemon entry point.
//!
//! Reads `AZ_BATCH_NODE_ID`, `AZ_BATCH_ACCOUNT_NAME`, `AZ_BATCH_POOL_ID`,
//! `AZ_BATCH_NODE_ROOT_DIR`, optional `SINGULARITY_CACHEDIR` and
//! `SHIPYARD_STORAGE_ENV`, the configuration document path from
//! `CASCADEFED_CONFIG_PATH`, and a `p2popts=...` positional argument (§6).
//! When `p2popts` disables participation, the node exits immediately without
//! starting the torrent engine or container runtime.

use std::process::ExitCode;

use cf_app::bootstrap::{build_storage_client, connect_postgres, init_app_logging};
use cf_app::env::{NodeEnv, P2pOptions, config_path};
use cf_app::{AppError, node};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("cascade-node: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> cf_app::AppResult<()> {
    let raw_p2popts = std::env::args().nth(1).ok_or(AppError::MissingEnv { name: "p2popts" })?;
    let p2popts = P2pOptions::parse(&raw_p2popts)?;
    if !p2popts.enabled {
        info!("p2p distribution disabled for this node, exiting");
        return Ok(());
    }

    let env = NodeEnv::from_process()?;
    let path = config_path(None);
    let resolved = cf_config::ConfigLoader::load(&path).map_err(|source| AppError::config("load", source))?;

    let _logging_guard = init_app_logging(&resolved)?;
    let pool = connect_postgres().await?;
    let runtime_store =
        cf_runtime::RuntimeStore::new(pool.clone()).await.map_err(|source| AppError::runtime("RuntimeStore::new", &source))?;
    let storage = build_storage_client(&resolved, pool, env.storage_override.as_ref()).await?;
    let events = cf_events::EventBus::new();

    let cancel = CancellationToken::new();
    let daemon_cancel = cancel.clone();
    let pull = p2popts.pull;
    let daemon =
        tokio::spawn(async move { node::run(&env, pull, storage, runtime_store, events, daemon_cancel).await });

    tokio::signal::ctrl_c().await.map_err(|source| AppError::io("wait for ctrl-c", None, source))?;
    info!("shutdown signal received");
    cancel.cancel();

    match daemon.await {
        Ok(result) => result,
        Err(source) => {
            error!(%source, "node task panicked");
            Err(AppError::io("join node task", None, std::io::Error::other(source)))
        }
    }
}
