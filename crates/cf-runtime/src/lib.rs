#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Node-local persistence for cascade resource lifecycle state (§4.6), so a
//! restarted node recovers what it was pulling, loading, or seeding without
//! redriving the whole pipeline from scratch.

use anyhow::{Context, Result};
use cf_core::TorrentLifecycleState;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

/// One resource's persisted lifecycle snapshot on this node.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeResourceEntry {
    /// `SHA1(resource)`.
    pub resource_hash: String,
    /// Raw `docker:<image>` / `singularity:<image>` string.
    pub resource: String,
    /// Current lifecycle state (§4.6).
    pub state: TorrentLifecycleState,
    /// Path to the uploaded `.torrent` file, once built.
    pub torrent_file_path: Option<String>,
    /// Scratch directory or file the session was pointed at.
    pub save_path: Option<String>,
    /// Last time this row was written.
    pub updated_at: DateTime<Utc>,
}

const UPSERT_RESOURCE_SQL: &str = r"
    INSERT INTO cf_runtime.resources (
        resource_hash, resource, state, torrent_file_path, save_path, updated_at
    )
    VALUES ($1, $2, $3::cf_runtime.resource_state, $4, $5, $6)
    ON CONFLICT (resource_hash) DO UPDATE
    SET
        resource = EXCLUDED.resource,
        state = EXCLUDED.state,
        torrent_file_path = EXCLUDED.torrent_file_path,
        save_path = EXCLUDED.save_path,
        updated_at = EXCLUDED.updated_at
";

const DELETE_RESOURCE_SQL: &str = "DELETE FROM cf_runtime.resources WHERE resource_hash = $1";

const SELECT_RESOURCES_SQL: &str = r"
    SELECT resource_hash, resource, state::TEXT AS state, torrent_file_path, save_path, updated_at
    FROM cf_runtime.resources
";

/// Database-backed repository for node-local cascade resource state.
#[derive(Clone)]
pub struct RuntimeStore {
    pool: PgPool,
}

impl RuntimeStore {
    /// Initialise the runtime store, applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail or the database is unreachable.
    pub async fn new(pool: PgPool) -> Result<Self> {
        let mut migrator = sqlx::migrate!("./migrations");
        migrator.set_ignore_missing(true);
        migrator.run(&pool).await.context("failed to run runtime migrations")?;
        Ok(Self { pool })
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Upsert a resource's lifecycle snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn upsert_resource(&self, entry: &CascadeResourceEntry) -> Result<()> {
        sqlx::query(UPSERT_RESOURCE_SQL)
            .bind(&entry.resource_hash)
            .bind(&entry.resource)
            .bind(state_label(entry.state))
            .bind(entry.torrent_file_path.as_deref())
            .bind(entry.save_path.as_deref())
            .bind(entry.updated_at)
            .execute(&self.pool)
            .await
            .context("failed to upsert cascade resource state")?;
        Ok(())
    }

    /// Remove a resource's persisted state, e.g. once it is pruned from the
    /// node's manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn remove_resource(&self, resource_hash: &str) -> Result<()> {
        sqlx::query(DELETE_RESOURCE_SQL)
            .bind(resource_hash)
            .execute(&self.pool)
            .await
            .context("failed to remove cascade resource state")?;
        Ok(())
    }

    /// Load every persisted resource entry, e.g. to seed the engine's
    /// in-memory catalog on startup.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn load_resources(&self) -> Result<Vec<CascadeResourceEntry>> {
        let rows = sqlx::query(SELECT_RESOURCES_SQL)
            .fetch_all(&self.pool)
            .await
            .context("failed to load cascade resource catalog")?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let state_label: String = row.try_get("state")?;
            entries.push(CascadeResourceEntry {
                resource_hash: row.try_get("resource_hash")?,
                resource: row.try_get("resource")?,
                state: parse_state(&state_label),
                torrent_file_path: row.try_get("torrent_file_path")?,
                save_path: row.try_get("save_path")?,
                updated_at: row.try_get("updated_at")?,
            });
        }
        Ok(entries)
    }
}

const fn state_label(state: TorrentLifecycleState) -> &'static str {
    match state {
        TorrentLifecycleState::Pending => "pending",
        TorrentLifecycleState::Started => "started",
        TorrentLifecycleState::SeedReady => "seed_ready",
        TorrentLifecycleState::Loaded => "loaded",
        TorrentLifecycleState::Registered => "registered",
    }
}

fn parse_state(label: &str) -> TorrentLifecycleState {
    match label {
        "started" => TorrentLifecycleState::Started,
        "seed_ready" => TorrentLifecycleState::SeedReady,
        "loaded" => TorrentLifecycleState::Loaded,
        "registered" => TorrentLifecycleState::Registered,
        other => {
            if other != "pending" {
                tracing::warn!(state = %other, "unknown cascade resource state encountered in runtime store");
            }
            TorrentLifecycleState::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_label_round_trips() {
        for state in [
            TorrentLifecycleState::Pending,
            TorrentLifecycleState::Started,
            TorrentLifecycleState::SeedReady,
            TorrentLifecycleState::Loaded,
            TorrentLifecycleState::Registered,
        ] {
            assert_eq!(parse_state(state_label(state)), state);
        }
    }

    #[test]
    fn unknown_label_falls_back_to_pending() {
        assert_eq!(parse_state("bogus"), TorrentLifecycleState::Pending);
    }
}
