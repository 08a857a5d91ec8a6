//! Services and torrent-info table access (§3, §4.7 steps 4 and 6): records
//! which nodes seed a resource on a pool, and where its `.torrent` file lives.

use cf_core::{Resource, ServicesRow, TorrentInfoRow};
use cf_storage::{StorageClient, StorageError};

use crate::error::{FsOpsError, FsOpsResult};

/// Merges `node_id` into the resource's services row, retrying on a
/// concurrent-writer conflict until the merge lands (§8 "monotonically grows").
///
/// # Errors
///
/// Returns an error if the underlying storage operation fails for a reason
/// other than an etag conflict or a fresh-insert collision.
pub async fn merge_seeder(
    storage: &StorageClient,
    account: &str,
    pool_id: &str,
    resource: &Resource,
    node_id: &str,
) -> FsOpsResult<()> {
    let table = storage.namespace().images_table();
    let partition = format!("{account}${pool_id}");
    let resource_hash = resource.hash();

    loop {
        let existing = storage.get_entity(&table, &partition, &resource_hash).await?;
        let (mut row, etag) = match existing {
            Some(entity) => {
                let row: ServicesRow = serde_json::from_value(entity.properties)
                    .map_err(|source| FsOpsError::MalformedEntity { table: "images", source })?;
                (row, Some(entity.etag))
            }
            None => (
                ServicesRow {
                    partition: partition.clone(),
                    resource_hash: resource_hash.clone(),
                    resource: resource.as_str().to_string(),
                    vm_lists: Vec::new(),
                    etag: None,
                },
                None,
            ),
        };

        row.merge_node(node_id);
        let properties = serde_json::to_value(&row)
            .map_err(|source| FsOpsError::MalformedEntity { table: "images", source })?;

        let outcome = match etag {
            Some(etag) => storage.update(&table, &partition, &resource_hash, properties, etag).await,
            None => storage.insert(&table, &partition, &resource_hash, properties).await,
        };
        match outcome {
            Ok(_) => return Ok(()),
            Err(StorageError::Conflict { .. } | StorageError::AlreadyExists { .. }) => continue,
            Err(source) => return Err(source.into()),
        }
    }
}

/// Inserts the torrent-info row for a freshly-built `.torrent` file (§4.7 step 6).
///
/// # Errors
///
/// Returns an error if the insert fails for a reason other than the row
/// already existing, which is treated as success (another node raced us).
pub async fn insert_torrent_info(storage: &StorageClient, row: &TorrentInfoRow) -> FsOpsResult<()> {
    let table = storage.namespace().torrentinfo_table();
    let properties = serde_json::to_value(row).map_err(|source| FsOpsError::MalformedEntity { table: "torrentinfo", source })?;
    match storage.insert(&table, &row.partition, &row.resource_hash, properties).await {
        Ok(_) | Err(StorageError::AlreadyExists { .. }) => Ok(()),
        Err(source) => Err(source.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn torrent_info_row_serializes_to_json() {
        let row = TorrentInfoRow {
            partition: "acct$pool".into(),
            resource_hash: "abc".into(),
            torrent_file_locator: "tor-acct-pool,abc.torrent".into(),
            torrent_file_sha1: "deadbeef".into(),
            is_dir: false,
            content_size_bytes: 1024,
        };
        let encoded = serde_json::to_value(&row).expect("serializable");
        assert_eq!(encoded["resource_hash"], "abc");
    }
}
