//! Cascade resource identity and table-row shapes (§3 "Cascade domain").

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::hashing::resource_hash;

/// Maximum node ids packed into one `VmListN` string property (§3).
pub const MAX_IDS_PER_VM_LIST_PROPERTY: usize = 800;

/// Number of `VmListN` properties on a services-table row (§3).
pub const MAX_VM_LIST_PROPERTIES: usize = 13;

/// A container-image resource identifier: `docker:<image>` or `singularity:<image>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Resource {
    /// The raw `kind:image` string as carried in the manifest.
    raw: String,
    /// Container runtime the resource targets.
    pub runtime: ContainerRuntimeKind,
    /// Image reference portion (after the `kind:` prefix).
    pub image: String,
}

/// Which container runtime a resource targets (§9 "Polymorphism over container runtimes").
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContainerRuntimeKind {
    /// Docker-format image.
    Docker,
    /// Singularity-format image.
    Singularity,
}

impl Resource {
    /// Parses a manifest resource string of the form `docker:<image>` or
    /// `singularity:<image>`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedResource`] when the string lacks a
    /// recognized `kind:` prefix.
    pub fn parse(raw: &str) -> Result<Self> {
        let (prefix, image) = raw.split_once(':').ok_or_else(|| CoreError::MalformedResource {
            value: raw.to_string(),
        })?;
        let runtime = match prefix {
            "docker" => ContainerRuntimeKind::Docker,
            "singularity" => ContainerRuntimeKind::Singularity,
            _ => {
                return Err(CoreError::MalformedResource {
                    value: raw.to_string(),
                });
            }
        };
        if image.is_empty() {
            return Err(CoreError::MalformedResource {
                value: raw.to_string(),
            });
        }
        Ok(Self {
            raw: raw.to_string(),
            runtime,
            image: image.to_string(),
        })
    }

    /// The raw `kind:image` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `resource_hash = SHA1(resource)` (§3).
    #[must_use]
    pub fn hash(&self) -> String {
        resource_hash(&self.raw)
    }
}

/// Lifecycle state of one resource's torrent on this node (§4.6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TorrentLifecycleState {
    /// No session exists yet.
    Pending,
    /// A session is live and the torrent has a handle.
    Started,
    /// The handle reports `is_seed()`.
    SeedReady,
    /// The image has been materialized locally.
    Loaded,
    /// A row has been merged into the services table.
    Registered,
}

/// One row of the services table: which nodes seed a resource on a pool (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesRow {
    /// Partition key: `account$pool`.
    pub partition: String,
    /// Row key: `resource_hash`.
    pub resource_hash: String,
    /// Raw resource string this row tracks.
    pub resource: String,
    /// Up to 13 properties of up to 800 comma-joined node ids each.
    pub vm_lists: Vec<String>,
    /// Optimistic-concurrency token.
    pub etag: Option<String>,
}

impl ServicesRow {
    /// Union of every seeder node id across all `VmListN` properties.
    #[must_use]
    pub fn seeders(&self) -> Vec<String> {
        self.vm_lists
            .iter()
            .flat_map(|list| list.split(',').filter(|id| !id.is_empty()))
            .map(str::to_string)
            .collect()
    }

    /// Merges `node_id` into the row, preserving every previously recorded id
    /// (§8 "monotonically grows"). Returns `false` when the row is already full.
    pub fn merge_node(&mut self, node_id: &str) -> bool {
        if self.seeders().iter().any(|id| id == node_id) {
            return true;
        }
        if self.vm_lists.is_empty() {
            self.vm_lists.push(String::new());
        }
        for list in &mut self.vm_lists {
            let count = list.split(',').filter(|s| !s.is_empty()).count();
            if count < MAX_IDS_PER_VM_LIST_PROPERTY {
                if list.is_empty() {
                    *list = node_id.to_string();
                } else {
                    list.push(',');
                    list.push_str(node_id);
                }
                return true;
            }
        }
        if self.vm_lists.len() < MAX_VM_LIST_PROPERTIES {
            self.vm_lists.push(node_id.to_string());
            return true;
        }
        false
    }
}

/// One row of the torrent-info table (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentInfoRow {
    /// Partition key shared with the services table.
    pub partition: String,
    /// Row key: `resource_hash`.
    pub resource_hash: String,
    /// `container,blob_name` locator for the uploaded `.torrent` file.
    pub torrent_file_locator: String,
    /// SHA-1 of the `.torrent` file contents.
    pub torrent_file_sha1: String,
    /// Whether the torrented artifact is a directory (uncompressed path).
    pub is_dir: bool,
    /// Size in bytes of the torrented content.
    pub content_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_docker_and_singularity_resources() {
        let docker = Resource::parse("docker:alpine:3.19").expect("valid docker resource");
        assert_eq!(docker.runtime, ContainerRuntimeKind::Docker);
        assert_eq!(docker.image, "alpine:3.19");

        let sing = Resource::parse("singularity:shub://org/image").expect("valid sing resource");
        assert_eq!(sing.runtime, ContainerRuntimeKind::Singularity);
    }

    #[test]
    fn rejects_unknown_prefix() {
        assert!(Resource::parse("oci:alpine").is_err());
        assert!(Resource::parse("docker:").is_err());
        assert!(Resource::parse("no-colon-here").is_err());
    }

    #[test]
    fn merge_node_is_idempotent_and_preserves_existing_ids() {
        let mut row = ServicesRow {
            partition: "acct$pool".into(),
            resource_hash: "abc".into(),
            resource: "docker:alpine".into(),
            vm_lists: Vec::new(),
            etag: None,
        };
        for id in ["node-a", "node-b", "node-a"] {
            assert!(row.merge_node(id));
        }
        assert_eq!(row.seeders().len(), 2);
    }

    #[test]
    fn merge_node_spills_into_next_property_when_full() {
        let mut row = ServicesRow {
            partition: "acct$pool".into(),
            resource_hash: "abc".into(),
            resource: "docker:alpine".into(),
            vm_lists: vec![
                (0..MAX_IDS_PER_VM_LIST_PROPERTY)
                    .map(|i| format!("node-{i}"))
                    .collect::<Vec<_>>()
                    .join(","),
            ],
            etag: None,
        };
        assert!(row.merge_node("node-overflow"));
        assert_eq!(row.vm_lists.len(), 2);
        assert_eq!(row.vm_lists[1], "node-overflow");
    }
}
