//! Request/outcome types for the cascade image driver (§4.7).

use std::path::PathBuf;

use cf_core::Resource;

/// Per-node p2p tuning (§6 "Environment variables", `p2popts`). Parsed by the
/// node's bootstrap, not by this crate.
#[derive(Debug, Clone, Copy)]
pub struct PullOptions {
    /// Maximum number of pull/load operations this node runs concurrently.
    pub concurrent_downloads: usize,
    /// Minimum known seeders before preferring a torrent seed over a registry pull.
    pub seed_bias: u32,
    /// Whether artifacts are gzip-compressed before being torrented.
    pub compression: bool,
}

/// A resource materialized on local disk, ready to be loaded and torrented.
#[derive(Debug, Clone)]
pub struct MaterializedArtifact {
    /// The resource this artifact was built for.
    pub resource: Resource,
    /// Path to the packaged artifact: a single file when compressed, a
    /// directory otherwise.
    pub artifact_path: PathBuf,
    /// Whether `artifact_path` is a directory (the uncompressed path).
    pub is_dir: bool,
    /// Size in bytes of the packaged artifact.
    pub content_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_options_carries_plain_fields() {
        let options = PullOptions {
            concurrent_downloads: 2,
            seed_bias: 3,
            compression: true,
        };
        assert_eq!(options.concurrent_downloads, 2);
        assert!(options.compression);
    }
}
