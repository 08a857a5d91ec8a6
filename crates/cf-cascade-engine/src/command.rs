//! Commands accepted by the background torrent worker (§4.6/§4.7).

/// A unit of work handed to the torrent worker by the image driver or by
/// the node's own startup recovery pass.
#[derive(Debug)]
pub enum EngineCommand {
    /// Add a resource's torrent to the session and begin downloading or
    /// seeding it (§4.7 step 6).
    Add {
        /// Raw `docker:<image>` / `singularity:<image>` string.
        resource: String,
        /// `SHA1(resource)`.
        resource_hash: String,
        /// Raw `.torrent` file contents.
        torrent_file: Vec<u8>,
        /// Local path the artifact was materialized to.
        save_path: String,
        /// Whether this node already has the artifact and should seed
        /// immediately rather than download pieces.
        seed_mode: bool,
    },
    /// Remove a resource's torrent from the session, e.g. once pruned from
    /// the node's manifest.
    Remove {
        /// `SHA1(resource)`.
        resource_hash: String,
    },
}
