//! Strongly typed runtime configuration for the cascade torrent session
//! (§4.6: DHT-only discovery, no trackers/UPnP/NAT-PMP/LSD).

/// Runtime parameters applied to the torrent session.
#[derive(Debug, Clone)]
pub struct EngineRuntimeConfig {
    /// Root directory new torrent data is saved under.
    pub download_root: String,
    /// Directory where fast-resume payloads are stored.
    pub resume_dir: String,
    /// Listen port for the session's single bound port (default 6881).
    pub listen_port: u16,
    /// DHT router hostnames queried when the session has no other peers yet.
    pub dht_routers: Vec<String>,
}

impl EngineRuntimeConfig {
    /// Default session listen port (§4.6 "binds to a single port (6881)").
    pub const DEFAULT_LISTEN_PORT: u16 = 6881;
}

#[cfg(test)]
mod tests {
    use super::EngineRuntimeConfig;

    #[test]
    fn default_listen_port_matches_spec() {
        assert_eq!(EngineRuntimeConfig::DEFAULT_LISTEN_PORT, 6881);
    }
}
