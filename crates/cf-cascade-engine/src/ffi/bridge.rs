//! CXX bridge to the native DHT-only torrent session (§4.6).

#[allow(missing_docs)]
#[cxx::bridge(namespace = "cascadefed")]
pub mod ffi {
    #[derive(Debug)]
    struct SessionOptions {
        download_root: String,
        listen_port: i32,
    }

    #[derive(Debug)]
    struct AddResourceRequest {
        resource_hash: String,
        torrent_file: Vec<u8>,
        save_path: String,
        seed_mode: bool,
    }

    #[derive(Debug, Clone)]
    struct ResourceStatus {
        resource_hash: String,
        is_seed: bool,
        download_rate: i64,
        upload_rate: i64,
        num_peers: i32,
        progress: f32,
    }

    #[derive(Debug, Clone, Copy)]
    struct DhtStats {
        nodes: u32,
        torrents: u32,
        down_bytes: u64,
        up_bytes: u64,
    }

    unsafe extern "C++" {
        include!("cascadefed/session.hpp");

        type Session;

        #[must_use]
        fn new_session(options: &SessionOptions) -> UniquePtr<Session>;
        #[must_use]
        fn add_dht_router(self: Pin<&mut Session>, host: &str, port: u16) -> bool;
        #[must_use]
        fn dht_node_count(self: &Session) -> u32;
        #[must_use]
        fn add_resource(self: Pin<&mut Session>, request: &AddResourceRequest) -> String;
        #[must_use]
        fn remove_resource(self: Pin<&mut Session>, resource_hash: &str) -> String;
        #[must_use]
        fn poll_statuses(self: Pin<&mut Session>) -> Vec<ResourceStatus>;
        #[must_use]
        fn dht_stats(self: &Session) -> DhtStats;
    }
}
