//! Object-store name construction (§6 "Object-store layout").
//!
//! Every container/table/queue name used anywhere in the platform is built
//! through one `Namespace`, keyed by the configured `storage.entity_prefix`,
//! so no other crate string-concatenates prefixes ad hoc.

/// Builds container/table/queue names under a configured prefix.
#[derive(Debug, Clone)]
pub struct Namespace {
    prefix: String,
}

impl Namespace {
    /// Construct a namespace from the configured `storage.entity_prefix`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn named(&self, suffix: &str) -> String {
        format!("{}{}", self.prefix, suffix)
    }

    /// `<prefix>fedglobal` blob container holding `global.lock`.
    #[must_use]
    pub fn fedglobal_container(&self) -> String {
        self.named("fedglobal")
    }

    /// `<prefix>fedglobal` table of federations and their pools.
    #[must_use]
    pub fn fedglobal_table(&self) -> String {
        self.named("fedglobal")
    }

    /// `<prefix>fedjobs` table of location/sequence/blocked-action entities.
    #[must_use]
    pub fn fedjobs_table(&self) -> String {
        self.named("fedjobs")
    }

    /// `<prefix>fed-<fedhash>` queue of action messages for one federation.
    #[must_use]
    pub fn fed_queue(&self, fedhash: &str) -> String {
        self.named(&format!("fed-{fedhash}"))
    }

    /// `<prefix>fed-<fedhash>` blob container of action payloads.
    #[must_use]
    pub fn fed_payloads_container(&self, fedhash: &str) -> String {
        self.named(&format!("fed-{fedhash}"))
    }

    /// `<prefix>gr-<acct>-<pool>` blob container of direct-download lease placeholders.
    #[must_use]
    pub fn direct_download_container(&self, account: &str, pool_id: &str) -> String {
        self.named(&format!("gr-{account}-{pool_id}"))
    }

    /// `<prefix>tor-<acct>-<pool>` blob container of uploaded `.torrent` files.
    #[must_use]
    pub fn torrent_files_container(&self, account: &str, pool_id: &str) -> String {
        self.named(&format!("tor-{account}-{pool_id}"))
    }

    /// `<prefix>dht` table of DHT roster rows.
    #[must_use]
    pub fn dht_table(&self) -> String {
        self.named("dht")
    }

    /// `<prefix>torrentinfo` table of torrent-info rows.
    #[must_use]
    pub fn torrentinfo_table(&self) -> String {
        self.named("torrentinfo")
    }

    /// `<prefix>images` table of services rows.
    #[must_use]
    pub fn images_table(&self) -> String {
        self.named("images")
    }

    /// `<prefix>gr` table of resource-manifest rows.
    #[must_use]
    pub fn manifest_table(&self) -> String {
        self.named("gr")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_prefixed() {
        let ns = Namespace::new("shipyard");
        assert_eq!(ns.fedglobal_container(), "shipyardfedglobal");
        assert_eq!(ns.fed_queue("abc123"), "shipyardfed-abc123");
        assert_eq!(
            ns.direct_download_container("acct", "pool1"),
            "shipyardgr-acct-pool1"
        );
        assert_eq!(ns.torrentinfo_table(), "shipyardtorrentinfo");
    }

    #[test]
    fn empty_prefix_is_allowed() {
        let ns = Namespace::new("");
        assert_eq!(ns.images_table(), "images");
    }
}
