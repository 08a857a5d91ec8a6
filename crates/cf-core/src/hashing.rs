//! SHA-1 based identifiers used throughout the object-store namespace (§3, §6).
//!
//! The backing store's partition/row keys are defined in terms of `SHA1(id)`
//! hex digests; this module is the single place that computes them so every
//! crate derives the same key for the same input.

use sha1::{Digest, Sha1};

/// Returns the lowercase hex SHA-1 digest of `value`.
#[must_use]
pub fn sha1_hex(value: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(value.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Derives a federation hash from its configured id (`hash=SHA1(id)`, §3).
#[must_use]
pub fn federation_hash(federation_id: &str) -> String {
    sha1_hex(federation_id)
}

/// Derives the row key for a pool entry: `SHA1(service_url$pool_id)`.
#[must_use]
pub fn pool_hash(service_url: &str, pool_id: &str) -> String {
    sha1_hex(&format!("{service_url}${pool_id}"))
}

/// Derives the row key for a job-location entity: `SHA1(service_url$pool_id)`,
/// scoped by the caller under `partition_key=fedhash$SHA1(job_id)`.
#[must_use]
pub fn job_location_row_key(service_url: &str, pool_id: &str) -> String {
    pool_hash(service_url, pool_id)
}

/// Derives the job-location partition key: `fedhash$SHA1(job_id)`.
#[must_use]
pub fn job_location_partition(fedhash: &str, job_id: &str) -> String {
    format!("{fedhash}${}", sha1_hex(job_id))
}

/// Derives the row key for a sequence/blocked-action entity: `SHA1(target_id)`.
#[must_use]
pub fn target_hash(target_id: &str) -> String {
    sha1_hex(target_id)
}

/// Derives `resource_hash = SHA1(resource)` for a cascade resource string.
#[must_use]
pub fn resource_hash(resource: &str) -> String {
    sha1_hex(resource)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_hex_matches_known_vector() {
        assert_eq!(sha1_hex(""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn job_location_partition_concatenates_both_hashes() {
        let fedhash = federation_hash("my-federation");
        let partition = job_location_partition(&fedhash, "job-1");
        assert!(partition.starts_with(&fedhash));
        assert!(partition.contains('$'));
    }
}
