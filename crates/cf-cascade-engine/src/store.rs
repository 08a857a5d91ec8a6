use std::ffi::OsStr;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CascadeEngineError;

const META_SUFFIX: &str = ".meta.json";

/// Persisted record of a resource handed to the torrent session, so a
/// restarted node can rebuild its working set without re-querying the
/// services/torrent-info tables for everything it already knew about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResourceState {
    /// `SHA1(resource)`.
    pub resource_hash: String,
    /// Local path the artifact was materialized to.
    pub save_path: String,
    /// Whether this node was seeding (vs. still downloading) when last saved.
    pub seeding: bool,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

/// Service responsible for persisting which resources a node's torrent
/// session is tracking.
#[derive(Clone, Debug)]
pub struct FastResumeStore {
    base_dir: PathBuf,
}

impl FastResumeStore {
    /// Construct a store rooted at the provided directory.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    /// Ensure the underlying directory exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn ensure_initialized(&self) -> Result<(), CascadeEngineError> {
        if !self.base_dir.exists() {
            fs::create_dir_all(&self.base_dir).map_err(|source| CascadeEngineError::StoreIo {
                operation: "ensure_initialized",
                path: self.base_dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Load every previously persisted resource entry.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry cannot be read or decoded.
    pub fn load_all(&self) -> Result<Vec<StoredResourceState>, CascadeEngineError> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        let dir = fs::read_dir(&self.base_dir).map_err(|source| CascadeEngineError::StoreIo {
            operation: "load_all",
            path: self.base_dir.clone(),
            source,
        })?;
        for entry in dir {
            let entry = entry.map_err(|source| CascadeEngineError::StoreIo {
                operation: "load_all",
                path: self.base_dir.clone(),
                source,
            })?;
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(OsStr::to_str) else {
                continue;
            };
            if !file_name.ends_with(META_SUFFIX) {
                continue;
            }

            let data = fs::read_to_string(&path).map_err(|source| CascadeEngineError::StoreIo {
                operation: "load_all",
                path: path.clone(),
                source,
            })?;
            let state: StoredResourceState = serde_json::from_str(&data)
                .map_err(|source| CascadeEngineError::StoreParse { operation: "load_all", path, source })?;
            entries.push(state);
        }

        Ok(entries)
    }

    /// Persist a resource's state.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be encoded or written.
    pub fn write(&self, state: &StoredResourceState) -> Result<(), CascadeEngineError> {
        self.ensure_initialized()?;
        let mut state = state.clone();
        state.updated_at = Utc::now();
        let json = serde_json::to_string_pretty(&state).map_err(|source| CascadeEngineError::StoreParse {
            operation: "write",
            path: self.path_for(&state.resource_hash),
            source,
        })?;
        fs::write(self.path_for(&state.resource_hash), json).map_err(|source| CascadeEngineError::StoreIo {
            operation: "write",
            path: self.path_for(&state.resource_hash),
            source,
        })
    }

    /// Remove a resource's persisted state.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists and cannot be removed.
    pub fn remove(&self, resource_hash: &str) -> Result<(), CascadeEngineError> {
        let path = self.path_for(resource_hash);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|source| CascadeEngineError::StoreIo { operation: "remove", path, source })?;
        }
        Ok(())
    }

    fn path_for(&self, resource_hash: &str) -> PathBuf {
        self.base_dir.join(format!("{resource_hash}{META_SUFFIX}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn ensure_initialized_creates_directory() {
        let temp = TempDir::new().expect("tempdir");
        let target = temp.path().join("resume");
        let store = FastResumeStore::new(&target);
        store.ensure_initialized().expect("create dir");
        assert!(target.exists());
    }

    #[test]
    fn write_and_load_round_trip() {
        let temp = TempDir::new().expect("tempdir");
        let store = FastResumeStore::new(temp.path());

        let state = StoredResourceState {
            resource_hash: "abc123".into(),
            save_path: "/data/abc123".into(),
            seeding: true,
            updated_at: Utc::now(),
        };
        store.write(&state).expect("write succeeds");

        let mut loaded = store.load_all().expect("load succeeds");
        assert_eq!(loaded.len(), 1);
        let loaded = loaded.pop().expect("entry present");
        assert_eq!(loaded.resource_hash, "abc123");
        assert!(loaded.seeding);

        store.remove("abc123").expect("remove succeeds");
        assert!(store.load_all().expect("load succeeds").is_empty());
    }
}
