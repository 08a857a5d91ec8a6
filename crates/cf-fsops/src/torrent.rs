//! `.torrent` file construction over a packaged artifact (§4.7 step 4).
//!
//! `CascadeTorrentEngine::add_resource` takes an opaque torrent file; this
//! module is what builds it once [`crate::CascadeImageDriver::package`] has
//! produced a [`MaterializedArtifact`]. The info dict is a standard
//! single-tracker-less BEP3 layout: a single `length` entry for a compressed
//! (single-file) artifact, or a `files` list walked from the directory for an
//! uncompressed one. No tracker or announce URL is embedded; peers are
//! discovered through the roster, not a tracker (§4.2).

use std::fs::{self, File};
use std::io::Read as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use sha1::{Digest, Sha1};
use walkdir::WalkDir;

use crate::error::{FsOpsError, FsOpsResult};
use crate::model::MaterializedArtifact;

/// Piece length used for every torrent this driver builds (256 KiB).
pub const PIECE_LENGTH: u32 = 256 * 1024;

#[cfg_attr(test, derive(Deserialize))]
#[derive(Serialize)]
struct FileEntry {
    length: u64,
    path: Vec<String>,
}

#[cfg_attr(test, derive(Deserialize))]
#[derive(Serialize)]
struct InfoDict {
    name: String,
    #[serde(rename = "piece length")]
    piece_length: u32,
    pieces: ByteBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    files: Option<Vec<FileEntry>>,
}

#[cfg_attr(test, derive(Deserialize))]
#[derive(Serialize)]
struct MetaInfo {
    info: InfoDict,
}

/// Builds a bencoded `.torrent` file describing `artifact`.
///
/// # Errors
///
/// Returns an error if the artifact's files cannot be read or the info dict
/// cannot be bencoded.
pub fn build_torrent(artifact: &MaterializedArtifact) -> FsOpsResult<Vec<u8>> {
    let name = artifact
        .artifact_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| artifact.resource.hash());

    let info = if artifact.is_dir {
        let entries = collect_directory_entries(&artifact.artifact_path);
        let pieces = hash_pieces(entries.iter().map(|(path, _)| path.as_path()))?;
        let files = entries
            .into_iter()
            .map(|(path, relative)| FileEntry {
                length: path.metadata().map(|meta| meta.len()).unwrap_or(0),
                path: relative,
            })
            .collect();
        InfoDict {
            name,
            piece_length: PIECE_LENGTH,
            pieces: ByteBuf::from(pieces),
            length: None,
            files: Some(files),
        }
    } else {
        let pieces = hash_pieces(std::iter::once(artifact.artifact_path.as_path()))?;
        InfoDict {
            name,
            piece_length: PIECE_LENGTH,
            pieces: ByteBuf::from(pieces),
            length: Some(artifact.content_size_bytes),
            files: None,
        }
    };

    serde_bencode::to_bytes(&MetaInfo { info }).map_err(|source| FsOpsError::TorrentEncode {
        path: artifact.artifact_path.clone(),
        source,
    })
}

/// Returns the artifact's files with their paths relative to the artifact
/// root, sorted for reproducibility across runs.
fn collect_directory_entries(root: &Path) -> Vec<(std::path::PathBuf, Vec<String>)> {
    let mut entries: Vec<_> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .components()
                .map(|component| component.as_os_str().to_string_lossy().into_owned())
                .collect();
            (entry.path().to_path_buf(), relative)
        })
        .collect();
    entries.sort_by(|(_, a), (_, b)| a.cmp(b));
    entries
}

/// Concatenates the given files and returns the SHA-1 digest of each
/// `PIECE_LENGTH`-sized piece, back to back.
fn hash_pieces<'a>(paths: impl Iterator<Item = &'a Path>) -> FsOpsResult<Vec<u8>> {
    let mut pieces = Vec::new();
    let mut buffer = Vec::with_capacity(PIECE_LENGTH as usize);

    for path in paths {
        let mut file = File::open(path).map_err(|source| FsOpsError::io("torrent_read", path, source))?;
        let mut chunk = vec![0_u8; PIECE_LENGTH as usize];
        loop {
            let read = fill_remaining(&mut file, &mut buffer, &mut chunk, path)?;
            if read == 0 {
                break;
            }
            if buffer.len() == PIECE_LENGTH as usize {
                pieces.extend_from_slice(&hash_piece(&buffer));
                buffer.clear();
            }
        }
    }
    if !buffer.is_empty() {
        pieces.extend_from_slice(&hash_piece(&buffer));
    }
    Ok(pieces)
}

fn fill_remaining(
    file: &mut File,
    buffer: &mut Vec<u8>,
    chunk: &mut [u8],
    path: &Path,
) -> FsOpsResult<usize> {
    let space = PIECE_LENGTH as usize - buffer.len();
    let read = file
        .read(&mut chunk[..space])
        .map_err(|source| FsOpsError::io("torrent_read", path, source))?;
    buffer.extend_from_slice(&chunk[..read]);
    Ok(read)
}

fn hash_piece(buffer: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(buffer);
    hasher.finalize().into()
}

/// Hex-encoded SHA-1 of `bytes`, used to stamp a `.torrent` file's
/// `torrent_file_sha1` registry column.
#[must_use]
pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    let digest: [u8; 20] = hasher.finalize().into();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_core::Resource;

    #[test]
    fn sha1_hex_is_deterministic_and_lowercase() {
        let digest = sha1_hex(b"hello world");
        assert_eq!(digest, sha1_hex(b"hello world"));
        assert_eq!(digest.len(), 40);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn builds_single_file_torrent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.tar.gz");
        fs::write(&path, vec![7_u8; (PIECE_LENGTH as usize) + 10]).unwrap();

        let artifact = MaterializedArtifact {
            resource: Resource::parse("docker:alpine:3.19").unwrap(),
            artifact_path: path,
            is_dir: false,
            content_size_bytes: (PIECE_LENGTH as u64) + 10,
        };

        let bytes = build_torrent(&artifact).unwrap();
        let decoded: MetaInfo = serde_bencode::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.info.length, Some((PIECE_LENGTH as u64) + 10));
        assert_eq!(decoded.info.pieces.len(), 40);
    }

    #[test]
    fn builds_directory_torrent_with_sorted_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b.txt"), b"hello").unwrap();
        fs::write(dir.path().join("sub/a.txt"), b"world").unwrap();

        let artifact = MaterializedArtifact {
            resource: Resource::parse("singularity:library/busybox").unwrap(),
            artifact_path: dir.path().to_path_buf(),
            is_dir: true,
            content_size_bytes: 10,
        };

        let bytes = build_torrent(&artifact).unwrap();
        let decoded: MetaInfo = serde_bencode::from_bytes(&bytes).unwrap();
        let files = decoded.info.files.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, vec!["b.txt".to_string()]);
        assert_eq!(files[1].path, vec!["sub".to_string(), "a.txt".to_string()]);
    }
}
