//! `CascadeImageDriver` (C7, §4.7): pulls or seeds a resource's image,
//! packages it into a reproducible artifact, loads it into the local
//! container runtime, and registers this node as a seeder.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use cf_core::{ContainerRuntimeKind, Resource};
use cf_storage::BackoffPolicy;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{FsOpsError, FsOpsResult};
use crate::model::{MaterializedArtifact, PullOptions};

/// Substrings in a registry pull's stderr worth retrying with backoff (§4.7 step 3).
const TRANSIENT_REGISTRY_PATTERNS: &[&str] = &[
    "toomanyrequests",
    "connection reset by peer",
    "tls handshake timeout",
    "error pulling image configuration",
    "error parsing http 404 response body",
    "received unexpected http status",
];

fn is_transient_registry_error(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    TRANSIENT_REGISTRY_PATTERNS.iter().any(|needle| lower.contains(needle))
}

/// Pulls, packages, and loads cascade resources into the node's container runtime.
pub struct CascadeImageDriver {
    scratch_root: PathBuf,
    options: PullOptions,
    load_lock: Arc<Mutex<()>>,
}

impl CascadeImageDriver {
    /// Builds a driver rooted at `scratch_root` for pull/package/load scratch space.
    #[must_use]
    pub fn new(scratch_root: PathBuf, options: PullOptions) -> Self {
        Self {
            scratch_root,
            options,
            load_lock: Arc::new(Mutex::new(())),
        }
    }

    fn work_dir(&self, resource: &Resource) -> PathBuf {
        self.scratch_path(&resource.hash())
    }

    /// The scratch directory a resource with the given hash is (or would be)
    /// materialized under, without requiring the full [`Resource`] — used by
    /// callers reconstructing a save path for a resource fetched via the
    /// swarm rather than pulled locally.
    #[must_use]
    pub fn scratch_path(&self, resource_hash: &str) -> PathBuf {
        self.scratch_root.join(resource_hash)
    }

    /// Pulls `resource`'s image from its registry, retrying transient
    /// failures with a 300s-capped backoff (§4.7 step 3).
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::RegistryPullFailed`] once a non-transient
    /// failure is observed, or once the retry budget is exhausted.
    pub async fn pull(&self, resource: &Resource) -> FsOpsResult<()> {
        let policy = BackoffPolicy::registry_pull();
        let runtime = resource.runtime;
        let image = resource.image.clone();
        let result = cf_storage::retry_transient(
            &policy,
            |err: &FsOpsError| matches!(err, FsOpsError::RegistryPullTransient { .. }),
            || Self::pull_once(runtime, image.clone()),
        )
        .await;
        result.map_err(|err| match err {
            FsOpsError::RegistryPullTransient { image, message } => FsOpsError::RegistryPullFailed { image, message },
            other => other,
        })
    }

    async fn pull_once(runtime: ContainerRuntimeKind, image: String) -> FsOpsResult<()> {
        let output = match runtime {
            ContainerRuntimeKind::Docker => Command::new("docker")
                .args(["pull", &image])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .output()
                .await,
            ContainerRuntimeKind::Singularity => Command::new("singularity")
                .args(["pull", "--force", &image])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .output()
                .await,
        }
        .map_err(|source| FsOpsError::io("spawn registry pull", "pull", source))?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if is_transient_registry_error(&stderr) {
            warn!(%image, "registry pull failed transiently, retrying with backoff");
            Err(FsOpsError::RegistryPullTransient { image, message: stderr })
        } else {
            Err(FsOpsError::RegistryPullFailed { image, message: stderr })
        }
    }

    /// Packages a pulled resource into a reproducible artifact: a fixed-mtime,
    /// sorted, `pigz`-compressed tarball when compression is enabled, or the
    /// extracted directory as-is otherwise (§4.7 step 4).
    ///
    /// # Errors
    ///
    /// Returns an error if the export, extraction, or compression step fails.
    pub async fn package(&self, resource: &Resource) -> FsOpsResult<MaterializedArtifact> {
        match resource.runtime {
            ContainerRuntimeKind::Docker => self.package_docker(resource).await,
            ContainerRuntimeKind::Singularity => self.package_singularity(resource).await,
        }
    }

    async fn package_docker(&self, resource: &Resource) -> FsOpsResult<MaterializedArtifact> {
        let work_dir = self.work_dir(resource);
        tokio::fs::create_dir_all(&work_dir).await.map_err(|source| FsOpsError::io("create scratch dir", &work_dir, source))?;

        let mut child = Command::new("docker")
            .args(["save", &resource.image])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| FsOpsError::io("spawn docker save", "docker", source))?;
        let mut stdout = child.stdout.take().expect("docker save stdout is piped");
        let mut saved = Vec::new();
        stdout
            .read_to_end(&mut saved)
            .await
            .map_err(|source| FsOpsError::io("read docker save output", "docker", source))?;
        let status = child.wait().await.map_err(|source| FsOpsError::io("wait docker save", "docker", source))?;
        if !status.success() {
            return Err(FsOpsError::Process {
                command: "docker save",
                status: status.code(),
                stderr: String::new(),
            });
        }

        let extract_dir = work_dir.join("image");
        let extract_target = extract_dir.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::create_dir_all(&extract_target)?;
            tar::Archive::new(std::io::Cursor::new(saved)).unpack(&extract_target)
        })
        .await
        .map_err(|source| FsOpsError::io("join extract task", &extract_dir, std::io::Error::other(source)))?
        .map_err(|source| FsOpsError::archive("unpack docker save", &extract_dir, source))?;

        if self.options.compression {
            let tarball_path = work_dir.join("image.tar.gz");
            let content_size_bytes = self.build_reproducible_tarball(&extract_dir, &tarball_path).await?;
            Ok(MaterializedArtifact {
                resource: resource.clone(),
                artifact_path: tarball_path,
                is_dir: false,
                content_size_bytes,
            })
        } else {
            let content_size_bytes = directory_size(&extract_dir).await?;
            Ok(MaterializedArtifact {
                resource: resource.clone(),
                artifact_path: extract_dir,
                is_dir: true,
                content_size_bytes,
            })
        }
    }

    async fn package_singularity(&self, resource: &Resource) -> FsOpsResult<MaterializedArtifact> {
        let work_dir = self.work_dir(resource);
        tokio::fs::create_dir_all(&work_dir).await.map_err(|source| FsOpsError::io("create scratch dir", &work_dir, source))?;
        let sif_path = work_dir.join("image.sif");

        let output = Command::new("singularity")
            .args(["pull", "--force"])
            .arg(&sif_path)
            .arg(&resource.image)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| FsOpsError::io("spawn singularity pull", "singularity", source))?;
        if !output.status.success() {
            return Err(FsOpsError::Process {
                command: "singularity pull",
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let metadata = tokio::fs::metadata(&sif_path).await.map_err(|source| FsOpsError::io("stat sif image", &sif_path, source))?;
        Ok(MaterializedArtifact {
            resource: resource.clone(),
            artifact_path: sif_path,
            is_dir: false,
            content_size_bytes: metadata.len(),
        })
    }

    /// Re-tars `source_dir` sorted by path with fixed `mtime`/`uid`/`gid`, then
    /// compresses the result with `pigz --fast -n -T -c` (§4.7 step 4).
    async fn build_reproducible_tarball(&self, source_dir: &Path, dest_path: &Path) -> FsOpsResult<u64> {
        let walk_root = source_dir.to_path_buf();
        let tar_bytes = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<u8>> {
            let mut entries: Vec<_> = walkdir::WalkDir::new(&walk_root)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_file())
                .collect();
            entries.sort_by(|a, b| a.path().cmp(b.path()));

            let mut buffer = Vec::new();
            {
                let mut builder = tar::Builder::new(&mut buffer);
                for entry in entries {
                    let relative = entry.path().strip_prefix(&walk_root).unwrap_or_else(|_| entry.path());
                    let metadata = entry.metadata()?;
                    let mut header = tar::Header::new_gnu();
                    header.set_size(metadata.len());
                    header.set_mode(0o644);
                    header.set_mtime(0);
                    header.set_uid(0);
                    header.set_gid(0);
                    header.set_cksum();
                    let mut file = std::fs::File::open(entry.path())?;
                    builder.append_data(&mut header, relative, &mut file)?;
                }
                builder.finish()?;
            }
            Ok(buffer)
        })
        .await
        .map_err(|source| FsOpsError::io("join tar task", source_dir, std::io::Error::other(source)))?
        .map_err(|source| FsOpsError::archive("build reproducible tar", source_dir, source))?;

        let mut child = Command::new("pigz")
            .args(["--fast", "-n", "-T", "-c"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| FsOpsError::io("spawn pigz", "pigz", source))?;

        let mut stdin = child.stdin.take().expect("pigz stdin is piped");
        let write_task = tokio::spawn(async move {
            let result = stdin.write_all(&tar_bytes).await;
            drop(stdin);
            result
        });

        let mut stdout = child.stdout.take().expect("pigz stdout is piped");
        let mut compressed = Vec::new();
        stdout
            .read_to_end(&mut compressed)
            .await
            .map_err(|source| FsOpsError::io("read pigz output", "pigz", source))?;

        write_task
            .await
            .map_err(|source| FsOpsError::io("join pigz writer", "pigz", std::io::Error::other(source)))?
            .map_err(|source| FsOpsError::io("write tar to pigz", "pigz", source))?;

        let status = child.wait().await.map_err(|source| FsOpsError::io("wait pigz", "pigz", source))?;
        if !status.success() {
            return Err(FsOpsError::Process {
                command: "pigz",
                status: status.code(),
                stderr: String::new(),
            });
        }

        tokio::fs::write(dest_path, &compressed).await.map_err(|source| FsOpsError::io("write tarball", dest_path, source))?;
        Ok(u64::try_from(compressed.len()).unwrap_or(u64::MAX))
    }

    /// Loads a materialized artifact into the local container runtime.
    /// Serialized behind a single lock: only one load runs on this node at a
    /// time (§5 "load-and-register under single async lock").
    ///
    /// # Errors
    ///
    /// Returns an error if the load pipeline's shelled-out commands fail.
    pub async fn load(&self, artifact: &MaterializedArtifact) -> FsOpsResult<()> {
        let _guard = self.load_lock.lock().await;
        match artifact.resource.runtime {
            ContainerRuntimeKind::Docker => self.load_docker(artifact).await,
            ContainerRuntimeKind::Singularity => Self::load_singularity(artifact).await,
        }
    }

    async fn load_docker(&self, artifact: &MaterializedArtifact) -> FsOpsResult<()> {
        let upstream = if artifact.is_dir {
            Command::new("tar")
                .args(["-cO", "."])
                .current_dir(&artifact.artifact_path)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|source| FsOpsError::io("spawn tar", "tar", source))?
        } else {
            Command::new("pigz")
                .arg("-cd")
                .arg(&artifact.artifact_path)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|source| FsOpsError::io("spawn pigz", "pigz", source))?
        };
        Self::pipe_into_docker_load(upstream).await
    }

    async fn pipe_into_docker_load(mut upstream: Child) -> FsOpsResult<()> {
        let upstream_stdout = upstream.stdout.take().expect("upstream stdout is piped");
        let stdio = std::process::Stdio::try_from(upstream_stdout).map_err(|source| FsOpsError::io("convert pipe to stdio", "docker load", source))?;
        let downstream = Command::new("docker")
            .arg("load")
            .stdin(stdio)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| FsOpsError::io("spawn docker load", "docker", source))?;

        let (upstream_status, downstream_output) = tokio::join!(upstream.wait(), downstream.wait_with_output());
        let upstream_status = upstream_status.map_err(|source| FsOpsError::io("wait upstream pipe", "load", source))?;
        let downstream_output = downstream_output.map_err(|source| FsOpsError::io("wait docker load", "docker", source))?;

        if !upstream_status.success() {
            return Err(FsOpsError::Process {
                command: "load pipe upstream",
                status: upstream_status.code(),
                stderr: String::new(),
            });
        }
        if !downstream_output.status.success() {
            return Err(FsOpsError::Process {
                command: "docker load",
                status: downstream_output.status.code(),
                stderr: String::from_utf8_lossy(&downstream_output.stderr).into_owned(),
            });
        }
        Ok(())
    }

    async fn load_singularity(artifact: &MaterializedArtifact) -> FsOpsResult<()> {
        let output = Command::new("singularity")
            .arg("image.import")
            .arg(&artifact.artifact_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| FsOpsError::io("spawn singularity import", "singularity", source))?;
        if !output.status.success() {
            return Err(FsOpsError::Process {
                command: "singularity image.import",
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }
}

async fn directory_size(root: &Path) -> FsOpsResult<u64> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || {
        walkdir::WalkDir::new(&root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.metadata().ok())
            .map(|metadata| metadata.len())
            .sum()
    })
    .await
    .map_err(|source| FsOpsError::io("join directory size task", root, std::io::Error::other(source)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_known_transient_registry_errors() {
        assert!(is_transient_registry_error("toomanyrequests: rate limit"));
        assert!(is_transient_registry_error("Error: received unexpected HTTP status: 503"));
        assert!(!is_transient_registry_error("manifest unknown"));
    }

    #[test]
    fn work_dir_is_namespaced_by_resource_hash() {
        let driver = CascadeImageDriver::new(
            PathBuf::from("/scratch"),
            PullOptions {
                concurrent_downloads: 1,
                seed_bias: 3,
                compression: true,
            },
        );
        let resource = Resource::parse("docker:alpine:3.19").expect("valid resource");
        let work_dir = driver.work_dir(&resource);
        assert_eq!(work_dir, PathBuf::from("/scratch").join(resource.hash()));
    }
}
