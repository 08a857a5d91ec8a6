//! BatchClient (C2): typed wrapper over the compute-pool/job/task service.

use std::collections::BTreeMap;
use std::time::Duration;

use cf_core::{JobSpec, NodeStateCounts, PoolIdentity, PoolSnapshot, PoolState, TaskNaming, TaskSpec, VmProperties};
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::chunk::{self, DEFAULT_CHUNK_SIZE};
use crate::error::{BatchError, Result};

/// User-agent string attached to every request this client issues (§4.1).
pub const USER_AGENT: &str = concat!("batch-shipyard/", env!("CARGO_PKG_VERSION"));

const MAX_AUTH_RETRIES: u32 = 10;

/// Entity/kind an action targets: job or recurring job-schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// A regular job.
    Job,
    /// A recurring job schedule.
    JobSchedule,
}

impl TargetKind {
    const fn segment(self) -> &'static str {
        match self {
            Self::Job => "jobs",
            Self::JobSchedule => "jobschedules",
        }
    }
}

#[derive(Debug, Deserialize)]
struct PoolResponse {
    state: String,
    vm_size: String,
    cores: f64,
    memory_mb: f64,
    gpu_capable: bool,
    infiniband_capable: bool,
    max_tasks_per_node: u32,
    virtual_network_arm_id: Option<String>,
    custom_image_arm_id: Option<String>,
    native_container_pool: bool,
    autoscale_enabled: bool,
    #[serde(default)]
    registry_login_keys: Vec<String>,
    location: String,
    node_agent_sku_id: String,
}

#[derive(Debug, Deserialize)]
struct NodeCountsResponse {
    dedicated: NodeStateCounts,
    low_priority: NodeStateCounts,
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    pool_id: Option<String>,
    job_prep_command_line: Option<String>,
    uses_task_dependencies: bool,
    on_task_failure: Option<String>,
}

/// Typed wrapper over the compute-pool/job/task service (C2).
#[derive(Clone)]
pub struct BatchClient {
    http: Client,
}

impl Default for BatchClient {
    fn default() -> Self {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { http }
    }
}

impl BatchClient {
    /// Construct a client with default timeouts and the platform user agent.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn with_auth_retry<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(BatchError::ClientError { status, .. }) if status == 401 || status == 403 => {
                    attempt += 1;
                    if attempt >= MAX_AUTH_RETRIES {
                        return Err(BatchError::AuthenticationExhausted);
                    }
                    let backoff = Duration::from_millis(rand::rng().random_range(100..=500));
                    warn!(attempt, "batch service authorization failed, re-acquiring credentials");
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn get(&self, url: &str) -> Result<Option<reqwest::Response>> {
        let response = self.http.get(url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response)),
            status if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
                Err(BatchError::ClientError {
                    status: status.as_u16(),
                    body: response.text().await.unwrap_or_default(),
                })
            }
            status => Err(BatchError::ClientError {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    /// Fetch a pool's current snapshot, or `None` on a 404 (§4.2).
    ///
    /// # Errors
    ///
    /// Returns `BatchError::AuthenticationExhausted` after 10 failed
    /// credential re-acquisition attempts, or `BatchError::ClientError` for
    /// any other non-success response.
    pub async fn get_pool(&self, service_url: &str, pool_id: &str) -> Result<Option<PoolSnapshot>> {
        self.with_auth_retry(|| async {
            let url = format!("{service_url}/pools/{pool_id}");
            let Some(response) = self.get(&url).await? else {
                return Ok(None);
            };
            let body: PoolResponse = response.json().await?;
            let state = match body.state.as_str() {
                "deleting" => PoolState::Deleting,
                "upgrading" => PoolState::Upgrading,
                _ => PoolState::Active,
            };
            Ok(Some(PoolSnapshot {
                identity: PoolIdentity {
                    batch_account: service_account(service_url),
                    service_url: service_url.to_string(),
                    location: body.location.clone(),
                    pool_id: pool_id.to_string(),
                },
                state,
                vm_props: Some(VmProperties {
                    vm_size: body.vm_size,
                    cores: body.cores,
                    memory_mb: body.memory_mb,
                    gpu_capable: body.gpu_capable,
                    infiniband_capable: body.infiniband_capable,
                }),
                node_agent_sku: body.node_agent_sku_id.clone(),
                dedicated: NodeStateCounts::default(),
                low_priority: NodeStateCounts::default(),
                active_tasks_count: 0,
                max_tasks_per_node: body.max_tasks_per_node,
                virtual_network_arm_id: body.virtual_network_arm_id.clone(),
                custom_image_arm_id: body.custom_image_arm_id.clone(),
                native_container_pool: body.native_container_pool,
                autoscale_enabled: body.autoscale_enabled,
                registry_login_keys: body.registry_login_keys.clone(),
                blackout_until: None,
            }))
        })
        .await
    }

    /// Node-state counts for both node flavours (§4.2).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after credential retries.
    pub async fn get_node_state_counts(
        &self,
        service_url: &str,
        pool_id: &str,
    ) -> Result<(NodeStateCounts, NodeStateCounts)> {
        self.with_auth_retry(|| async {
            let url = format!("{service_url}/pools/{pool_id}/nodecounts");
            let response = self
                .get(&url)
                .await?
                .ok_or_else(|| BatchError::ClientError {
                    status: 404,
                    body: format!("pool {pool_id} not found"),
                })?;
            let body: NodeCountsResponse = response.json().await?;
            Ok((body.dedicated, body.low_priority))
        })
        .await
    }

    /// Sum of active tasks across every job targeting `pool_id`, aggregated
    /// with a bounded-concurrency fan-out over per-job task-count queries
    /// (§4.2).
    ///
    /// # Errors
    ///
    /// Returns an error if listing jobs or any per-job query fails.
    pub async fn aggregate_active_tasks_on_pool(&self, service_url: &str, pool_id: &str) -> Result<u32> {
        self.with_auth_retry(|| async {
            let url = format!("{service_url}/jobs?filter=executionInfo/poolId%20eq%20'{pool_id}'");
            let Some(response) = self.get(&url).await? else {
                return Ok(0);
            };
            #[derive(Deserialize)]
            struct JobsList {
                job_ids: Vec<String>,
            }
            let jobs: JobsList = response.json().await?;

            use futures_util::stream::{self, StreamExt};
            let counts: Vec<Result<u32>> = stream::iter(jobs.job_ids)
                .map(|job_id| async move {
                    let url = format!("{service_url}/jobs/{job_id}/taskcounts");
                    #[derive(Deserialize)]
                    struct TaskCounts {
                        active: u32,
                    }
                    let Some(response) = self.get(&url).await? else {
                        return Ok(0);
                    };
                    let counts: TaskCounts = response.json().await?;
                    Ok(counts.active)
                })
                .buffer_unordered(8)
                .collect()
                .await;

            let mut total = 0;
            for count in counts {
                total += count?;
            }
            Ok(total)
        })
        .await
    }

    /// Re-issue the pool's existing autoscale formula to force an immediate
    /// re-evaluation of node targets (§4.2).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after credential retries.
    pub async fn immediately_evaluate_autoscale(&self, service_url: &str, pool_id: &str) -> Result<()> {
        self.with_auth_retry(|| async {
            let url = format!("{service_url}/pools/{pool_id}/evaluateautoscale");
            self.http.post(&url).send().await?;
            Ok(())
        })
        .await
    }

    async fn get_job(&self, service_url: &str, kind: TargetKind, id: &str) -> Result<Option<JobResponse>> {
        let url = format!("{service_url}/{}/{id}", kind.segment());
        let Some(response) = self.get(&url).await? else {
            return Ok(None);
        };
        Ok(Some(response.json().await?))
    }

    /// Add a job, proving compatibility against an existing job of the same
    /// id rather than failing outright (§4.2).
    ///
    /// # Errors
    ///
    /// Returns `BatchError::Incompatible` when an existing job's `pool_id`,
    /// job-prep command line, dependency usage, or failure policy differs.
    pub async fn add_job(&self, service_url: &str, id: &str, spec: &JobSpec) -> Result<()> {
        self.with_auth_retry(|| async {
            if let Some(existing) = self.get_job(service_url, TargetKind::Job, id).await? {
                if existing.pool_id != spec.pool_id {
                    return Err(BatchError::Incompatible { id: id.to_string(), field: "pool_id" });
                }
                if existing.job_prep_command_line != spec.job_prep_command_line {
                    return Err(BatchError::Incompatible {
                        id: id.to_string(),
                        field: "job_prep_task.command_line",
                    });
                }
                if existing.uses_task_dependencies != spec.uses_task_dependencies {
                    return Err(BatchError::Incompatible {
                        id: id.to_string(),
                        field: "uses_task_dependencies",
                    });
                }
                if existing.on_task_failure != spec.on_task_failure {
                    return Err(BatchError::Incompatible { id: id.to_string(), field: "on_task_failure" });
                }
                debug!(job_id = id, "reusing compatible existing job");
                return Ok(());
            }
            let url = format!("{service_url}/jobs");
            self.http.post(&url).json(spec).send().await?;
            Ok(())
        })
        .await
    }

    /// Add a job schedule. Unlike [`Self::add_job`], an existing schedule of
    /// the same id is never reused (§4.2).
    ///
    /// # Errors
    ///
    /// Returns `BatchError::Incompatible` if a schedule already exists at
    /// `id`.
    pub async fn add_job_schedule(&self, service_url: &str, id: &str, spec: &JobSpec) -> Result<()> {
        self.with_auth_retry(|| async {
            if self.get_job(service_url, TargetKind::JobSchedule, id).await?.is_some() {
                return Err(BatchError::Incompatible { id: id.to_string(), field: "job_schedule_id" });
            }
            let url = format!("{service_url}/jobschedules");
            self.http.post(&url).json(spec).send().await?;
            Ok(())
        })
        .await
    }

    /// Terminate a job or job schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after credential retries.
    pub async fn terminate(&self, service_url: &str, kind: TargetKind, id: &str) -> Result<()> {
        self.with_auth_retry(|| async {
            let url = format!("{service_url}/{}/{id}/terminate", kind.segment());
            self.http.post(&url).send().await?;
            Ok(())
        })
        .await
    }

    /// Delete a job or job schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after credential retries.
    pub async fn delete(&self, service_url: &str, kind: TargetKind, id: &str) -> Result<()> {
        self.with_auth_retry(|| async {
            let url = format!("{service_url}/{}/{id}", kind.segment());
            self.http.delete(&url).send().await?;
            Ok(())
        })
        .await
    }

    /// Bulk-add tasks, chunked to 100 per request; chunk size halves on
    /// `RequestBodyTooLarge` (floor 1); per-item server errors retry
    /// immediately, client errors are logged and skipped (§4.2).
    ///
    /// # Errors
    ///
    /// Returns `BatchError::ChunkTooLarge` if even a single task still
    /// overflows the request body limit.
    pub async fn add_task_collection(&self, service_url: &str, job_id: &str, tasks: &BTreeMap<String, TaskSpec>) -> Result<()> {
        let mut chunk_size = DEFAULT_CHUNK_SIZE;
        let mut remaining = tasks.clone();
        while !remaining.is_empty() {
            let chunks = chunk::chunk_tasks(&remaining, chunk_size);
            let Some(first) = chunks.into_iter().next() else {
                break;
            };
            match self.submit_task_chunk(service_url, job_id, &first).await {
                Ok(()) => {
                    for (id, _) in &first {
                        remaining.remove(id);
                    }
                }
                Err(BatchError::ClientError { status, .. }) if status == 413 => {
                    if chunk_size == 1 {
                        return Err(BatchError::ChunkTooLarge);
                    }
                    chunk_size = chunk::shrink_chunk_size(chunk_size);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    async fn submit_task_chunk(&self, service_url: &str, job_id: &str, chunk: &[(String, TaskSpec)]) -> Result<()> {
        let url = format!("{service_url}/jobs/{job_id}/addtaskcollection");
        let body: Vec<&TaskSpec> = chunk.iter().map(|(_, task)| task).collect();
        let response = self.http.post(&url).json(&body).send().await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::PAYLOAD_TOO_LARGE => Err(BatchError::ClientError { status: 413, body: String::new() }),
            status => {
                warn!(job_id, %status, "task chunk submission rejected");
                Ok(())
            }
        }
    }
}

fn service_account(service_url: &str) -> String {
    service_url
        .trim_start_matches("https://")
        .split('.')
        .next()
        .unwrap_or(service_url)
        .to_string()
}

/// Naming scheme threaded through [`BatchClient::add_task_collection`]
/// callers when a reused job requires task-id renumbering (§4.2, §4.4.6).
#[must_use]
pub fn renumber_task_ids(naming: &TaskNaming, existing_task_ids: &[String], tasks: &mut BTreeMap<String, TaskSpec>) {
    let mut known = existing_task_ids.to_vec();
    let renumbered: BTreeMap<String, TaskSpec> = std::mem::take(tasks)
        .into_iter()
        .map(|(_, mut task)| {
            let new_id = if task.is_merge_task {
                chunk::next_merge_task_id(naming, &known)
            } else {
                chunk::next_generic_task_id(naming, &known)
            };
            known.push(new_id.clone());
            task.id = new_id.clone();
            (new_id, task)
        })
        .collect();
    *tasks = renumbered;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_account_strips_scheme_and_domain() {
        assert_eq!(service_account("https://myacct.eastus.batch.azure.com"), "myacct");
    }

    #[test]
    fn renumber_task_ids_assigns_sequential_generic_ids() {
        let naming = TaskNaming { prefix: "task-".into(), padding: 3 };
        let mut tasks = BTreeMap::new();
        tasks.insert(
            "x".to_string(),
            TaskSpec {
                id: "x".into(),
                command_line: "echo hi".into(),
                coordination_command_line: None,
                instance_count: None,
                depends_on: Vec::new(),
                is_merge_task: false,
            },
        );
        renumber_task_ids(&naming, &["task-000".to_string()], &mut tasks);
        assert!(tasks.contains_key("task-001"));
    }
}
