// Copyright (c) 2023 The Cocoon Authors

use crate::error::ApiError;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Catalog service name of the cocoon connectors
pub const COCOON_SERVICE_NAME: &str = "cocoons";

/// What the scheduler needs to launch the connector of a cocoon
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeployJob {
    /// cocoon to run, also the job id
    pub cocoon_id: String,
    /// release to run
    pub release_id: String,
    /// natively linked cocoon
    pub link: String,
    /// memory in MB
    pub memory: u64,
    /// relative cpu weight
    pub cpu_share: u64,
    /// disk limit in bytes
    pub disk_limit: u64,
}

/// An accepted deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentInfo {
    /// job id
    pub id: String,
    /// evaluation created by the scheduler
    pub eval_id: String,
}

/// The cluster job scheduler
#[cfg_attr(any(test, feature = "test-exports"), mockall::automock)]
#[async_trait::async_trait]
pub trait Scheduler: Send + Sync {
    /// Registers the job running the connector and the code of a cocoon
    async fn deploy(&self, job: &DeployJob) -> Result<DeploymentInfo, ApiError>;

    /// Status of a job, `None` when unknown to the scheduler
    async fn status(&self, job_id: &str) -> Result<Option<String>, ApiError>;

    /// Stops and deregisters a job
    async fn stop(&self, job_id: &str) -> Result<(), ApiError>;

    /// Clones the scheduler in a box
    fn clone_box(&self) -> Box<dyn Scheduler>;
}

impl Clone for Box<dyn Scheduler> {
    fn clone(&self) -> Box<dyn Scheduler> {
        self.clone_box()
    }
}

/// Scheduler backed by the Nomad HTTP API
#[derive(Debug, Clone)]
pub struct NomadScheduler {
    http: reqwest::Client,
    api: String,
    connector_version: String,
    router_domain: String,
    env: String,
}

impl NomadScheduler {
    /// Scheduler at `addr`, `http://` assumed without a scheme
    pub fn new(
        addr: &str,
        timeout: Duration,
        connector_version: &str,
        router_domain: &str,
        env: &str,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::SchedulerError(e.to_string()))?;
        let api = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", addr.trim_end_matches('/'))
        };
        Ok(NomadScheduler {
            http,
            api,
            connector_version: connector_version.to_string(),
            router_domain: router_domain.to_string(),
            env: env.to_string(),
        })
    }

    /// Job specification of a cocoon: a privileged connector task next to
    /// an idle code container the connector prepares
    pub fn job_spec(&self, job: &DeployJob) -> Value {
        let mut tags = vec![job.cocoon_id.clone()];
        let mut env = json!({
            "ROUTER_DOMAIN": self.router_domain,
            "VERSION": "${NOMAD_META_VERSION}",
            "ENV": self.env,
            "COCOON_ID": job.cocoon_id,
            "COCOON_RELEASE": job.release_id,
            "COCOON_DISK_LIMIT": job.disk_limit.to_string(),
            "COCOON_CONTAINER_NAME": "code-${NOMAD_ALLOC_ID}",
        });
        if !job.link.is_empty() {
            env["COCOON_LINK"] = json!(job.link);
            tags.push(format!("link_to:{}", job.link));
        }
        json!({
            "Job": {
                "ID": job.cocoon_id,
                "Name": job.cocoon_id,
                "Type": "service",
                "Priority": 50,
                "Region": "global",
                "Datacenters": ["dc1"],
                "Constraints": [{
                    "LTarget": "${attr.kernel.name}",
                    "RTarget": "linux",
                    "Operand": "=",
                }],
                "TaskGroups": [{
                    "Name": format!("cocoon-grp-{}", job.cocoon_id),
                    "Count": 1,
                    "Meta": {
                        "VERSION": self.connector_version,
                        "REPO_USER": "ncodes",
                    },
                    "Tasks": [
                        {
                            "Name": "connector",
                            "Driver": "docker",
                            "Config": {
                                "image": "${NOMAD_META_REPO_USER}/cocoon-launcher:latest",
                                "network_mode": "host",
                                "privileged": true,
                                "force_pull": true,
                                "volumes": ["/var/run/docker.sock:/var/run/docker.sock"],
                                "command": "cocoon",
                                "args": ["connector", "start"],
                            },
                            "Env": env,
                            "Services": [{
                                "Name": COCOON_SERVICE_NAME,
                                "Tags": tags,
                                "PortLabel": "RPC",
                            }],
                            "KillTimeout": 15_000_000_000u64,
                            "Resources": {
                                "CPU": 100,
                                "MemoryMB": 256,
                                "Networks": [{
                                    "MBits": 1,
                                    "DynamicPorts": [{"Label": "RPC"}, {"Label": "HTTP"}],
                                }],
                            },
                        },
                        {
                            "Name": "code",
                            "Driver": "docker",
                            "Config": {
                                "image": "${NOMAD_META_REPO_USER}/launch-go:latest",
                                "network_mode": "bridge",
                                "force_pull": true,
                                "command": "bash",
                                "args": ["-c", "tail -f /dev/null"],
                            },
                            "KillTimeout": 15_000_000_000u64,
                            "Resources": {
                                "CPU": job.cpu_share,
                                "MemoryMB": job.memory,
                                "Networks": [{
                                    "MBits": 1,
                                    "DynamicPorts": [{"Label": "RPC"}],
                                }],
                            },
                        },
                    ],
                    "RestartPolicy": {
                        "Interval": 300_000_000_000u64,
                        "Attempts": 10,
                        "Delay": 25_000_000_000u64,
                        "Mode": "delay",
                    },
                }],
                "Update": {"Stagger": 10_000_000_000u64, "MaxParallel": 1},
            }
        })
    }
}

fn scheduler_err(e: reqwest::Error) -> ApiError {
    ApiError::SchedulerError(e.to_string())
}

#[async_trait::async_trait]
impl Scheduler for NomadScheduler {
    async fn deploy(&self, job: &DeployJob) -> Result<DeploymentInfo, ApiError> {
        if job.cocoon_id.is_empty() {
            return Err(ApiError::Rejected("job id is required".into()));
        }
        debug!("deploying cocoon {} release {}", job.cocoon_id, job.release_id);
        let resp = self
            .http
            .post(format!("{}/v1/jobs", self.api))
            .json(&self.job_spec(job))
            .send()
            .await
            .map_err(scheduler_err)?;
        let status = resp.status();
        let body = resp.text().await.map_err(scheduler_err)?;
        if !status.is_success() {
            return Err(ApiError::SchedulerError(format!(
                "failed to deploy job spec ({}): {}",
                status, body
            )));
        }
        let info: Value = serde_json::from_str(&body)
            .map_err(|e| ApiError::SchedulerError(format!("{}: {}", e, body)))?;
        Ok(DeploymentInfo {
            id: job.cocoon_id.clone(),
            eval_id: info["EvalID"].as_str().unwrap_or_default().to_string(),
        })
    }

    async fn status(&self, job_id: &str) -> Result<Option<String>, ApiError> {
        let resp = self
            .http
            .get(format!("{}/v1/job/{}", self.api, job_id))
            .send()
            .await
            .map_err(scheduler_err)?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let body = resp.text().await.map_err(scheduler_err)?;
            return Err(ApiError::SchedulerError(body));
        }
        let job: Value = resp.json().await.map_err(scheduler_err)?;
        Ok(job["Status"].as_str().map(str::to_string))
    }

    async fn stop(&self, job_id: &str) -> Result<(), ApiError> {
        let resp = self
            .http
            .delete(format!("{}/v1/job/{}", self.api, job_id))
            .send()
            .await
            .map_err(scheduler_err)?;
        if !resp.status().is_success() {
            let body = resp.text().await.map_err(scheduler_err)?;
            return Err(ApiError::SchedulerError(body));
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Scheduler> {
        Box::new(self.clone())
    }
}
