// Copyright (c) 2023 The Cocoon Authors

use crate::error::ConnectorError;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// A container known to the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// container id
    pub id: String,
    /// whether it is running
    pub running: bool,
}

/// Resource sample of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerStats {
    /// bytes written to the container's root filesystem
    pub disk_usage: u64,
    /// bytes received
    pub net_rx: u64,
    /// bytes sent
    pub net_tx: u64,
}

/// The container runtime the connector drives
#[cfg_attr(any(test, feature = "test-exports"), mockall::automock)]
#[async_trait::async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Container named `name`, running or not
    async fn find(&self, name: &str) -> Result<Option<ContainerInfo>, ConnectorError>;

    /// Starts a stopped container
    async fn start(&self, id: &str) -> Result<(), ConnectorError>;

    /// Runs `cmd` in the container until it exits and returns its exit code.
    /// Output lines are logged under `label`.
    async fn exec(
        &self,
        id: &str,
        label: &str,
        cmd: Vec<String>,
        privileged: bool,
    ) -> Result<i32, ConnectorError>;

    /// Current resource usage
    async fn stats(&self, id: &str) -> Result<ContainerStats, ConnectorError>;

    /// Removes the container and its volumes
    async fn remove(&self, id: &str) -> Result<(), ConnectorError>;

    /// Clones the runtime in a box
    fn clone_box(&self) -> Box<dyn ContainerRuntime>;
}

impl Clone for Box<dyn ContainerRuntime> {
    fn clone(&self) -> Box<dyn ContainerRuntime> {
        self.clone_box()
    }
}

/// `bash -c <script>`
pub fn bash(script: &str) -> Vec<String> {
    vec!["bash".into(), "-c".into(), script.into()]
}

/// Drives the local docker daemon through its command line client
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        DockerCli {
            binary: "docker".into(),
        }
    }
}

impl DockerCli {
    /// Client calling `binary`
    pub fn new(binary: &str) -> Self {
        DockerCli {
            binary: binary.to_string(),
        }
    }

    async fn output(&self, args: &[&str]) -> Result<String, ConnectorError> {
        debug!("docker {}", args.join(" "));
        let out = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ConnectorError::ContainerError(format!("failed to run docker: {}", e)))?;
        if !out.status.success() {
            return Err(ConnectorError::ContainerError(format!(
                "docker {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }
}

/// `id state` lines of `docker ps --format`
fn parse_ps_line(line: &str) -> Option<ContainerInfo> {
    let mut parts = line.split_whitespace();
    let id = parts.next()?;
    let state = parts.next().unwrap_or_default();
    Some(ContainerInfo {
        id: id.to_string(),
        running: state == "running",
    })
}

fn parse_counter(v: Option<&str>) -> u64 {
    v.and_then(|v| v.trim().parse().ok()).unwrap_or_default()
}

#[async_trait::async_trait]
impl ContainerRuntime for DockerCli {
    async fn find(&self, name: &str) -> Result<Option<ContainerInfo>, ConnectorError> {
        let filter = format!("name=^/{}$", name);
        let out = self
            .output(&["ps", "-a", "--filter", &filter, "--format", "{{.ID}} {{.State}}"])
            .await?;
        Ok(out.lines().find_map(parse_ps_line))
    }

    async fn start(&self, id: &str) -> Result<(), ConnectorError> {
        self.output(&["start", id]).await.map(drop)
    }

    async fn exec(
        &self,
        id: &str,
        label: &str,
        cmd: Vec<String>,
        privileged: bool,
    ) -> Result<i32, ConnectorError> {
        let mut args = vec!["exec".to_string()];
        if privileged {
            args.push("--privileged".into());
        }
        args.push(id.to_string());
        args.extend(cmd);
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ConnectorError::ContainerError(format!("failed to start exec [{}]: {}", label, e)))?;

        let mut tasks = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            let label = label.to_string();
            tasks.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!("[{}] {}", label, line);
                }
            }));
        }
        if let Some(stderr) = child.stderr.take() {
            let label = label.to_string();
            tasks.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!("[{}] {}", label, line);
                }
            }));
        }

        let status = child
            .wait()
            .await
            .map_err(|e| ConnectorError::ContainerError(format!("exec [{}] lost: {}", label, e)))?;
        for task in tasks {
            let _ = task.await;
        }
        Ok(status.code().unwrap_or(-1))
    }

    async fn stats(&self, id: &str) -> Result<ContainerStats, ConnectorError> {
        let size = self
            .output(&["inspect", "--size", "--format", "{{.SizeRw}}", id])
            .await?;
        let net = self
            .output(&[
                "exec",
                id,
                "cat",
                "/sys/class/net/eth0/statistics/rx_bytes",
                "/sys/class/net/eth0/statistics/tx_bytes",
            ])
            .await
            .unwrap_or_default();
        let mut net = net.lines();
        Ok(ContainerStats {
            disk_usage: parse_counter(Some(&size)),
            net_rx: parse_counter(net.next()),
            net_tx: parse_counter(net.next()),
        })
    }

    async fn remove(&self, id: &str) -> Result<(), ConnectorError> {
        self.output(&["rm", "--force", "--volumes", id]).await.map(drop)
    }

    fn clone_box(&self) -> Box<dyn ContainerRuntime> {
        Box::new(self.clone())
    }
}
