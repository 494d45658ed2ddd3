// Copyright (c) 2023 The Cocoon Authors

use crate::cocoon_code::CocoonCodeClient;
use crate::config::ConnectorConfig;
use crate::container::{bash, ContainerInfo, ContainerRuntime};
use crate::error::{ConnectorError, EXIT_FAILED, EXIT_OK};
use crate::events::{LifecycleEvent, TaskHandle};
use crate::health::HealthChecker;
use crate::language::{find_language, Language};
use crate::monitor::{accumulate_net_usage, Monitor};
use crate::router::Router;
use crate::source::{fetch_script, firewall_script, SourceFetcher};
use cocoon_models::cocoon::{Cocoon, CocoonStatus, Release};
use cocoon_models::env::Env;
use cocoon_models::resources::ResourceSet;
use cocoon_orderer_worker::StopHandle;
use cocoon_platform::Platform;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Time the run command gets to fail before the code is considered running
const RUN_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Collaborators of a connector
pub struct ConnectorParts {
    /// platform records
    pub platform: Platform,
    /// container runtime
    pub runtime: Box<dyn ContainerRuntime>,
    /// client of the cocoon code
    pub code: Box<dyn CocoonCodeClient>,
    /// source archive resolution
    pub fetcher: SourceFetcher,
    /// reverse proxy registration, skipped when `None`
    pub router: Option<Router>,
}

/// Supervises one cocoon: prepares its container, runs its code, watches it
/// and records its status
pub struct Connector {
    config: ConnectorConfig,
    platform: Platform,
    runtime: Box<dyn ContainerRuntime>,
    code: Box<dyn CocoonCodeClient>,
    fetcher: SourceFetcher,
    router: Option<Router>,
    cocoon: Cocoon,
    release: Release,
    language: Box<dyn Language>,
    monitor: Monitor,
    container: Option<ContainerInfo>,
    status: CocoonStatus,
    events_tx: mpsc::UnboundedSender<LifecycleEvent>,
    events_rx: mpsc::UnboundedReceiver<LifecycleEvent>,
    health_handle: Option<TaskHandle>,
    monitor_handle: Option<TaskHandle>,
    run_task: Option<JoinHandle<()>>,
    servers: Vec<StopHandle>,
}

impl Connector {
    /// Reads the cocoon and the release to run. Fails when either is missing
    /// or cannot be deployed.
    pub async fn resolve(config: ConnectorConfig, parts: ConnectorParts) -> Result<Self, ConnectorError> {
        let (cocoon, release) = parts
            .platform
            .get_cocoon_and_release(&config.cocoon_id, &config.release_id, true)
            .await?;
        if release.cocoon_id != cocoon.id {
            return Err(ConnectorError::SpecError(format!(
                "release {} does not belong to cocoon {}",
                release.id, cocoon.id
            )));
        }
        let mut language = find_language(
            &release.language,
            &cocoon.id,
            &release.url,
            config.dev_run_root_bin,
        )?;
        language.set_build_params(&release.build_param)?;
        let disk_limit = match config.disk_limit {
            Some(limit) => limit,
            None => ResourceSet::find(cocoon.memory, cocoon.cpu_share)
                .map(|s| s.disk_bytes())
                .ok_or_else(|| {
                    ConnectorError::SpecError(format!(
                        "no resource set with {}MB memory and {} cpu share",
                        cocoon.memory, cocoon.cpu_share
                    ))
                })?,
        };
        let monitor = Monitor::new(parts.runtime.clone(), config.monitor_interval, disk_limit);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        info!(
            "connector: cocoon {} release {} ({} from {})",
            cocoon.id, release.id, release.language, release.url
        );
        Ok(Connector {
            config,
            platform: parts.platform,
            runtime: parts.runtime,
            code: parts.code,
            fetcher: parts.fetcher,
            router: parts.router,
            status: cocoon.status,
            cocoon,
            release,
            language,
            monitor,
            container: None,
            events_tx,
            events_rx,
            health_handle: None,
            monitor_handle: None,
            run_task: None,
            servers: Vec::new(),
        })
    }

    /// The managed cocoon, as read at startup
    pub fn cocoon(&self) -> &Cocoon {
        &self.cocoon
    }

    /// The release being run
    pub fn release(&self) -> &Release {
        &self.release
    }

    /// Last status written by this connector
    pub fn status(&self) -> CocoonStatus {
        self.status
    }

    /// Sends events to the connector, [`LifecycleEvent::Stop`] to stop it
    pub fn event_sender(&self) -> mpsc::UnboundedSender<LifecycleEvent> {
        self.events_tx.clone()
    }

    /// Servers stopped with the connector, after the health checker
    pub fn attach_server(&mut self, handle: StopHandle) {
        self.servers.push(handle);
    }

    /// Address the cocoon code reaches the connector service at
    pub fn connector_addr(&self) -> SocketAddr {
        let mut addr = self.config.bind;
        if addr.ip().is_unspecified() {
            addr.set_ip(IpAddr::V4(Ipv4Addr::LOCALHOST));
        }
        addr
    }

    /// Address the cocoon code binds its stub service to
    pub fn cocoon_code_addr(&self) -> String {
        match &self.config.dev_cocoon_code_addr {
            Some(addr) => addr.clone(),
            None => format!("127.0.0.1:{}", self.config.cocoon_code_port),
        }
    }

    /// Environment of the cocoon code: the release's variables with their
    /// flags applied, then the variables set by the platform
    pub fn run_env(&self) -> Env {
        let mut env = self.release.env.process_as_one(false);
        env.set("COCOON_ID", &self.cocoon.id);
        env.set("CONNECTOR_RPC_ADDR", &self.connector_addr().to_string());
        env.set("COCOON_RPC_ADDR", &self.cocoon_code_addr());
        env.set("COCOON_LINK", &self.release.link);
        env.set("COCOON_CODE_VERSION", &self.release.version);
        env
    }

    /// Records `status` on the cocoon. Failures are logged only.
    async fn set_status(&mut self, status: CocoonStatus) {
        self.status = status;
        let res = async {
            let mut cocoon = self.platform.get_cocoon(&self.cocoon.id).await?;
            cocoon.status = status;
            self.platform.put_cocoon(&cocoon).await?;
            Ok::<_, ConnectorError>(cocoon)
        }
        .await;
        match res {
            Ok(cocoon) => {
                debug!("connector: cocoon status set to {}", status);
                self.cocoon = cocoon;
            }
            Err(err) => warn!("connector: failed to set cocoon status to {}: {}", status, err),
        }
    }

    async fn exec(&self, label: &str, script: &str, privileged: bool) -> Result<i32, ConnectorError> {
        let id = self
            .container
            .as_ref()
            .map(|c| c.id.clone())
            .ok_or_else(|| ConnectorError::ContainerError("no container".into()))?;
        self.runtime.exec(&id, label, bash(script), privileged).await
    }

    async fn find_container(&mut self) -> Result<ContainerInfo, ConnectorError> {
        if self.config.container_name.is_empty() {
            return Err(ConnectorError::ConfigError("container name is unknown".into()));
        }
        let container = self
            .runtime
            .find(&self.config.container_name)
            .await?
            .ok_or_else(|| {
                ConnectorError::ContainerError("cocoon code container has not been started".into())
            })?;
        if !container.running {
            self.runtime.start(&container.id).await?;
        }
        self.container = Some(container.clone());
        Ok(container)
    }

    async fn fetch_source(&mut self) -> Result<(), ConnectorError> {
        let tarball = self
            .fetcher
            .tarball_url(&self.release.url, &self.release.version)
            .await?;
        let version = if self.release.version.is_empty() {
            "latest"
        } else {
            &self.release.version
        };
        info!("connector: downloading cocoon repository with version={}", version);
        let script = fetch_script(self.language.as_ref(), &self.cocoon.id, &tarball);
        match self.exec("FETCH", &script, true).await? {
            0 => {
                info!("connector: fetch succeeded");
                Ok(())
            }
            code => Err(ConnectorError::FetchError(format!(
                "fetch has failed with exit code={}",
                code
            ))),
        }
    }

    async fn build(&mut self) -> Result<(), ConnectorError> {
        info!("connector: building cocoon code");
        self.set_status(CocoonStatus::Building).await;
        let script = self.language.build_script();
        match self.exec("BUILD", &script, false).await? {
            0 => {
                info!("connector: build succeeded");
                Ok(())
            }
            code => Err(ConnectorError::BuildError(format!(
                "build has failed with exit code={}",
                code
            ))),
        }
    }

    async fn configure_firewall(&mut self) -> Result<(), ConnectorError> {
        info!("connector: configuring firewall for cocoon");
        let script = firewall_script(
            self.connector_addr(),
            self.config.cocoon_code_port,
            &self.release.firewall,
        );
        match self.exec("CONFIG-FIREWALL", &script, true).await? {
            0 => Ok(()),
            code => Err(ConnectorError::ExecFailed("CONFIG-FIREWALL".into(), code)),
        }
    }

    /// Fetches, builds and locks down the container
    async fn prepare(&mut self) -> Result<(), ConnectorError> {
        self.find_container().await?;
        self.fetch_source().await?;
        if self.language.requires_build() {
            self.build().await?;
        }
        self.configure_firewall().await
    }

    fn spawn_run(&mut self, container_id: &str) {
        let runtime = self.runtime.clone();
        let events = self.events_tx.clone();
        let id = container_id.to_string();
        let script = self.language.run_script(&self.run_env());
        self.run_task = Some(tokio::spawn(async move {
            let code = match runtime.exec(&id, "RUN", bash(&script), false).await {
                Ok(code) => code,
                Err(err) => {
                    error!("connector: {}", err);
                    EXIT_FAILED
                }
            };
            let _ = events.send(LifecycleEvent::CodeExited(code));
        }));
    }

    fn start_health_checker(&mut self) {
        let checker = HealthChecker::new(self.code.clone(), self.config.health.clone());
        self.health_handle = Some(checker.start(self.events_tx.clone()));
    }

    async fn register_route(&self) {
        if let Some(router) = &self.router {
            if let Err(err) = router.register(&self.cocoon.id, &self.release.link).await {
                warn!("connector: failed to register route: {}", err);
            }
        }
    }

    /// Prepares the container and starts the cocoon code
    async fn start_code(&mut self) -> Result<(), ConnectorError> {
        self.prepare().await?;
        let container_id = self
            .container
            .as_ref()
            .map(|c| c.id.clone())
            .ok_or_else(|| ConnectorError::ContainerError("no container".into()))?;
        self.monitor_handle = Some(self.monitor.start(&container_id, self.events_tx.clone()));
        info!("connector: starting cocoon code");
        self.spawn_run(&container_id);
        tokio::time::sleep(RUN_SETTLE_DELAY).await;
        self.set_status(CocoonStatus::Running).await;
        self.start_health_checker();
        self.register_route().await;
        Ok(())
    }

    /// Brings the cocoon code up. With a development code address, only the
    /// health checks run.
    pub async fn launch(&mut self) -> Result<(), ConnectorError> {
        self.set_status(CocoonStatus::Starting).await;
        if self.config.is_dev_code() {
            info!(
                "connector: [dev] will interact with cocoon code at {}",
                self.cocoon_code_addr()
            );
            self.set_status(CocoonStatus::Running).await;
            self.start_health_checker();
            return Ok(());
        }
        if !self.config.bridge_name.is_empty() {
            debug!("connector: container bridge {}", self.config.bridge_name);
        }
        self.start_code().await
    }

    async fn stop_tasks(&mut self) {
        if let Some(handle) = self.health_handle.take() {
            handle.stop().await;
        }
        if let Some(handle) = self.monitor_handle.take() {
            handle.stop().await;
        }
        if let Some(task) = self.run_task.take() {
            task.abort();
        }
    }

    /// Removes the container and starts over
    pub async fn restart(&mut self) -> Result<(), ConnectorError> {
        info!("connector: restarting cocoon code");
        self.stop_tasks().await;
        if let Some(container) = self.container.take() {
            self.runtime.remove(&container.id).await?;
        }
        self.set_status(CocoonStatus::Starting).await;
        self.start_code().await
    }

    async fn persist_net_usage(&mut self) {
        let sample = self.monitor.last_report();
        let res = async {
            let mut cocoon = self.platform.get_cocoon(&self.cocoon.id).await?;
            cocoon.resource_usage = accumulate_net_usage(cocoon.resource_usage, sample);
            self.platform.put_cocoon(&cocoon).await?;
            Ok::<_, ConnectorError>(cocoon)
        }
        .await;
        match res {
            Ok(cocoon) => self.cocoon = cocoon,
            Err(err) => warn!("connector: failed to persist network usage: {}", err),
        }
    }

    /// Stops the health checker, the servers and the monitor, then records
    /// the usage and the `stopped` status. Returns `exit_code`.
    pub async fn stop(&mut self, exit_code: i32) -> i32 {
        info!("connector: stopping with exit code {}", exit_code);
        if let Some(handle) = self.health_handle.take() {
            handle.stop().await;
        }
        if exit_code == EXIT_OK && self.status == CocoonStatus::Running {
            if let Err(err) = self.code.stop().await {
                debug!("connector: cocoon code stop: {}", err);
            }
        }
        for server in self.servers.drain(..) {
            server.stop();
        }
        self.stop_tasks().await;
        if !self.config.is_dev_code() {
            self.persist_net_usage().await;
        }
        self.set_status(CocoonStatus::Stopped).await;
        exit_code
    }

    /// Launches the cocoon code and supervises it until it stops. Returns
    /// the exit code of the connector process.
    pub async fn run(mut self) -> i32 {
        if let Err(err) = self.launch().await {
            error!("connector: {}", err);
            let code = err.exit_code();
            return self.stop(code).await;
        }
        loop {
            let Some(event) = self.events_rx.recv().await else {
                return self.stop(EXIT_FAILED).await;
            };
            match event {
                LifecycleEvent::CocoonDead => {
                    info!("connector: cocoon code has failed health check, stopping");
                    return self.stop(EXIT_FAILED).await;
                }
                LifecycleEvent::DiskLimitExceeded { usage, limit } => {
                    error!(
                        "connector: cocoon code has used more than its allocated disk space ({} of {} bytes)",
                        usage, limit
                    );
                    if let Err(err) = self.restart().await {
                        error!("connector: restart failed: {}", err);
                        let code = err.exit_code();
                        return self.stop(code).await;
                    }
                }
                LifecycleEvent::CodeExited(code) => {
                    self.run_task = None;
                    if code == 0 {
                        info!("connector: cocoon code successfully stopped");
                        return self.stop(EXIT_OK).await;
                    }
                    error!("connector: cocoon code exited with code={}", code);
                    return self.stop(EXIT_FAILED).await;
                }
                LifecycleEvent::Stop { failed } => {
                    let code = if failed { EXIT_FAILED } else { EXIT_OK };
                    return self.stop(code).await;
                }
            }
        }
    }
}
