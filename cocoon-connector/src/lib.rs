// Copyright (c) 2023 The Cocoon Authors

//! Connector: the process supervising one cocoon.
//!
//! The connector reads the cocoon and the release it was started for, prepares
//! the container the scheduler created for it (source fetch, build, firewall),
//! runs the cocoon code and watches it through health checks and resource
//! sampling. It also serves the connector service the cocoon code calls to
//! reach ledgers, locks and linked cocoons, and exposes an HTTP invoke
//! endpoint.
//!
//! The process exit code tells the scheduler how the cocoon ended, see
//! [`ConnectorError::exit_code`].
#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]

mod cocoon_code;
mod config;
mod connector;
mod container;
mod error;
mod events;
mod health;
mod language;
mod monitor;
mod proxy;
mod router;
mod server;
mod source;

#[cfg(any(test, feature = "test-exports"))]
pub use cocoon_code::MockCocoonCodeClient;
pub use cocoon_code::{CocoonCodeClient, GrpcCocoonCodeClient};
pub use config::{ConnectorConfig, HealthCheckConfig, DEFAULT_ROUTER_DOMAIN};
pub use connector::{Connector, ConnectorParts};
#[cfg(any(test, feature = "test-exports"))]
pub use container::MockContainerRuntime;
pub use container::{bash, ContainerInfo, ContainerRuntime, ContainerStats, DockerCli};
pub use error::{
    ConnectorError, EXIT_BUILD_FAILED, EXIT_FAILED, EXIT_FETCH_FAILED, EXIT_INVALID_SPEC, EXIT_OK,
};
pub use events::{LifecycleEvent, TaskHandle};
pub use health::HealthChecker;
pub use language::{find_language, GoLanguage, Language};
pub use monitor::{accumulate_net_usage, Monitor};
pub use proxy::ConnectorProxy;
pub use router::Router;
pub use server::{http_router, serve_connector, serve_http, InvokeBody};
pub use source::{fetch_script, firewall_script, SourceFetcher};

use cocoon_consul::ConsulClient;
use cocoon_lock_exports::LockManager;
use cocoon_orderer_exports::OrdererConfig;
use cocoon_orderer_worker::{DiscoveryHandle, OrdererClient, OrdererDiscovery};
use cocoon_platform::Platform;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// A started connector with the services it owns
pub struct ConnectorWorker {
    connector: Connector,
    lock_manager: Box<dyn LockManager>,
    discovery: DiscoveryHandle,
}

impl ConnectorWorker {
    /// Sends events to the connector, [`LifecycleEvent::Stop`] to stop it
    pub fn stopper(&self) -> mpsc::UnboundedSender<LifecycleEvent> {
        self.connector.event_sender()
    }

    /// Supervises the cocoon until it stops, then stops the lock backend and
    /// the orderer discovery. Returns the process exit code.
    pub async fn run(self) -> i32 {
        let ConnectorWorker {
            connector,
            mut lock_manager,
            discovery,
        } = self;
        let code = connector.run().await;
        lock_manager.stop();
        discovery.stop().await;
        info!("connector stopped with exit code {}", code);
        code
    }
}

/// Resolves the cocoon of `config` and starts the services of its connector
pub async fn start_connector_worker(config: ConnectorConfig) -> Result<ConnectorWorker, ConnectorError> {
    let orderer_config = OrdererConfig {
        consul_addr: config.consul_addr.clone(),
        dev_orderer_addr: config.dev_orderer_addr.clone(),
        request_timeout: config.request_timeout,
        ..Default::default()
    };
    let discovery = OrdererDiscovery::from_config(&orderer_config)?;
    let orderer = OrdererClient::new(discovery.clone(), config.request_timeout);
    let discovery = discovery.start(orderer_config.discovery_interval).await?;
    let platform = Platform::new(Box::new(orderer));

    let (lock_manager, locks) = cocoon_lock_worker::start_lock_worker(config.lock.clone())?;

    let code_addr = match &config.dev_cocoon_code_addr {
        Some(addr) => addr.clone(),
        None => format!("127.0.0.1:{}", config.cocoon_code_port),
    };
    let code: Box<dyn CocoonCodeClient> =
        Box::new(GrpcCocoonCodeClient::new(&code_addr, config.request_timeout));
    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| ConnectorError::ConfigError(format!("http client: {}", e)))?;
    let router = if config.is_dev_code() {
        None
    } else {
        match ConsulClient::new(&config.consul_addr, Duration::from_secs(10)) {
            Ok(consul) => Some(Router::new(consul, &config.router_domain)),
            Err(err) => {
                warn!("connector: routing disabled: {}", err);
                None
            }
        }
    };

    let parts = ConnectorParts {
        platform: platform.clone(),
        runtime: Box::new(DockerCli::default()),
        code: code.clone(),
        fetcher: SourceFetcher::new(http),
        router,
    };
    let bind = config.bind;
    let http_bind = config.http_bind;
    let request_timeout = config.request_timeout;
    let mut connector = Connector::resolve(config, parts).await?;

    let proxy = ConnectorProxy::new(
        &connector.cocoon().id,
        &connector.release().link,
        platform,
        locks,
        code.clone(),
    );
    let grpc = serve_connector(proxy, bind, request_timeout).await?;
    connector.attach_server(grpc);
    let http = serve_http(&connector.cocoon().id, code, http_bind).await?;
    connector.attach_server(http);

    Ok(ConnectorWorker {
        connector,
        lock_manager,
        discovery,
    })
}

#[cfg(test)]
mod tests;
