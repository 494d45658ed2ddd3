// Copyright (c) 2023 The Cocoon Authors

//! Platform API: identities, sessions, cocoons, releases, signatories, votes
//! and deployments.
//!
//! Records are kept on the system ledgers through the orderers. Deployments
//! are handed to the cluster job scheduler, which starts a connector for the
//! cocoon. Every call but identity creation, identity reads, login and record
//! reads requires a session token obtained at login.
#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]

mod auth;
mod config;
mod error;
mod scheduler;
mod server;
mod service;

pub use auth::{hash_password, request_token, verify_password, Claims, TokenSigner, TOKEN_TYPE_CLI};
pub use config::{ApiConfig, DEFAULT_SIGN_KEY, TOKEN_TTL};
pub use error::ApiError;
#[cfg(any(test, feature = "test-exports"))]
pub use scheduler::MockScheduler;
pub use scheduler::{DeployJob, DeploymentInfo, NomadScheduler, Scheduler, COCOON_SERVICE_NAME};
pub use server::ApiGrpc;
pub use service::{ApiService, SignatoriesOutcome, UpdateOutcome, VoteOutcome};

use cocoon_orderer_exports::OrdererConfig;
use cocoon_orderer_worker::{DiscoveryHandle, OrdererClient, OrdererDiscovery, StopHandle};
use cocoon_platform::Platform;
use std::net::SocketAddr;
use tracing::info;

/// A running API server with the orderer discovery it uses
pub struct ApiWorker {
    grpc: StopHandle,
    discovery: DiscoveryHandle,
}

impl ApiWorker {
    /// Address the API is served on
    pub fn local_addr(&self) -> SocketAddr {
        self.grpc.local_addr()
    }

    /// Stops the server then the discovery
    pub async fn stop(self) {
        self.grpc.stop();
        self.discovery.stop().await;
        info!("api stopped");
    }
}

/// Starts the API described by `config`
pub async fn start_api_worker(config: ApiConfig) -> Result<ApiWorker, ApiError> {
    let orderer_config = OrdererConfig {
        consul_addr: config.consul_addr.clone(),
        dev_orderer_addr: config.dev_orderer_addr.clone(),
        request_timeout: config.request_timeout,
        ..Default::default()
    };
    let discovery = OrdererDiscovery::from_config(&orderer_config)?;
    let orderer = OrdererClient::new(discovery.clone(), config.request_timeout);
    let discovery = discovery.start(orderer_config.discovery_interval).await?;

    let scheduler = NomadScheduler::new(
        &config.scheduler_addr,
        config.request_timeout,
        &config.connector_version,
        &config.router_domain,
        &config.env,
    )?;
    let service = ApiService::new(
        Platform::new(Box::new(orderer)),
        Box::new(scheduler),
        TokenSigner::new(&config.sign_key, config.token_ttl),
    );
    let grpc = ApiGrpc::new(service).serve(&config).await?;
    Ok(ApiWorker { grpc, discovery })
}

#[cfg(test)]
mod tests;
