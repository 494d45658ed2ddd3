// Copyright (c) 2023 The Cocoon Authors

use cocoon_consul::ConsulClient;
use cocoon_orderer_exports::{OrdererConfig, OrdererError};
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Catalog service the orderers register under
pub const ORDERER_SERVICE_NAME: &str = "orderers";

/// Addresses of the reachable orderers
#[derive(Debug, Clone, Default)]
pub struct OrdererDiscovery {
    addrs: Arc<RwLock<Vec<String>>>,
    consul: Option<ConsulClient>,
    dev_addr: Option<String>,
}

impl OrdererDiscovery {
    /// Discovery through the catalog, or pinned to `config.dev_orderer_addr`
    pub fn from_config(config: &OrdererConfig) -> Result<Self, OrdererError> {
        if let Some(addr) = config.dev_orderer_addr.as_ref().filter(|a| !a.is_empty()) {
            return Ok(Self::with_addrs(vec![addr.clone()]));
        }
        let consul = ConsulClient::new(&config.consul_addr, Duration::from_secs(10))
            .map_err(|e| OrdererError::DiscoveryError(e.to_string()))?;
        Ok(OrdererDiscovery {
            consul: Some(consul),
            ..Default::default()
        })
    }

    /// Fixed list of addresses
    pub fn with_addrs(addrs: Vec<String>) -> Self {
        OrdererDiscovery {
            dev_addr: addrs.first().cloned(),
            addrs: Arc::new(RwLock::new(addrs)),
            consul: None,
        }
    }

    /// Refreshes the address list
    pub async fn discover(&self) -> Result<(), OrdererError> {
        if self.dev_addr.is_some() {
            return Ok(());
        }
        let Some(consul) = &self.consul else {
            return Ok(());
        };
        let services = consul
            .catalog_service(ORDERER_SERVICE_NAME, None)
            .await
            .map_err(|e| OrdererError::DiscoveryError(e.to_string()))?;
        let mut addrs: Vec<String> = services.iter().map(|s| s.addr()).collect();
        addrs.sort();
        addrs.dedup();
        debug!("discovered {} orderer(s)", addrs.len());
        *self.addrs.write() = addrs;
        Ok(())
    }

    /// Adds an address
    pub fn add(&self, addr: &str) {
        let mut addrs = self.addrs.write();
        if !addrs.iter().any(|a| a == addr) {
            addrs.push(addr.to_string());
        }
    }

    /// Known addresses
    pub fn addrs(&self) -> Vec<String> {
        self.addrs.read().clone()
    }

    /// Number of known addresses
    pub fn len(&self) -> usize {
        self.addrs.read().len()
    }

    /// true when no orderer is known
    pub fn is_empty(&self) -> bool {
        self.addrs.read().is_empty()
    }

    /// A random known address
    pub fn rand_addr(&self) -> Option<String> {
        self.addrs.read().choose(&mut rand::thread_rng()).cloned()
    }

    /// Discovers once, then every `interval` until the handle is stopped
    pub async fn start(self, interval: Duration) -> Result<DiscoveryHandle, OrdererError> {
        self.discover().await?;
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        if let Err(err) = self.discover().await {
                            error!("orderer discovery: {}", err);
                        }
                    }
                }
            }
            info!("orderer discovery stopped");
        });
        Ok(DiscoveryHandle { stop_tx, join })
    }
}

/// Stops a running discovery
pub struct DiscoveryHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl DiscoveryHandle {
    /// Stops the discovery loop and waits for it
    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        if let Err(err) = self.join.await {
            error!("orderer discovery task failed: {}", err);
        }
    }
}
