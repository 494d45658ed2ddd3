// Copyright (c) 2023 The Cocoon Authors

use crate::error::RuntimeError;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Default ledger of the native and own links
pub const DEFAULT_LEDGER: &str = "main";

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// id of the running cocoon
    pub cocoon_id: String,
    /// id of the natively linked cocoon, empty when not linked
    pub link: String,
    /// address the stub service binds
    pub rpc_addr: SocketAddr,
    /// address of the connector service
    pub connector_rpc_addr: String,
    /// maximum transactions per block
    pub tx_per_block: usize,
    /// time between two block creations
    pub block_creation_interval: Duration,
    /// deadline of a call to the connector
    pub request_timeout: Duration,
    /// time left to the connector before the code is initialized
    pub init_delay: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            cocoon_id: String::new(),
            link: String::new(),
            rpc_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            connector_rpc_addr: String::new(),
            tx_per_block: 100,
            block_creation_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(60),
            init_delay: Duration::from_secs(1),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> Result<T, RuntimeError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map_err(|_| RuntimeError::ConfigError(format!("invalid value for {}: {}", name, v))),
        _ => Ok(default),
    }
}

impl RuntimeConfig {
    /// Reads the configuration the connector sets in the cocoon's environment
    pub fn from_env() -> Result<Self, RuntimeError> {
        let default = RuntimeConfig::default();
        let cocoon_id = std::env::var("COCOON_ID").unwrap_or_default();
        if cocoon_id.is_empty() {
            return Err(RuntimeError::ConfigError("COCOON_ID is not set".into()));
        }
        let rpc_addr = match std::env::var("COCOON_RPC_ADDR") {
            Ok(addr) if !addr.trim().is_empty() => {
                let addr = addr.trim();
                let full = if addr.starts_with(':') {
                    format!("0.0.0.0{}", addr)
                } else {
                    addr.to_string()
                };
                full.parse().map_err(|_| {
                    RuntimeError::ConfigError(format!("invalid COCOON_RPC_ADDR: {}", addr))
                })?
            }
            _ => default.rpc_addr,
        };
        Ok(RuntimeConfig {
            cocoon_id,
            link: std::env::var("COCOON_LINK").unwrap_or_default(),
            rpc_addr,
            connector_rpc_addr: std::env::var("CONNECTOR_RPC_ADDR").unwrap_or_default(),
            tx_per_block: env_or("TX_PER_BLOCK", default.tx_per_block)?,
            block_creation_interval: Duration::from_secs(env_or(
                "BLOCK_CREATION_INT",
                default.block_creation_interval.as_secs(),
            )?),
            ..default
        })
    }

    /// Cocoon whose resources the native link reaches
    pub fn native_id(&self) -> &str {
        if self.link.is_empty() {
            &self.cocoon_id
        } else {
            &self.link
        }
    }
}
