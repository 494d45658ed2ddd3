// Copyright (c) 2023 The Cocoon Authors

use crate::error::ConnectorError;
use cocoon_lock_exports::LockConfig;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Domain the cocoon frontends are routed under when `ROUTER_DOMAIN` is unset
pub const DEFAULT_ROUTER_DOMAIN: &str = "whatbay.co";

/// Health checks of the cocoon code
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// delay before the first check
    pub warmup: Duration,
    /// time between two checks
    pub interval: Duration,
    /// deadline of one call
    pub timeout: Duration,
    /// calls of one check before the code is declared dead
    pub attempts: u32,
    /// pause after a failed call
    pub retry_delay: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        HealthCheckConfig {
            warmup: Duration::from_secs(2),
            interval: Duration::from_secs(15),
            timeout: Duration::from_secs(5),
            attempts: 5,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Connector configuration
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// id of the managed cocoon
    pub cocoon_id: String,
    /// id of the release to run
    pub release_id: String,
    /// name of the container the scheduler started for the cocoon
    pub container_name: String,
    /// domain of the routed frontends
    pub router_domain: String,
    /// KV/catalog service address
    pub consul_addr: String,
    /// fixed orderer address, bypasses discovery
    pub dev_orderer_addr: Option<String>,
    /// address of an already running cocoon code, skips fetch, build and run
    pub dev_cocoon_code_addr: Option<String>,
    /// network bridge of the container, used to reach the connector from the container
    pub bridge_name: String,
    /// deployment environment (`production`, `development`, `test`)
    pub env: String,
    /// run the `ccode` binary found at the source root instead of building
    pub dev_run_root_bin: bool,
    /// disk limit in bytes, taken from the resource set when unset
    pub disk_limit: Option<u64>,
    /// connector service address
    pub bind: SocketAddr,
    /// invoke and health HTTP address
    pub http_bind: SocketAddr,
    /// port the cocoon code binds its stub service to
    pub cocoon_code_port: u16,
    /// deadline of the calls to the orderer and the cocoon code
    pub request_timeout: Duration,
    /// time between two resource samples
    pub monitor_interval: Duration,
    /// cocoon code health checks
    pub health: HealthCheckConfig,
    /// lock backend
    pub lock: LockConfig,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        ConnectorConfig {
            cocoon_id: String::new(),
            release_id: String::new(),
            container_name: String::new(),
            router_domain: DEFAULT_ROUTER_DOMAIN.to_string(),
            consul_addr: "http://127.0.0.1:8500".to_string(),
            dev_orderer_addr: None,
            dev_cocoon_code_addr: None,
            bridge_name: String::new(),
            env: "development".to_string(),
            dev_run_root_bin: false,
            disk_limit: None,
            bind: SocketAddr::from(([0, 0, 0, 0], 8002)),
            http_bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            cocoon_code_port: 8000,
            request_timeout: Duration::from_secs(60),
            monitor_interval: Duration::from_secs(1),
            health: HealthCheckConfig::default(),
            lock: LockConfig::default(),
        }
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>, ConnectorError> {
    var(name)
        .map(|v| {
            v.parse()
                .map_err(|_| ConnectorError::ConfigError(format!("invalid value for {}: {}", name, v)))
        })
        .transpose()
}

impl ConnectorConfig {
    /// Completes `base` with the variables the scheduler sets for the connector
    pub fn from_env(base: ConnectorConfig) -> Result<Self, ConnectorError> {
        let cocoon_id = var("COCOON_ID")
            .ok_or_else(|| ConnectorError::ConfigError("COCOON_ID is not set".into()))?;
        let release_id = var("COCOON_RELEASE")
            .ok_or_else(|| ConnectorError::ConfigError("COCOON_RELEASE is not set".into()))?;
        let consul_addr = var("CONSUL_ADDR").unwrap_or(base.consul_addr);
        Ok(ConnectorConfig {
            cocoon_id,
            release_id,
            container_name: var("COCOON_CONTAINER_NAME").unwrap_or(base.container_name),
            router_domain: var("ROUTER_DOMAIN").unwrap_or(base.router_domain),
            lock: LockConfig {
                consul_addr: consul_addr.clone(),
                ..base.lock
            },
            consul_addr,
            dev_orderer_addr: var("DEV_ORDERER_ADDR").or(base.dev_orderer_addr),
            dev_cocoon_code_addr: var("DEV_ADDR_COCOON_CODE_RPC").or(base.dev_cocoon_code_addr),
            bridge_name: var("BRIDGE_NAME").unwrap_or(base.bridge_name),
            env: var("ENV").unwrap_or(base.env),
            dev_run_root_bin: var("DEV_RUN_ROOT_BIN").is_some() || base.dev_run_root_bin,
            disk_limit: parse_var("COCOON_DISK_LIMIT")?.or(base.disk_limit),
            ..base
        })
    }

    /// Whether the cocoon code is run and supervised by someone else
    pub fn is_dev_code(&self) -> bool {
        self.dev_cocoon_code_addr.is_some()
    }
}
