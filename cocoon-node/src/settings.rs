// Copyright (c) 2023 The Cocoon Authors

//! Build here the default node settings from the configuration file toml
use cocoon_api::ApiConfig;
use cocoon_connector::{ConnectorConfig, HealthCheckConfig};
use cocoon_lock_exports::{LockBackendKind, LockConfig};
use cocoon_models::config::build_cocoon_settings;
use cocoon_models::ModelsError;
use cocoon_orderer_exports::OrdererConfig;
use cocoon_time::CocoonTime;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct LoggingSettings {
    pub level: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OrdererSettings {
    pub bind: SocketAddr,
    pub store_path: PathBuf,
    pub put_max_attempts: u32,
    pub put_retry_delay: CocoonTime,
    pub discovery_interval: CocoonTime,
    pub consul_addr: String,
    pub request_timeout: CocoonTime,
    pub enable_health: bool,
    pub enable_reflection: bool,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct HealthSettings {
    pub warmup: CocoonTime,
    pub interval: CocoonTime,
    pub timeout: CocoonTime,
    pub attempts: u32,
    pub retry_delay: CocoonTime,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct LockSettings {
    pub backend: LockBackendKind,
    pub watcher_interval: CocoonTime,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConnectorSettings {
    pub bind: SocketAddr,
    pub http_bind: SocketAddr,
    pub cocoon_code_port: u16,
    pub consul_addr: String,
    pub router_domain: String,
    pub env: String,
    pub request_timeout: CocoonTime,
    pub monitor_interval: CocoonTime,
    pub health: HealthSettings,
    pub lock: LockSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    pub bind: SocketAddr,
    pub scheduler_addr: String,
    pub consul_addr: String,
    pub request_timeout: CocoonTime,
    pub connector_version: String,
    pub router_domain: String,
    pub env: String,
    pub enable_health: bool,
    pub enable_reflection: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub orderer: OrdererSettings,
    pub connector: ConnectorSettings,
    pub api: ApiSettings,
}

impl Settings {
    /// Reads the configuration files, then the `COCOON__` prefixed variables
    pub fn load() -> Result<Self, ModelsError> {
        build_cocoon_settings("cocoon", "COCOON")
    }
}

impl From<OrdererSettings> for OrdererConfig {
    fn from(s: OrdererSettings) -> Self {
        OrdererConfig {
            bind: s.bind,
            store_path: s.store_path,
            put_max_attempts: s.put_max_attempts,
            put_retry_delay: s.put_retry_delay.to_duration(),
            discovery_interval: s.discovery_interval.to_duration(),
            consul_addr: s.consul_addr,
            dev_orderer_addr: None,
            request_timeout: s.request_timeout.to_duration(),
            enable_health: s.enable_health,
            enable_reflection: s.enable_reflection,
        }
    }
}

impl From<ConnectorSettings> for ConnectorConfig {
    fn from(s: ConnectorSettings) -> Self {
        ConnectorConfig {
            bind: s.bind,
            http_bind: s.http_bind,
            cocoon_code_port: s.cocoon_code_port,
            router_domain: s.router_domain,
            env: s.env,
            request_timeout: s.request_timeout.to_duration(),
            monitor_interval: s.monitor_interval.to_duration(),
            health: HealthCheckConfig {
                warmup: s.health.warmup.to_duration(),
                interval: s.health.interval.to_duration(),
                timeout: s.health.timeout.to_duration(),
                attempts: s.health.attempts,
                retry_delay: s.health.retry_delay.to_duration(),
            },
            lock: LockConfig {
                backend: s.lock.backend,
                consul_addr: s.consul_addr.clone(),
                watcher_interval: s.lock.watcher_interval.to_duration(),
            },
            consul_addr: s.consul_addr,
            ..Default::default()
        }
    }
}

impl From<ApiSettings> for ApiConfig {
    fn from(s: ApiSettings) -> Self {
        ApiConfig {
            bind: s.bind,
            scheduler_addr: s.scheduler_addr,
            consul_addr: s.consul_addr,
            request_timeout: s.request_timeout.to_duration(),
            connector_version: s.connector_version,
            router_domain: s.router_domain,
            env: s.env,
            enable_health: s.enable_health,
            enable_reflection: s.enable_reflection,
            ..Default::default()
        }
    }
}
