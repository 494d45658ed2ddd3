// Copyright (c) 2023 The Cocoon Authors

use std::net::SocketAddr;
use std::time::Duration;

/// Signing key used when `API_SIGN_KEY` is not set
pub const DEFAULT_SIGN_KEY: &str = "secret";

/// Lifetime of a login token
pub const TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

/// API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// gRPC address
    pub bind: SocketAddr,
    /// HS256 key of the session tokens
    pub sign_key: String,
    /// lifetime of the session tokens
    pub token_ttl: Duration,
    /// HTTP address of the job scheduler
    pub scheduler_addr: String,
    /// KV/catalog service address, used to discover orderers
    pub consul_addr: String,
    /// fixed orderer address, bypasses discovery
    pub dev_orderer_addr: Option<String>,
    /// deadline of every call
    pub request_timeout: Duration,
    /// version of the connector image deployed with cocoons
    pub connector_version: String,
    /// domain cocoons are routed on
    pub router_domain: String,
    /// deployment environment passed to connectors
    pub env: String,
    /// whether to serve the gRPC health service
    pub enable_health: bool,
    /// whether to serve gRPC reflection
    pub enable_reflection: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            bind: SocketAddr::from(([0, 0, 0, 0], 8005)),
            sign_key: DEFAULT_SIGN_KEY.to_string(),
            token_ttl: TOKEN_TTL,
            scheduler_addr: "http://127.0.0.1:4646".to_string(),
            consul_addr: "http://127.0.0.1:8500".to_string(),
            dev_orderer_addr: None,
            request_timeout: Duration::from_secs(60),
            connector_version: "latest".to_string(),
            router_domain: "whatbay.co".to_string(),
            env: "development".to_string(),
            enable_health: true,
            enable_reflection: false,
        }
    }
}

impl ApiConfig {
    /// Applies `API_SIGN_KEY`, `CONSUL_ADDR` and `DEV_ORDERER_ADDR`
    pub fn with_env(mut self) -> Self {
        if let Some(key) = std::env::var("API_SIGN_KEY").ok().filter(|v| !v.is_empty()) {
            self.sign_key = key;
        }
        if let Some(addr) = std::env::var("CONSUL_ADDR").ok().filter(|v| !v.is_empty()) {
            self.consul_addr = addr;
        }
        if let Some(addr) = std::env::var("DEV_ORDERER_ADDR").ok().filter(|v| !v.is_empty()) {
            self.dev_orderer_addr = Some(addr);
        }
        self
    }
}
