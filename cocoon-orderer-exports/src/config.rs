// Copyright (c) 2023 The Cocoon Authors

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Orderer configuration
#[derive(Debug, Clone)]
pub struct OrdererConfig {
    /// gRPC bind address
    pub bind: SocketAddr,
    /// RocksDB directory
    pub store_path: PathBuf,
    /// attempts of a put whose block lost its height to another writer
    pub put_max_attempts: u32,
    /// pause between two such attempts
    pub put_retry_delay: Duration,
    /// time between two orderer discoveries
    pub discovery_interval: Duration,
    /// address of the service catalog
    pub consul_addr: String,
    /// fixed orderer address, disables discovery
    pub dev_orderer_addr: Option<String>,
    /// deadline of every call made by an orderer client
    pub request_timeout: Duration,
    /// whether to serve the gRPC health service
    pub enable_health: bool,
    /// whether to serve gRPC reflection
    pub enable_reflection: bool,
}

impl Default for OrdererConfig {
    fn default() -> Self {
        OrdererConfig {
            bind: SocketAddr::from(([0, 0, 0, 0], 8001)),
            store_path: PathBuf::from("storage/orderer"),
            put_max_attempts: 5,
            put_retry_delay: Duration::from_secs(2),
            discovery_interval: Duration::from_secs(5),
            consul_addr: "http://127.0.0.1:8500".to_string(),
            dev_orderer_addr: None,
            request_timeout: Duration::from_secs(60),
            enable_health: true,
            enable_reflection: false,
        }
    }
}
