// Copyright (c) 2023 The Cocoon Authors

use serde::Deserialize;
use std::time::Duration;

/// Shortest lease a caller may ask for
pub const MIN_LOCK_TTL: Duration = Duration::from_secs(10);
/// Longest lease a caller may ask for
pub const MAX_LOCK_TTL: Duration = Duration::from_secs(1800);

/// Which lock backend to run
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LockBackendKind {
    /// process-local, for development
    #[default]
    Memory,
    /// sessions of the KV service
    Consul,
}

/// Lock manager configuration
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// backend
    pub backend: LockBackendKind,
    /// address of the KV service, consul backend only
    pub consul_addr: String,
    /// period of the expired lock sweep, memory backend only
    pub watcher_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        LockConfig {
            backend: LockBackendKind::Memory,
            consul_addr: "http://127.0.0.1:8500".to_string(),
            watcher_interval: Duration::from_secs(1),
        }
    }
}
