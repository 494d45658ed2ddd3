// Copyright (c) 2023 The Cocoon Authors

//! Lock backends: an in-memory one for development and one built on the
//! sessions of the KV service.
#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]

mod consul;
mod manager;
mod memory;

pub use consul::ConsulLockController;
pub use manager::LockManagerImpl;
pub use memory::MemoryLockController;

use cocoon_consul::ConsulClient;
use cocoon_lock_exports::{LockBackendKind, LockConfig, LockController, LockError, LockManager};
use std::time::Duration;
use tracing::info;

/// Starts the configured backend
pub fn start_lock_worker(
    config: LockConfig,
) -> Result<(Box<dyn LockManager>, Box<dyn LockController>), LockError> {
    match config.backend {
        LockBackendKind::Memory => {
            let controller = MemoryLockController::new();
            let manager = LockManagerImpl::start_watcher(controller.clone(), config.watcher_interval)?;
            info!("memory lock backend started");
            Ok((Box::new(manager), Box::new(controller)))
        }
        LockBackendKind::Consul => {
            let client = ConsulClient::new(&config.consul_addr, Duration::from_secs(10))
                .map_err(|e| LockError::BackendError(e.to_string()))?;
            info!("consul lock backend started on {}", config.consul_addr);
            Ok((
                Box::new(LockManagerImpl::default()),
                Box::new(ConsulLockController::new(client)),
            ))
        }
    }
}

#[cfg(test)]
mod tests;
