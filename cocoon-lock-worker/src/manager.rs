// Copyright (c) 2023 The Cocoon Authors

use crate::memory::MemoryLockController;
use cocoon_lock_exports::{LockError, LockManager};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Allows stopping the lock backend
#[derive(Default)]
pub struct LockManagerImpl {
    /// expired lock sweeper, memory backend only
    watcher: Option<(mpsc::Sender<()>, JoinHandle<()>)>,
}

impl LockManagerImpl {
    /// Spawns the thread removing expired memory locks every `interval`
    pub fn start_watcher(
        controller: MemoryLockController,
        interval: Duration,
    ) -> Result<Self, LockError> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("lock-watcher".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let removed = controller.remove_expired();
                        if removed > 0 {
                            debug!("lock watcher removed {} expired locks", removed);
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| LockError::BackendError(format!("failed to spawn lock watcher: {}", e)))?;
        Ok(LockManagerImpl {
            watcher: Some((stop_tx, handle)),
        })
    }
}

impl LockManager for LockManagerImpl {
    fn stop(&mut self) {
        info!("stopping lock backend...");
        if let Some((stop_tx, handle)) = self.watcher.take() {
            drop(stop_tx);
            if let Err(err) = handle.join() {
                warn!("lock watcher panicked: {:?}", err);
            }
        }
        info!("lock backend stopped");
    }
}
