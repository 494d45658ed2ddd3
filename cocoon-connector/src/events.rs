// Copyright (c) 2023 The Cocoon Authors

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// What the background tasks of a connector report to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// the cocoon code failed its health checks
    CocoonDead,
    /// the container wrote more than its disk limit
    DiskLimitExceeded {
        /// bytes used
        usage: u64,
        /// bytes allowed
        limit: u64,
    },
    /// the run command of the cocoon code exited
    CodeExited(i32),
    /// the connector was asked to stop
    Stop {
        /// whether the stop follows a failure
        failed: bool,
    },
}

/// Stops a background task of the connector
pub struct TaskHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl TaskHandle {
    pub(crate) fn new(stop_tx: oneshot::Sender<()>, join: JoinHandle<()>) -> Self {
        TaskHandle {
            stop_tx: Some(stop_tx),
            join: Some(join),
        }
    }

    /// Signals the task and waits for it
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }

    /// Whether the task returned on its own
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}
