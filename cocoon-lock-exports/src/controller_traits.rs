// Copyright (c) 2023 The Cocoon Authors

use crate::error::LockError;
use std::time::Duration;

/// Lock backend. Keys are full lock keys (see `make_lock_key`).
#[cfg_attr(any(test, feature = "test-exports"), mockall::automock)]
#[async_trait::async_trait]
pub trait LockController: Send + Sync {
    /// Takes `key` for `ttl`. An empty `session` mints a new one.
    /// Returns the session holding the lock.
    async fn acquire(&self, key: &str, ttl: Duration, session: &str) -> Result<String, LockError>;

    /// `Ok` when `session` holds `key`, [`LockError::LockNotAcquired`] otherwise
    async fn is_acquirer(&self, key: &str, session: &str) -> Result<(), LockError>;

    /// Releases `key` if `session` holds it. Idempotent.
    async fn release(&self, key: &str, session: &str) -> Result<(), LockError>;

    /// Returns a boxed clone of self.
    /// Allows cloning `Box<dyn LockController>`,
    fn clone_box(&self) -> Box<dyn LockController>;
}

impl Clone for Box<dyn LockController> {
    fn clone(&self) -> Box<dyn LockController> {
        self.clone_box()
    }
}

/// Lock manager used to stop the backend's background work
pub trait LockManager {
    /// Stops the backend's background work
    fn stop(&mut self);
}
