// Copyright (c) 2023 The Cocoon Authors

use crate::config::{MAX_LOCK_TTL, MIN_LOCK_TTL};
use crate::controller_traits::LockController;
use crate::error::LockError;
use cocoon_models::naming::make_lock_key;
use std::time::Duration;

/// Checks that `ttl` is within the accepted lease bounds
pub fn validate_ttl(ttl: Duration) -> Result<(), LockError> {
    if ttl < MIN_LOCK_TTL || ttl > MAX_LOCK_TTL {
        return Err(LockError::InvalidTtl {
            min: MIN_LOCK_TTL.as_secs(),
            max: MAX_LOCK_TTL.as_secs(),
            got: ttl.as_secs(),
        });
    }
    Ok(())
}

/// Handle on one cocoon-scoped key
pub struct Lock {
    controller: Box<dyn LockController>,
    key: String,
    ttl: Duration,
    session: String,
}

impl Lock {
    /// Handle on `key` of cocoon `cocoon_id`
    pub fn new(
        controller: Box<dyn LockController>,
        cocoon_id: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<Self, LockError> {
        if key.is_empty() {
            return Err(LockError::KeyRequired);
        }
        validate_ttl(ttl)?;
        Ok(Lock {
            controller,
            key: make_lock_key(cocoon_id, key),
            ttl,
            session: String::new(),
        })
    }

    /// Resumes a handle whose session was minted earlier
    pub fn with_session(mut self, session: &str) -> Self {
        self.session = session.to_string();
        self
    }

    /// Full lock key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current session, empty before the first acquire
    pub fn session(&self) -> &str {
        &self.session
    }

    /// Takes the lock, or renews it if this handle already holds it
    pub async fn acquire(&mut self) -> Result<(), LockError> {
        self.session = self
            .controller
            .acquire(&self.key, self.ttl, &self.session)
            .await?;
        Ok(())
    }

    /// `Ok` when this handle holds the lock
    pub async fn is_acquirer(&self) -> Result<(), LockError> {
        if self.session.is_empty() {
            return Err(LockError::LockNotAcquired);
        }
        self.controller.is_acquirer(&self.key, &self.session).await
    }

    /// Gives the lock up. Does nothing if it is not held.
    pub async fn release(&self) -> Result<(), LockError> {
        if self.session.is_empty() {
            return Ok(());
        }
        self.controller.release(&self.key, &self.session).await
    }
}

impl std::fmt::Debug for Lock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lock")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .field("session", &self.session)
            .finish()
    }
}
