// Copyright (c) 2023 The Cocoon Authors

use crate::connector::ConnectorClient;
use crate::error::RuntimeError;
use cocoon_lock_exports::{LockError, MAX_LOCK_TTL, MIN_LOCK_TTL};
use cocoon_models::CocoonError;
use std::time::Duration;

/// Lock on a key of a cocoon, held through the connector.
/// TTLs under the minimum are raised to it.
pub struct Lock {
    connector: Box<dyn ConnectorClient>,
    cocoon_id: String,
    key: String,
    ttl: Duration,
    session: String,
}

impl std::fmt::Debug for Lock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lock")
            .field("cocoon_id", &self.cocoon_id)
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .field("session", &self.session)
            .finish()
    }
}

impl Lock {
    pub(crate) fn new(
        connector: Box<dyn ConnectorClient>,
        cocoon_id: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<Self, RuntimeError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(LockError::KeyRequired.into());
        }
        let ttl = ttl.max(MIN_LOCK_TTL);
        if ttl > MAX_LOCK_TTL {
            return Err(LockError::InvalidTtl {
                min: MIN_LOCK_TTL.as_secs(),
                max: MAX_LOCK_TTL.as_secs(),
                got: ttl.as_secs(),
            }
            .into());
        }
        Ok(Lock {
            connector,
            cocoon_id: cocoon_id.to_string(),
            key: key.to_string(),
            ttl,
            session: String::new(),
        })
    }

    /// Locked key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Lease duration
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Session holding the lock, empty before the first acquire
    pub fn session(&self) -> &str {
        &self.session
    }

    /// Takes or renews the lock. Fails with `LockAlreadyAcquired` when another
    /// session holds it.
    pub async fn acquire(&mut self) -> Result<(), RuntimeError> {
        self.session = self
            .connector
            .acquire_lock(&self.cocoon_id, &self.key, self.ttl, &self.session)
            .await?;
        Ok(())
    }

    /// `Ok` while this handle holds the lock, `LockNotAcquired` otherwise
    pub async fn is_acquirer(&self) -> Result<(), RuntimeError> {
        if self.session.is_empty() {
            return Err(CocoonError::LockNotAcquired.into());
        }
        Ok(self
            .connector
            .is_lock_acquirer(&self.cocoon_id, &self.key, &self.session)
            .await?)
    }

    /// Releases the lock. Nothing to do when it was never acquired.
    pub async fn release(&self) -> Result<(), RuntimeError> {
        if self.session.is_empty() {
            return Ok(());
        }
        Ok(self
            .connector
            .release_lock(&self.cocoon_id, &self.key, &self.session)
            .await?)
    }
}
