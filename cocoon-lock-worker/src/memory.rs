// Copyright (c) 2023 The Cocoon Authors

use cocoon_lock_exports::{LockController, LockError};
use cocoon_logging::cocoon_trace;
use cocoon_models::naming::new_uuid;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct LockValue {
    session: String,
    expires_at: Instant,
}

/// Process-local locks. Expired entries are ignored on access and swept by
/// the watcher of [`crate::LockManagerImpl`].
#[derive(Debug, Clone, Default)]
pub struct MemoryLockController {
    locked: Arc<Mutex<HashMap<String, LockValue>>>,
}

impl MemoryLockController {
    /// Empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops expired entries, returns how many were removed
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let mut locked = self.locked.lock();
        let before = locked.len();
        locked.retain(|_, v| v.expires_at > now);
        before - locked.len()
    }

    fn holder(&self, locked: &HashMap<String, LockValue>, key: &str) -> Option<String> {
        locked
            .get(key)
            .filter(|v| v.expires_at > Instant::now())
            .map(|v| v.session.clone())
    }
}

#[async_trait::async_trait]
impl LockController for MemoryLockController {
    async fn acquire(&self, key: &str, ttl: Duration, session: &str) -> Result<String, LockError> {
        let session = if session.is_empty() {
            new_uuid()
        } else {
            session.to_string()
        };
        let mut locked = self.locked.lock();
        if let Some(holder) = self.holder(&locked, key) {
            if holder != session {
                return Err(LockError::LockAlreadyAcquired);
            }
        }
        locked.insert(
            key.to_string(),
            LockValue {
                session: session.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        cocoon_trace!("lock.acquire", { "key": key, "ttl": ttl.as_secs() });
        Ok(session)
    }

    async fn is_acquirer(&self, key: &str, session: &str) -> Result<(), LockError> {
        if key.is_empty() {
            return Err(LockError::KeyRequired);
        }
        let locked = self.locked.lock();
        match self.holder(&locked, key) {
            Some(holder) if holder == session => Ok(()),
            _ => Err(LockError::LockNotAcquired),
        }
    }

    async fn release(&self, key: &str, session: &str) -> Result<(), LockError> {
        let mut locked = self.locked.lock();
        if locked.get(key).map_or(false, |v| v.session == session) {
            locked.remove(key);
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn LockController> {
        Box::new(self.clone())
    }
}
