// Copyright (c) 2023 The Cocoon Authors

use cocoon_consul::{ConsulClient, ConsulError};
use cocoon_lock_exports::{LockController, LockError};
use cocoon_logging::cocoon_trace;
use std::time::Duration;
use tracing::debug;

/// Locks held by sessions of the KV service. A session is created with the
/// lease TTL and deletes its keys when it lapses.
#[derive(Debug, Clone)]
pub struct ConsulLockController {
    client: ConsulClient,
}

fn backend_err(err: ConsulError) -> LockError {
    LockError::BackendError(err.to_string())
}

impl ConsulLockController {
    /// Backend over `client`
    pub fn new(client: ConsulClient) -> Self {
        ConsulLockController { client }
    }
}

#[async_trait::async_trait]
impl LockController for ConsulLockController {
    async fn acquire(&self, key: &str, ttl: Duration, session: &str) -> Result<String, LockError> {
        let mut session = session.to_string();
        if session.is_empty() {
            session = self.client.create_session(ttl).await.map_err(backend_err)?;
        }
        let acquired = match self.client.kv_acquire(key, &session, &session).await {
            Ok(acquired) => acquired,
            // the session lapsed, start a new one
            Err(ConsulError::StatusError(..)) => {
                debug!("lock session {} is gone, creating a new one", session);
                session = self.client.create_session(ttl).await.map_err(backend_err)?;
                self.client
                    .kv_acquire(key, &session, &session)
                    .await
                    .map_err(backend_err)?
            }
            Err(err) => return Err(backend_err(err)),
        };
        if !acquired {
            return Err(LockError::LockAlreadyAcquired);
        }
        self.is_acquirer(key, &session).await?;
        cocoon_trace!("lock.acquire", { "key": key, "ttl": ttl.as_secs() });
        Ok(session)
    }

    async fn is_acquirer(&self, key: &str, session: &str) -> Result<(), LockError> {
        if key.is_empty() {
            return Err(LockError::KeyRequired);
        }
        match self.client.kv_get(key).await.map_err(backend_err)? {
            Some(pair) if pair.session.as_deref() == Some(session) => Ok(()),
            _ => Err(LockError::LockNotAcquired),
        }
    }

    async fn release(&self, key: &str, session: &str) -> Result<(), LockError> {
        if self.is_acquirer(key, session).await.is_err() {
            return Ok(());
        }
        self.client.kv_release(key, session).await.map_err(backend_err)?;
        self.client.destroy_session(session).await.map_err(backend_err)
    }

    fn clone_box(&self) -> Box<dyn LockController> {
        Box::new(self.clone())
    }
}
