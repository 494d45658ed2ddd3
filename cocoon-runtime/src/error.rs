// Copyright (c) 2023 The Cocoon Authors

use cocoon_lock_exports::LockError;
use cocoon_models::CocoonError;
use displaydoc::Display;
use thiserror::Error;

/// Runtime error
#[non_exhaustive]
#[derive(Display, Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// {0}
    Cocoon(#[from] CocoonError),
    /// cannot use a reserved name
    ReservedName,
    /// {0}
    TxRejected(String),
    /// block maker stopped before the transaction was committed
    BlockMakerStopped,
    /// failed to bind {0}: {1}
    BindError(String, String),
    /// invalid runtime configuration: {0}
    ConfigError(String),
    /// stub server error: {0}
    ServerError(String),
}

impl From<LockError> for RuntimeError {
    fn from(err: LockError) -> Self {
        RuntimeError::Cocoon(err.into())
    }
}

impl RuntimeError {
    /// Error kind when the error came from the platform
    pub fn cocoon_error(&self) -> Option<&CocoonError> {
        match self {
            RuntimeError::Cocoon(e) => Some(e),
            _ => None,
        }
    }
}
