// Copyright (c) 2023 The Cocoon Authors

use cocoon_models::CocoonError;
use displaydoc::Display;
use thiserror::Error;

/// Lock manager errors
#[non_exhaustive]
#[derive(Display, Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// lock already acquired by another process
    LockAlreadyAcquired,
    /// lock is not acquired
    LockNotAcquired,
    /// key is not set
    KeyRequired,
    /// lock ttl must be between {min} and {max} seconds, got {got}
    InvalidTtl {
        /// lower bound
        min: u64,
        /// upper bound
        max: u64,
        /// requested ttl
        got: u64,
    },
    /// lock backend error: {0}
    BackendError(String),
}

impl From<LockError> for CocoonError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::LockAlreadyAcquired => CocoonError::LockAlreadyAcquired,
            LockError::LockNotAcquired => CocoonError::LockNotAcquired,
            LockError::KeyRequired | LockError::InvalidTtl { .. } => {
                CocoonError::InvalidArgument(err.to_string())
            }
            LockError::BackendError(e) => CocoonError::Internal(e),
        }
    }
}
