// Copyright (c) 2023 The Cocoon Authors

use cocoon_models::CocoonError;
use displaydoc::Display;
use thiserror::Error;

/// Store and blockchain errors
#[non_exhaustive]
#[derive(Display, Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// ledger with matching name already exists
    LedgerExists,
    /// ledger not found
    LedgerNotFound,
    /// chain with matching name already exists
    ChainExists,
    /// chain not found
    ChainNotFound,
    /// a block with the same previous block hash already exists
    DuplicatePrevBlockHash,
    /// transaction with matching id already exists
    DuplicateTxId,
    /// Invalid block transaction; Transaction ({0}) has an invalid hash
    InvalidBlockTransaction(String),
    /// no transactions provided
    NoTransactions,
    /// {0} must not contain a NUL character
    InvalidKey(&'static str),
    /// rocksdb error: {0}
    RocksDbError(String),
    /// serialization error: {0}
    SerializationError(String),
    /// {0}
    CallbackError(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::SerializationError(err.to_string())
    }
}

impl From<StoreError> for CocoonError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LedgerExists => CocoonError::LedgerExists,
            StoreError::LedgerNotFound => CocoonError::LedgerNotFound,
            StoreError::ChainNotFound => CocoonError::ChainNotFound,
            StoreError::DuplicatePrevBlockHash => CocoonError::DuplicatePrevBlockHash,
            StoreError::InvalidBlockTransaction(_)
            | StoreError::NoTransactions
            | StoreError::InvalidKey(_) => {
                CocoonError::InvalidArgument(err.to_string())
            }
            other => CocoonError::Internal(other.to_string()),
        }
    }
}
