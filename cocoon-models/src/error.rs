// Copyright (c) 2023 The Cocoon Authors

//! Error kinds shared by every cocoon component and their wire encoding.

use displaydoc::Display;
use thiserror::Error;
use tonic::{metadata::MetadataValue, Code, Status};

/// gRPC metadata entry carrying the error kind
pub const ERROR_KIND_METADATA: &str = "x-cocoon-error";

/// Errors surfaced across component boundaries
#[non_exhaustive]
#[derive(Display, Error, Debug, Clone, PartialEq, Eq)]
pub enum CocoonError {
    /// cocoon not found
    CocoonNotFound,
    /// ledger not found
    LedgerNotFound,
    /// transaction not found
    TxNotFound,
    /// block not found
    BlockNotFound,
    /// chain not found
    ChainNotFound,
    /// identity not found
    IdentityNotFound,
    /// release not found
    ReleaseNotFound,
    /// cocoon with matching ID already exists
    CocoonExists,
    /// ledger with matching name already exists
    LedgerExists,
    /// An identity with matching email already exists
    IdentityAlreadyExists,
    /// lock already acquired
    LockAlreadyAcquired,
    /// a block with the same previous block hash already exists
    DuplicatePrevBlockHash,
    /// token is invalid or expired
    InvalidOrExpiredToken,
    /// {0}
    PermissionDenied(String),
    /// {0}
    InvalidResourceName(String),
    /// {0}
    InvalidLanguage(String),
    /// {0}
    InvalidFirewallRule(String),
    /// {0}
    InvalidACL(String),
    /// {0}
    InvalidEnv(String),
    /// {0}
    InvalidArgument(String),
    /// operation timed out
    OperationTimeout,
    /// lock not acquired
    LockNotAcquired,
    /// cocoon code is not running
    CocoonCodeNotRunning,
    /// stream has not been initialized
    UninitializedStream,
    /// {0}
    Internal(String),
}

impl CocoonError {
    /// Stable name of the error kind, used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            CocoonError::CocoonNotFound => "CocoonNotFound",
            CocoonError::LedgerNotFound => "LedgerNotFound",
            CocoonError::TxNotFound => "TxNotFound",
            CocoonError::BlockNotFound => "BlockNotFound",
            CocoonError::ChainNotFound => "ChainNotFound",
            CocoonError::IdentityNotFound => "IdentityNotFound",
            CocoonError::ReleaseNotFound => "ReleaseNotFound",
            CocoonError::CocoonExists => "CocoonExists",
            CocoonError::LedgerExists => "LedgerExists",
            CocoonError::IdentityAlreadyExists => "IdentityAlreadyExists",
            CocoonError::LockAlreadyAcquired => "LockAlreadyAcquired",
            CocoonError::DuplicatePrevBlockHash => "DuplicatePrevBlockHash",
            CocoonError::InvalidOrExpiredToken => "InvalidOrExpiredToken",
            CocoonError::PermissionDenied(_) => "PermissionDenied",
            CocoonError::InvalidResourceName(_) => "InvalidResourceName",
            CocoonError::InvalidLanguage(_) => "InvalidLanguage",
            CocoonError::InvalidFirewallRule(_) => "InvalidFirewallRule",
            CocoonError::InvalidACL(_) => "InvalidACL",
            CocoonError::InvalidEnv(_) => "InvalidEnv",
            CocoonError::InvalidArgument(_) => "InvalidArgument",
            CocoonError::OperationTimeout => "OperationTimeout",
            CocoonError::LockNotAcquired => "LockNotAcquired",
            CocoonError::CocoonCodeNotRunning => "CocoonCodeNotRunning",
            CocoonError::UninitializedStream => "UninitializedStream",
            CocoonError::Internal(_) => "Internal",
        }
    }

    /// Rebuild an error from its kind name and message
    pub fn from_kind(kind: &str, message: &str) -> Self {
        let message = message.to_string();
        match kind {
            "CocoonNotFound" => CocoonError::CocoonNotFound,
            "LedgerNotFound" => CocoonError::LedgerNotFound,
            "TxNotFound" => CocoonError::TxNotFound,
            "BlockNotFound" => CocoonError::BlockNotFound,
            "ChainNotFound" => CocoonError::ChainNotFound,
            "IdentityNotFound" => CocoonError::IdentityNotFound,
            "ReleaseNotFound" => CocoonError::ReleaseNotFound,
            "CocoonExists" => CocoonError::CocoonExists,
            "LedgerExists" => CocoonError::LedgerExists,
            "IdentityAlreadyExists" => CocoonError::IdentityAlreadyExists,
            "LockAlreadyAcquired" => CocoonError::LockAlreadyAcquired,
            "DuplicatePrevBlockHash" => CocoonError::DuplicatePrevBlockHash,
            "InvalidOrExpiredToken" => CocoonError::InvalidOrExpiredToken,
            "PermissionDenied" => CocoonError::PermissionDenied(message),
            "InvalidResourceName" => CocoonError::InvalidResourceName(message),
            "InvalidLanguage" => CocoonError::InvalidLanguage(message),
            "InvalidFirewallRule" => CocoonError::InvalidFirewallRule(message),
            "InvalidACL" => CocoonError::InvalidACL(message),
            "InvalidEnv" => CocoonError::InvalidEnv(message),
            "InvalidArgument" => CocoonError::InvalidArgument(message),
            "OperationTimeout" => CocoonError::OperationTimeout,
            "LockNotAcquired" => CocoonError::LockNotAcquired,
            "CocoonCodeNotRunning" => CocoonError::CocoonCodeNotRunning,
            "UninitializedStream" => CocoonError::UninitializedStream,
            _ => CocoonError::Internal(message),
        }
    }

    /// gRPC status code used to carry this kind
    pub fn code(&self) -> Code {
        match self {
            CocoonError::CocoonNotFound
            | CocoonError::LedgerNotFound
            | CocoonError::TxNotFound
            | CocoonError::BlockNotFound
            | CocoonError::ChainNotFound
            | CocoonError::IdentityNotFound
            | CocoonError::ReleaseNotFound => Code::NotFound,
            CocoonError::CocoonExists
            | CocoonError::LedgerExists
            | CocoonError::IdentityAlreadyExists
            | CocoonError::LockAlreadyAcquired => Code::AlreadyExists,
            CocoonError::DuplicatePrevBlockHash => Code::Aborted,
            CocoonError::InvalidOrExpiredToken => Code::Unauthenticated,
            CocoonError::PermissionDenied(_) => Code::PermissionDenied,
            CocoonError::InvalidResourceName(_)
            | CocoonError::InvalidLanguage(_)
            | CocoonError::InvalidFirewallRule(_)
            | CocoonError::InvalidACL(_)
            | CocoonError::InvalidEnv(_)
            | CocoonError::InvalidArgument(_) => Code::InvalidArgument,
            CocoonError::OperationTimeout => Code::DeadlineExceeded,
            CocoonError::LockNotAcquired => Code::FailedPrecondition,
            CocoonError::CocoonCodeNotRunning | CocoonError::UninitializedStream => {
                Code::Unavailable
            }
            CocoonError::Internal(_) => Code::Internal,
        }
    }

    /// Restore the error kind carried by a status returned from a cocoon service.
    /// Statuses without the kind metadata are mapped from their code.
    pub fn from_status(status: &Status) -> Self {
        if let Some(kind) = status
            .metadata()
            .get(ERROR_KIND_METADATA)
            .and_then(|v| v.to_str().ok())
        {
            return CocoonError::from_kind(kind, status.message());
        }
        match status.code() {
            Code::DeadlineExceeded => CocoonError::OperationTimeout,
            Code::Unavailable => CocoonError::Internal(format!(
                "service unavailable: {}",
                status.message()
            )),
            _ => CocoonError::Internal(status.message().to_string()),
        }
    }

    /// true for the not-found family
    pub fn is_not_found(&self) -> bool {
        self.code() == Code::NotFound
    }
}

impl From<CocoonError> for Status {
    fn from(err: CocoonError) -> Self {
        let mut status = Status::new(err.code(), err.to_string());
        status
            .metadata_mut()
            .insert(ERROR_KIND_METADATA, MetadataValue::from_static(err.kind()));
        status
    }
}

impl From<Status> for CocoonError {
    fn from(status: Status) -> Self {
        CocoonError::from_status(&status)
    }
}

/// Models error
#[non_exhaustive]
#[derive(Display, Error, Debug)]
pub enum ModelsError {
    /// Serialization error: {0}
    SerializeError(String),
    /// Deserialization error: {0}
    DeserializeError(String),
    /// Configuration error: {0}
    ConfigError(String),
    /// Time error: {0}
    TimeError(#[from] cocoon_time::TimeError),
}

impl From<serde_json::Error> for ModelsError {
    fn from(err: serde_json::Error) -> Self {
        ModelsError::DeserializeError(err.to_string())
    }
}

impl From<config::ConfigError> for ModelsError {
    fn from(err: config::ConfigError) -> Self {
        ModelsError::ConfigError(err.to_string())
    }
}

impl From<ModelsError> for CocoonError {
    fn from(err: ModelsError) -> Self {
        CocoonError::Internal(err.to_string())
    }
}
