// Copyright (c) 2023 The Cocoon Authors

use cocoon_consul::ConsulError;
use cocoon_lock_exports::LockError;
use cocoon_models::CocoonError;
use cocoon_orderer_exports::OrdererError;
use cocoon_platform::PlatformError;
use displaydoc::Display;
use thiserror::Error;

/// Process exit code after a clean stop
pub const EXIT_OK: i32 = 0;
/// Process exit code after a failure of the running cocoon
pub const EXIT_FAILED: i32 = 1;
/// Process exit code when the cocoon or its release cannot be used
pub const EXIT_INVALID_SPEC: i32 = 3;
/// Process exit code when the source cannot be fetched
pub const EXIT_FETCH_FAILED: i32 = 4;
/// Process exit code when the source does not build
pub const EXIT_BUILD_FAILED: i32 = 5;

/// Connector error
#[non_exhaustive]
#[derive(Display, Error, Debug)]
pub enum ConnectorError {
    /// {0}
    Cocoon(#[from] CocoonError),
    /// platform error: {0}
    PlatformError(#[from] PlatformError),
    /// invalid connector configuration: {0}
    ConfigError(String),
    /// invalid cocoon spec: {0}
    SpecError(String),
    /// failed to fetch cocoon source: {0}
    FetchError(String),
    /// build failed: {0}
    BuildError(String),
    /// container error: {0}
    ContainerError(String),
    /// exec [{0}] exited with code={1}
    ExecFailed(String, i32),
    /// orderer error: {0}
    OrdererError(#[from] OrdererError),
    /// router error: {0}
    RouterError(#[from] ConsulError),
    /// failed to bind {0}: {1}
    BindError(String, String),
    /// cocoon code is unreachable: {0}
    CocoonCodeUnreachable(String),
    /// health check failed
    HealthCheckFailed,
}

impl From<LockError> for ConnectorError {
    fn from(err: LockError) -> Self {
        ConnectorError::Cocoon(err.into())
    }
}

impl ConnectorError {
    /// Exit code of a connector stopped by this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ConnectorError::SpecError(_) | ConnectorError::ConfigError(_) => EXIT_INVALID_SPEC,
            ConnectorError::FetchError(_) => EXIT_FETCH_FAILED,
            ConnectorError::BuildError(_) => EXIT_BUILD_FAILED,
            ConnectorError::PlatformError(PlatformError::Cocoon(e))
            | ConnectorError::Cocoon(e)
                if e.is_not_found() =>
            {
                EXIT_INVALID_SPEC
            }
            _ => EXIT_FAILED,
        }
    }
}
