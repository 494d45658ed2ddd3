// Copyright (c) 2023 The Cocoon Authors

use cocoon_models::CocoonError;
use cocoon_orderer_exports::OrdererError;
use cocoon_platform::PlatformError;
use displaydoc::Display;
use thiserror::Error;
use tonic::Status;
use tracing::{debug, error};

/// API error
#[non_exhaustive]
#[derive(Display, Error, Debug)]
pub enum ApiError {
    /// {0}
    Cocoon(#[from] CocoonError),
    /// platform error: {0}
    PlatformError(#[from] PlatformError),
    /// orderer error: {0}
    OrdererError(#[from] OrdererError),
    /// email or password are invalid
    InvalidCredentials,
    /// access token is required
    MissingToken,
    /// You have already cast a vote for this release
    AlreadyVoted,
    /// Permission Denied: You are not a signatory to this cocoon
    NotSignatory,
    /// Permission denied: You do not have permission to perform this operation
    NotOwner,
    /// deployment denied. You currently have {approved} approval vote(s) of the required {threshold} vote(s)
    DeployDenied {
        /// approvals of the latest release
        approved: u32,
        /// approvals required
        threshold: u32,
    },
    /// {0}
    Rejected(String),
    /// malformed {0}: {1}
    MalformedPayload(&'static str, String),
    /// failed to create session token: {0}
    TokenError(String),
    /// scheduler error: {0}
    SchedulerError(String),
    /// failed to bind {0}
    BindError(String),
    /// reflection error: {0}
    ReflectionError(String),
    /// time error: {0}
    TimeError(String),
}

impl From<ApiError> for Status {
    fn from(err: ApiError) -> Self {
        debug!("api error: {:?}", err);
        match err {
            ApiError::Cocoon(e) => e.into(),
            ApiError::PlatformError(e) => CocoonError::from(e).into(),
            ApiError::InvalidCredentials | ApiError::MissingToken => {
                Status::unauthenticated(err.to_string())
            }
            ApiError::NotSignatory | ApiError::NotOwner => Status::permission_denied(err.to_string()),
            ApiError::AlreadyVoted | ApiError::DeployDenied { .. } => {
                Status::failed_precondition(err.to_string())
            }
            ApiError::Rejected(_) | ApiError::MalformedPayload(..) => {
                Status::invalid_argument(err.to_string())
            }
            ApiError::SchedulerError(_) => {
                error!("{}", err);
                Status::internal("failed to deploy cocoon")
            }
            _ => {
                error!("{}", err);
                Status::internal(err.to_string())
            }
        }
    }
}
