// Copyright (c) 2023 The Cocoon Authors

use cocoon_models::CocoonError;
use displaydoc::Display;
use thiserror::Error;

/// Platform record errors
#[non_exhaustive]
#[derive(Display, Error, Debug, Clone, PartialEq)]
pub enum PlatformError {
    /// {0}
    Cocoon(#[from] CocoonError),
    /// malformed {0} record: {1}
    MalformedRecord(&'static str, String),
    /// identity's private data not found
    MissingIdentityPrivateData,
    /// cocoon has no release
    NoRelease,
}

impl From<PlatformError> for CocoonError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Cocoon(e) => e,
            other => CocoonError::Internal(other.to_string()),
        }
    }
}
