// Copyright (c) 2023 The Cocoon Authors

use cocoon_models::CocoonError;
use cocoon_store_exports::StoreError;
use displaydoc::Display;
use thiserror::Error;

/// Errors starting or reaching an orderer
#[non_exhaustive]
#[derive(Display, Error, Debug)]
pub enum OrdererError {
    /// store error: {0}
    StoreError(#[from] StoreError),
    /// transport error: {0}
    TransportError(#[from] tonic::transport::Error),
    /// failed to bind {0}
    BindError(String),
    /// reflection error: {0}
    ReflectionError(String),
    /// no known orderer address
    NoOrdererAddress,
    /// discovery error: {0}
    DiscoveryError(String),
    /// {0}
    Cocoon(#[from] CocoonError),
}

impl From<OrdererError> for CocoonError {
    fn from(err: OrdererError) -> Self {
        match err {
            OrdererError::Cocoon(e) => e,
            OrdererError::StoreError(e) => e.into(),
            other => CocoonError::Internal(other.to_string()),
        }
    }
}
