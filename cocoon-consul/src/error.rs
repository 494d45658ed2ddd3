// Copyright (c) 2023 The Cocoon Authors

use displaydoc::Display;
use thiserror::Error;

/// Errors of the KV/catalog service client
#[non_exhaustive]
#[derive(Display, Error, Debug)]
pub enum ConsulError {
    /// request failed: {0}
    RequestError(String),
    /// unexpected status {0}: {1}
    StatusError(u16, String),
    /// failed to decode response: {0}
    DecodeError(String),
}

impl From<reqwest::Error> for ConsulError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ConsulError::DecodeError(err.to_string())
        } else {
            ConsulError::RequestError(err.to_string())
        }
    }
}
