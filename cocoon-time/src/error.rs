// Copyright (c) 2023 The Cocoon Authors

use displaydoc::Display;
use thiserror::Error;

/// Time error
#[non_exhaustive]
#[derive(Display, Error, Debug, Clone)]
pub enum TimeError {
    /// Error converting
    ConversionError,
    /// Time overflow error
    TimeOverflowError,
    /// Checked operation error: {0}
    CheckedOperationError(String),
    /// Formatting error: {0}
    FormatError(String),
}
