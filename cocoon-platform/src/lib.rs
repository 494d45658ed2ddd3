// Copyright (c) 2023 The Cocoon Authors

//! Platform records kept on the system ledgers through an orderer.
//!
//! Public parts of identities, cocoons and releases go to the system public
//! ledger. Passwords, client sessions and `@private` release variables go to
//! the system private ledger under separate keys. Writing a record again
//! shadows the previous version.
#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]

mod error;
mod platform;

pub use error::PlatformError;
pub use platform::Platform;
