// Copyright (c) 2023 The Cocoon Authors

//! Distributed TTL leases on cocoon-scoped keys.
//!
//! A [`LockController`] is the backend; a [`Lock`] is a handle on one key that
//! remembers the session minted by its first successful acquire.
#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]

mod config;
mod controller_traits;
mod error;
mod lock;

pub use config::{LockBackendKind, LockConfig, MAX_LOCK_TTL, MIN_LOCK_TTL};
#[cfg(any(test, feature = "test-exports"))]
pub use controller_traits::MockLockController;
pub use controller_traits::{LockController, LockManager};
pub use error::LockError;
pub use lock::{validate_ttl, Lock};
