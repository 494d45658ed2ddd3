// Copyright (c) 2023 The Cocoon Authors

//! Interface of the orderer: the cocoon-scoped front end of the store and
//! the blockchain. Implemented in-process, over gRPC, and as a mock.
#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]

mod config;
mod controller_traits;
mod error;

pub use config::OrdererConfig;
#[cfg(any(test, feature = "test-exports"))]
pub use controller_traits::MockOrdererController;
pub use controller_traits::OrdererController;
pub use error::OrdererError;
