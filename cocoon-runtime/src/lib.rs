// Copyright (c) 2023 The Cocoon Authors

//! Runtime linked into cocoon code.
//!
//! The runtime serves the stub service the connector calls (health checks,
//! invokes, stop) and gives the code three [`Link`]s to ledger and lock
//! resources:
//! * `system`: resources of the system cocoon, read-mostly
//! * `native`: resources of the natively linked cocoon, or its own
//! * `me`: its own resources
//!
//! Every link operation is one call to the connector. Puts to chained
//! ledgers go through the [`BlockMaker`], which groups the puts of a tick into
//! one orderer put per ledger.
#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]

mod block_maker;
mod cocoon_code;
mod config;
mod connector;
mod error;
mod link;
mod lock;
mod range_getter;
mod runtime;
mod server;

pub use block_maker::{BlockMaker, BlockMakerHandle, Committer, ConnectorCommitter, Entry, EntryResult};
pub use cocoon_code::{CocoonCode, Invocation};
pub use config::{RuntimeConfig, DEFAULT_LEDGER};
#[cfg(any(test, feature = "test-exports"))]
pub use connector::MockConnectorClient;
pub use connector::{ConnectorClient, GrpcConnectorClient};
pub use error::RuntimeError;
pub use link::Link;
pub use lock::Lock;
pub use range_getter::{RangeGetter, RANGE_PAGE_SIZE};
pub use runtime::{RunningCocoon, Runtime, EXIT_INIT_FAILED, EXIT_SERVER_FAILED};

#[cfg(test)]
mod tests;
