// Copyright (c) 2023 The Cocoon Authors

//! # General description
//!
//! The orderer namespaces every ledger name and key with the calling cocoon's
//! id, stores transactions and, for chained ledgers, appends a block holding
//! them in the same store commit.
//!
//! When two puts race for the same block height, the store rejects the loser
//! with `DuplicatePrevBlockHash`; the whole put is then attempted again, up to
//! `put_max_attempts` times, `put_retry_delay` apart.
//!
//! [`OrdererGrpc`] serves an orderer over gRPC and [`OrdererClient`] reaches
//! one of the orderers found by [`OrdererDiscovery`].
#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]

mod client;
mod discovery;
mod orderer;
mod server;

pub use client::OrdererClient;
pub use discovery::{DiscoveryHandle, OrdererDiscovery};
pub use orderer::Orderer;
pub use server::{OrdererGrpc, StopHandle};

use cocoon_orderer_exports::{OrdererConfig, OrdererError};
use cocoon_store_exports::{StoreConfig, StoreController};
use cocoon_store_worker::CocoonDB;
use tracing::info;

/// Opens the store, creates the system ledgers and serves the orderer
pub async fn start_orderer_worker(
    config: OrdererConfig,
) -> Result<(Orderer, StopHandle), OrdererError> {
    let db = CocoonDB::new(StoreConfig::new(config.store_path.clone()))?;
    db.init()?;
    info!("orderer store ready at {:?}", config.store_path);
    let orderer = Orderer::new(Box::new(db.clone()), Box::new(db), config.clone());
    let stop_handle = OrdererGrpc::new(Box::new(orderer.clone()))
        .serve(&config)
        .await?;
    Ok((orderer, stop_handle))
}

#[cfg(test)]
mod tests;
