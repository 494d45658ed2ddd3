// Copyright (c) 2023 The Cocoon Authors
//! Definition and exports of the ledger store and the blockchain.
//!
//! The store keeps ledgers and their transactions, the blockchain keeps the
//! chains and hash-linked blocks of chained ledgers. Writes are staged in a
//! [`StoreBatch`] so a block can be committed atomically with the transactions
//! it holds.
#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]

mod batch;
mod config;
mod constants;
mod controller_traits;
mod error;

pub use batch::*;
pub use config::*;
pub use constants::*;
pub use controller_traits::*;
pub use error::*;
