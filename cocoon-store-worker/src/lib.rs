// Copyright (c) 2023 The Cocoon Authors

//! # General description
//!
//! `CocoonDB` is the RocksDB implementation of the store and the blockchain.
//!
//! # Column families
//!
//! * `ledgers`, `chains`: records by internal name
//! * `transactions`: `<ledger>\0<id>` -> transaction
//! * `tx_keys`: one entry per version of a key, ordered by creation time then
//!   store sequence, so the last entry under `<ledger>\0<key>\0` is the latest version
//! * `tx_ids`: global uniqueness of transaction ids
//! * `blocks`, `block_numbers`, `block_prev_hashes`: blocks and their unique indexes
//! * `metadata`: the store sequence counter
//!
//! # Concurrent block creators
//!
//! A block is staged against the chain tip read at staging time and claims
//! its `(chain, number)` and `(chain, prevBlockHash)` index keys. Commits are
//! serialized and check every claim, so exactly one creator wins a height and
//! the others get `DuplicatePrevBlockHash`.
#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]

mod cocoon_db;
mod range;

pub use cocoon_db::CocoonDB;
pub use range::{like, matches_range};

#[cfg(test)]
mod tests;
