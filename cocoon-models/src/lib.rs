// Copyright (c) 2023 The Cocoon Authors
//! Data model shared by the cocoon components: records, naming, hashing,
//! access control, environment processing, validation and settings.
#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]

/// access control maps
pub mod acl;
/// blocks and chains
pub mod block;
/// cocoons, releases, identities
pub mod cocoon;
/// settings loader
pub mod config;
/// release environment
pub mod env;
/// error taxonomy
pub mod error;
/// firewall rules
pub mod firewall;
/// ledgers and transactions
pub mod ledger;
/// names, keys, hashes
pub mod naming;
/// resource sets
pub mod resources;
/// record validation
pub mod validation;

pub use error::{CocoonError, ModelsError};
