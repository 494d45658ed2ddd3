// Copyright (c) 2023 The Cocoon Authors

use serde::Deserialize;
use std::path::PathBuf;

/// Store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// directory of the RocksDB database
    pub path: PathBuf,
    /// name of the system ledger holding public records
    #[serde(default = "default_public_ledger")]
    pub system_public_ledger: String,
    /// name of the system ledger holding secrets
    #[serde(default = "default_private_ledger")]
    pub system_private_ledger: String,
}

fn default_public_ledger() -> String {
    cocoon_models::naming::make_ledger_name(
        cocoon_models::naming::SYSTEM_COCOON_ID,
        cocoon_models::naming::SYSTEM_PUBLIC_LEDGER,
    )
}

fn default_private_ledger() -> String {
    cocoon_models::naming::make_ledger_name(
        cocoon_models::naming::SYSTEM_COCOON_ID,
        cocoon_models::naming::SYSTEM_PRIVATE_LEDGER,
    )
}

impl StoreConfig {
    /// Configuration for a database at `path` with the default system ledgers
    pub fn new(path: PathBuf) -> Self {
        StoreConfig {
            path,
            system_public_ledger: default_public_ledger(),
            system_private_ledger: default_private_ledger(),
        }
    }
}
