// Copyright (c) 2023 The Cocoon Authors

use crate::batch::StoreBatch;
use crate::error::StoreError;
use cocoon_models::block::{Block, Chain};
use cocoon_models::ledger::{Ledger, Transaction, TxReceipt};

/// Runs inside a ledger creation, before commit
pub type LedgerHook<'a> = &'a mut dyn FnMut(&mut StoreBatch) -> Result<(), StoreError>;

/// Runs inside a put with the transactions that will be stored, before commit
pub type PutHook<'a> = &'a mut dyn FnMut(&mut StoreBatch, &[Transaction]) -> Result<(), StoreError>;

/// Range query over the latest version of every key of a ledger
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeQuery {
    /// first key, or key prefix when `end` is empty
    pub start: String,
    /// last key; alone, a pattern where `%` matches any sequence
    pub end: String,
    /// include `end` and the keys it prefixes
    pub inclusive: bool,
    /// maximum number of results, 0 for no limit
    pub limit: usize,
    /// results to skip
    pub offset: usize,
}

/// Ledgers and transactions
pub trait StoreController: Send + Sync {
    /// Creates the system ledgers if missing
    fn init(&self) -> Result<(), StoreError>;

    /// Creates a ledger. `name` is the internal name.
    fn create_ledger(&self, name: &str, chained: bool, public: bool) -> Result<Ledger, StoreError>;

    /// Creates a ledger and runs `then` in the same commit
    fn create_ledger_then(
        &self,
        name: &str,
        chained: bool,
        public: bool,
        then: LedgerHook<'_>,
    ) -> Result<Ledger, StoreError>;

    /// Reads a ledger
    fn get_ledger(&self, name: &str) -> Result<Option<Ledger>, StoreError>;

    /// Stores transactions. A duplicate id is reported in its receipt.
    fn put(&self, ledger: &str, txs: Vec<Transaction>) -> Result<Vec<TxReceipt>, StoreError>;

    /// Stores transactions and runs `then` in the same commit.
    /// `then` is not called when no transaction is stored.
    fn put_then(
        &self,
        ledger: &str,
        txs: Vec<Transaction>,
        then: PutHook<'_>,
    ) -> Result<Vec<TxReceipt>, StoreError>;

    /// Latest version of a key
    fn get(&self, ledger: &str, key: &str) -> Result<Option<Transaction>, StoreError>;

    /// Transaction by id
    fn get_by_id(&self, ledger: &str, id: &str) -> Result<Option<Transaction>, StoreError>;

    /// Latest versions of the keys matching `query`, ordered by key
    fn get_range(&self, ledger: &str, query: &RangeQuery) -> Result<Vec<Transaction>, StoreError>;

    /// Returns a boxed clone of self.
    /// Allows cloning `Box<dyn StoreController>`,
    fn clone_box(&self) -> Box<dyn StoreController>;
}

impl Clone for Box<dyn StoreController> {
    fn clone(&self) -> Box<dyn StoreController> {
        self.clone_box()
    }
}

/// Chains and blocks
pub trait BlockchainController: Send + Sync {
    /// Creates a chain
    fn create_chain(&self, name: &str, public: bool) -> Result<Chain, StoreError>;

    /// Stages a chain in `batch`
    fn stage_chain(&self, batch: &mut StoreBatch, name: &str, public: bool) -> Result<Chain, StoreError>;

    /// Reads a chain
    fn get_chain(&self, name: &str) -> Result<Option<Chain>, StoreError>;

    /// Appends a block holding `txs` to the chain
    fn create_block(&self, id: &str, chain_name: &str, txs: &[Transaction]) -> Result<Block, StoreError>;

    /// Stages a block on top of the current tip. Committing fails with
    /// [`StoreError::DuplicatePrevBlockHash`] if another block took that height meanwhile.
    fn stage_block(
        &self,
        batch: &mut StoreBatch,
        id: &str,
        chain_name: &str,
        txs: &[Transaction],
    ) -> Result<Block, StoreError>;

    /// Reads a block
    fn get_block(&self, chain_name: &str, id: &str) -> Result<Option<Block>, StoreError>;

    /// Highest block of a chain
    fn get_tip(&self, chain_name: &str) -> Result<Option<Block>, StoreError>;

    /// Returns a boxed clone of self.
    fn clone_box(&self) -> Box<dyn BlockchainController>;
}

impl Clone for Box<dyn BlockchainController> {
    fn clone(&self) -> Box<dyn BlockchainController> {
        self.clone_box()
    }
}
