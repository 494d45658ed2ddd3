// Copyright (c) 2023 The Cocoon Authors

use cocoon_models::block::Block;
use cocoon_models::ledger::{Ledger, PutResult, Transaction};
use cocoon_models::CocoonError;
use cocoon_store_exports::RangeQuery;

/// Ledger operations scoped to a cocoon. Ledger names and keys are the ones
/// the cocoon sees; the orderer namespaces them with `cocoon_id`.
#[cfg_attr(any(test, feature = "test-exports"), mockall::automock)]
#[async_trait::async_trait]
pub trait OrdererController: Send + Sync {
    /// Creates a ledger, and its chain when `chained`
    async fn create_ledger(
        &self,
        cocoon_id: &str,
        name: &str,
        chained: bool,
        public: bool,
    ) -> Result<Ledger, CocoonError>;

    /// Reads a ledger
    async fn get_ledger(&self, cocoon_id: &str, name: &str) -> Result<Ledger, CocoonError>;

    /// Stores transactions, in a new block if the ledger is chained
    async fn put(
        &self,
        cocoon_id: &str,
        ledger: &str,
        txs: Vec<Transaction>,
    ) -> Result<PutResult, CocoonError>;

    /// Latest version of a key
    async fn get(&self, cocoon_id: &str, ledger: &str, key: &str) -> Result<Transaction, CocoonError>;

    /// Transaction by id
    async fn get_by_id(&self, cocoon_id: &str, ledger: &str, id: &str) -> Result<Transaction, CocoonError>;

    /// Block of a chained ledger
    async fn get_block_by_id(&self, cocoon_id: &str, ledger: &str, id: &str) -> Result<Block, CocoonError>;

    /// Latest versions of the keys selected by `query`
    async fn get_range(
        &self,
        cocoon_id: &str,
        ledger: &str,
        query: RangeQuery,
    ) -> Result<Vec<Transaction>, CocoonError>;

    /// Returns a boxed clone of self.
    /// Allows cloning `Box<dyn OrdererController>`,
    fn clone_box(&self) -> Box<dyn OrdererController>;
}

impl Clone for Box<dyn OrdererController> {
    fn clone(&self) -> Box<dyn OrdererController> {
        self.clone_box()
    }
}
