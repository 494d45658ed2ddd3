// Copyright (c) 2023 The Cocoon Authors

use crate::block_maker::{BlockMaker, Entry};
use crate::connector::ConnectorClient;
use crate::error::RuntimeError;
use crate::lock::Lock;
use crate::range_getter::RangeGetter;
use cocoon_models::block::Block;
use cocoon_models::ledger::{Ledger, Transaction};
use cocoon_models::naming::RESERVED_LEDGER_NAMES;
use cocoon_models::validation::is_valid_res_name;
use cocoon_models::CocoonError;
use cocoon_time::CocoonTime;
use std::time::Duration;
use tracing::debug;

/// Access to the ledgers and locks of one cocoon
#[derive(Clone)]
pub struct Link {
    cocoon_id: String,
    default_ledger: String,
    native: bool,
    connector: Box<dyn ConnectorClient>,
    block_maker: BlockMaker,
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("cocoon_id", &self.cocoon_id)
            .field("default_ledger", &self.default_ledger)
            .field("native", &self.native)
            .finish()
    }
}

impl Link {
    /// Link to `cocoon_id`, with `default_ledger` as default ledger
    pub fn new(
        cocoon_id: &str,
        default_ledger: &str,
        native: bool,
        connector: Box<dyn ConnectorClient>,
        block_maker: BlockMaker,
    ) -> Self {
        Link {
            cocoon_id: cocoon_id.to_string(),
            default_ledger: default_ledger.to_string(),
            native,
            connector,
            block_maker,
        }
    }

    /// Cocoon owning the resources
    pub fn cocoon_id(&self) -> &str {
        &self.cocoon_id
    }

    /// Whether the link reaches the running cocoon or its native link
    pub fn is_native(&self) -> bool {
        self.native
    }

    /// Ledger used by [`Link::put`], [`Link::get`] and the like
    pub fn default_ledger(&self) -> &str {
        &self.default_ledger
    }

    /// Same link with another default ledger
    pub fn with_default_ledger(mut self, name: &str) -> Self {
        self.default_ledger = name.to_string();
        self
    }

    /// Creates a ledger. A chained ledger groups its transactions in blocks.
    pub async fn create_ledger(
        &self,
        name: &str,
        chained: bool,
        public: bool,
    ) -> Result<Ledger, RuntimeError> {
        if RESERVED_LEDGER_NAMES.contains(&name) {
            return Err(RuntimeError::ReservedName);
        }
        if !is_valid_res_name(name) {
            return Err(CocoonError::InvalidResourceName("invalid ledger name".into()).into());
        }
        Ok(self
            .connector
            .create_ledger(&self.cocoon_id, name, chained, public)
            .await?)
    }

    /// Reads a ledger
    pub async fn get_ledger(&self, name: &str) -> Result<Ledger, RuntimeError> {
        Ok(self.connector.get_ledger(&self.cocoon_id, name).await?)
    }

    /// Stores `value` under `key` in `ledger`. On a chained ledger, returns
    /// once the block holding the transaction is created, with the block
    /// attached.
    pub async fn put_in(&self, ledger: &str, key: &str, value: &str) -> Result<Transaction, RuntimeError> {
        let start = std::time::Instant::now();
        let ledger = self.get_ledger(ledger).await?;
        let created_at = CocoonTime::now().map(|t| t.to_unix_secs()).unwrap_or_default();
        let mut tx = Transaction::new(&ledger.name, key, value, created_at);

        if ledger.chained {
            let (entry, rx) = Entry::new(tx.clone(), &self.cocoon_id);
            self.block_maker.add(entry);
            let block = rx.await.map_err(|_| RuntimeError::BlockMakerStopped)??;
            tx.block = block.map(Box::new);
        } else {
            let result = self
                .connector
                .put(&self.cocoon_id, &ledger.name, vec![tx.clone()])
                .await?;
            if let Some(receipt) = result.receipt(&tx.id).filter(|r| !r.err.is_empty()) {
                return Err(RuntimeError::TxRejected(receipt.err.clone()));
            }
        }
        debug!("put: took {:?}", start.elapsed());
        Ok(tx)
    }

    /// Stores `value` under `key` in the default ledger
    pub async fn put(&self, key: &str, value: &str) -> Result<Transaction, RuntimeError> {
        self.put_in(&self.default_ledger, key, value).await
    }

    /// Latest version of `key` in `ledger`
    pub async fn get_from(&self, ledger: &str, key: &str) -> Result<Transaction, RuntimeError> {
        Ok(self.connector.get(&self.cocoon_id, ledger, key).await?)
    }

    /// Latest version of `key` in the default ledger
    pub async fn get(&self, key: &str) -> Result<Transaction, RuntimeError> {
        self.get_from(&self.default_ledger, key).await
    }

    /// Transaction of `ledger` by id
    pub async fn get_by_id_from(&self, ledger: &str, id: &str) -> Result<Transaction, RuntimeError> {
        Ok(self.connector.get_by_id(&self.cocoon_id, ledger, id).await?)
    }

    /// Transaction of the default ledger by id
    pub async fn get_by_id(&self, id: &str) -> Result<Transaction, RuntimeError> {
        self.get_by_id_from(&self.default_ledger, id).await
    }

    /// Block of `ledger` by id
    pub async fn get_block_from(&self, ledger: &str, id: &str) -> Result<Block, RuntimeError> {
        Ok(self.connector.get_block(&self.cocoon_id, ledger, id).await?)
    }

    /// Block of the default ledger by id
    pub async fn get_block(&self, id: &str) -> Result<Block, RuntimeError> {
        self.get_block_from(&self.default_ledger, id).await
    }

    /// Iterates the keys of `ledger` between `start` and `end`.
    /// `start` alone selects a prefix, `end` alone a suffix.
    pub fn range_getter_in(&self, ledger: &str, start: &str, end: &str, inclusive: bool) -> RangeGetter {
        RangeGetter::new(
            self.connector.clone(),
            &self.cocoon_id,
            ledger,
            start,
            end,
            inclusive,
        )
    }

    /// [`Link::range_getter_in`] on the default ledger
    pub fn range_getter(&self, start: &str, end: &str, inclusive: bool) -> RangeGetter {
        self.range_getter_in(&self.default_ledger, start, end, inclusive)
    }

    /// Lock handle on `key`, scoped to the cocoon of this link
    pub fn lock(&self, key: &str, ttl: Duration) -> Result<Lock, RuntimeError> {
        Lock::new(self.connector.clone(), &self.cocoon_id, key, ttl)
    }
}
