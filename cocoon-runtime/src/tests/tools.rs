// Copyright (c) 2023 The Cocoon Authors

use crate::ConnectorClient;
use cocoon_lock_exports::LockController;
use cocoon_lock_worker::MemoryLockController;
use cocoon_models::block::Block;
use cocoon_models::ledger::{Ledger, PutResult, Transaction};
use cocoon_models::naming::make_lock_key;
use cocoon_models::CocoonError;
use cocoon_orderer_exports::{OrdererConfig, OrdererController};
use cocoon_orderer_worker::Orderer;
use cocoon_store_exports::{RangeQuery, StoreConfig, StoreController};
use cocoon_store_worker::CocoonDB;
use std::time::Duration;
use tempfile::TempDir;

/// Serves link operations from an in-process orderer and memory locks
#[derive(Clone)]
pub struct LocalConnector {
    orderer: Orderer,
    locks: MemoryLockController,
}

impl LocalConnector {
    pub fn new() -> (Self, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = CocoonDB::new(StoreConfig::new(dir.path().to_path_buf())).unwrap();
        db.init().unwrap();
        let orderer = Orderer::new(Box::new(db.clone()), Box::new(db), OrdererConfig::default());
        (
            LocalConnector {
                orderer,
                locks: MemoryLockController::new(),
            },
            dir,
        )
    }
}

#[async_trait::async_trait]
impl ConnectorClient for LocalConnector {
    async fn create_ledger(
        &self,
        link_to: &str,
        name: &str,
        chained: bool,
        public: bool,
    ) -> Result<Ledger, CocoonError> {
        self.orderer.create_ledger(link_to, name, chained, public).await
    }

    async fn get_ledger(&self, link_to: &str, name: &str) -> Result<Ledger, CocoonError> {
        self.orderer.get_ledger(link_to, name).await
    }

    async fn put(
        &self,
        link_to: &str,
        ledger: &str,
        txs: Vec<Transaction>,
    ) -> Result<PutResult, CocoonError> {
        self.orderer.put(link_to, ledger, txs).await
    }

    async fn get(&self, link_to: &str, ledger: &str, key: &str) -> Result<Transaction, CocoonError> {
        self.orderer.get(link_to, ledger, key).await
    }

    async fn get_by_id(&self, link_to: &str, ledger: &str, id: &str) -> Result<Transaction, CocoonError> {
        self.orderer.get_by_id(link_to, ledger, id).await
    }

    async fn get_block(&self, link_to: &str, ledger: &str, id: &str) -> Result<Block, CocoonError> {
        self.orderer.get_block_by_id(link_to, ledger, id).await
    }

    async fn get_range(
        &self,
        link_to: &str,
        ledger: &str,
        query: RangeQuery,
    ) -> Result<Vec<Transaction>, CocoonError> {
        self.orderer.get_range(link_to, ledger, query).await
    }

    async fn acquire_lock(
        &self,
        link_to: &str,
        key: &str,
        ttl: Duration,
        session: &str,
    ) -> Result<String, CocoonError> {
        Ok(self
            .locks
            .acquire(&make_lock_key(link_to, key), ttl, session)
            .await?)
    }

    async fn is_lock_acquirer(&self, link_to: &str, key: &str, session: &str) -> Result<(), CocoonError> {
        Ok(self.locks.is_acquirer(&make_lock_key(link_to, key), session).await?)
    }

    async fn release_lock(&self, link_to: &str, key: &str, session: &str) -> Result<(), CocoonError> {
        Ok(self.locks.release(&make_lock_key(link_to, key), session).await?)
    }

    fn clone_box(&self) -> Box<dyn ConnectorClient> {
        Box::new(self.clone())
    }
}
