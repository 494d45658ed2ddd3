// Copyright (c) 2023 The Cocoon Authors

use cocoon_logging::cocoon_trace;
use cocoon_models::block::Block;
use cocoon_models::ledger::{Ledger, PutResult, Transaction};
use cocoon_models::naming::{actual_name, make_ledger_name, make_tx_key, new_block_id};
use cocoon_models::CocoonError;
use cocoon_orderer_exports::{OrdererConfig, OrdererController};
use cocoon_store_exports::{BlockchainController, RangeQuery, StoreController, StoreError};
use std::time::Instant;
use tracing::{debug, error, warn};

/// In-process orderer over a store and a blockchain
#[derive(Clone)]
pub struct Orderer {
    store: Box<dyn StoreController>,
    blockchain: Box<dyn BlockchainController>,
    config: OrdererConfig,
}

impl Orderer {
    /// Orderer over `store` and `blockchain`
    pub fn new(
        store: Box<dyn StoreController>,
        blockchain: Box<dyn BlockchainController>,
        config: OrdererConfig,
    ) -> Self {
        Orderer {
            store,
            blockchain,
            config,
        }
    }

    fn ledger(&self, cocoon_id: &str, name: &str) -> Result<Ledger, CocoonError> {
        self.store
            .get_ledger(&make_ledger_name(cocoon_id, name))?
            .ok_or(CocoonError::LedgerNotFound)
    }

    /// Attaches the block of a chained ledger and strips the namespace
    fn present(
        &self,
        mut tx: Transaction,
        ledger: &Ledger,
        ledger_name: &str,
    ) -> Result<Transaction, CocoonError> {
        if ledger.chained {
            let block = self
                .blockchain
                .get_block(&ledger.name, &tx.block_id)
                .map_err(|e| {
                    debug!("block lookup of tx {} failed: {}", tx.id, e);
                    CocoonError::Internal("failed to populate block to transaction".into())
                })?
                .ok_or_else(|| CocoonError::Internal("orphaned transaction".into()))?;
            tx.block = Some(Box::new(block));
            tx.block_id = String::new();
        }
        tx.key = actual_name(&tx.key).to_string();
        tx.ledger = ledger_name.to_string();
        Ok(tx)
    }
}

#[async_trait::async_trait]
impl OrdererController for Orderer {
    async fn create_ledger(
        &self,
        cocoon_id: &str,
        name: &str,
        chained: bool,
        public: bool,
    ) -> Result<Ledger, CocoonError> {
        let internal = make_ledger_name(cocoon_id, name);
        let mut ledger = if chained {
            let blockchain = &self.blockchain;
            self.store
                .create_ledger_then(&internal, chained, public, &mut |batch| {
                    blockchain.stage_chain(batch, &internal, public).map(|_| ())
                })?
        } else {
            self.store.create_ledger(&internal, chained, public)?
        };
        cocoon_trace!("orderer.create_ledger", { "ledger": internal, "chained": chained });
        ledger.name = name.to_string();
        Ok(ledger)
    }

    async fn get_ledger(&self, cocoon_id: &str, name: &str) -> Result<Ledger, CocoonError> {
        let mut ledger = self.ledger(cocoon_id, name)?;
        ledger.name = name.to_string();
        Ok(ledger)
    }

    async fn put(
        &self,
        cocoon_id: &str,
        ledger_name: &str,
        txs: Vec<Transaction>,
    ) -> Result<PutResult, CocoonError> {
        let start = Instant::now();
        let ledger = self.ledger(cocoon_id, ledger_name)?;
        let block_id = new_block_id();
        let txs: Vec<Transaction> = txs
            .into_iter()
            .map(|mut tx| {
                tx.key = make_tx_key(cocoon_id, &tx.key);
                tx.block_id = if ledger.chained {
                    block_id.clone()
                } else {
                    String::new()
                };
                tx.block = None;
                tx
            })
            .collect();

        let mut attempt = 1;
        loop {
            let mut block = None;
            let res = if ledger.chained {
                let blockchain = &self.blockchain;
                self.store
                    .put_then(&ledger.name, txs.clone(), &mut |batch, stored| {
                        block = Some(blockchain.stage_block(batch, &block_id, &ledger.name, stored)?);
                        Ok(())
                    })
            } else {
                self.store.put(&ledger.name, txs.clone())
            };
            match res {
                Ok(tx_receipts) => {
                    cocoon_trace!("orderer.put", {
                        "ledger": ledger.name,
                        "count": tx_receipts.len(),
                        "attempt": attempt,
                    });
                    debug!("put(): time taken: {:?}", start.elapsed());
                    return Ok(PutResult { tx_receipts, block });
                }
                Err(StoreError::DuplicatePrevBlockHash) if attempt < self.config.put_max_attempts => {
                    warn!(
                        "block height of {} taken by another writer, attempt {}/{}",
                        ledger.name, attempt, self.config.put_max_attempts
                    );
                    attempt += 1;
                    tokio::time::sleep(self.config.put_retry_delay).await;
                }
                Err(err) => {
                    error!("failed to PUT: {}", err);
                    return Err(err.into());
                }
            }
        }
    }

    async fn get(&self, cocoon_id: &str, ledger_name: &str, key: &str) -> Result<Transaction, CocoonError> {
        let ledger = self.ledger(cocoon_id, ledger_name)?;
        let tx = self
            .store
            .get(&ledger.name, &make_tx_key(cocoon_id, key))?
            .ok_or(CocoonError::TxNotFound)?;
        self.present(tx, &ledger, ledger_name)
    }

    async fn get_by_id(&self, cocoon_id: &str, ledger_name: &str, id: &str) -> Result<Transaction, CocoonError> {
        let ledger = self.ledger(cocoon_id, ledger_name)?;
        let tx = self
            .store
            .get_by_id(&ledger.name, id)?
            .ok_or(CocoonError::TxNotFound)?;
        self.present(tx, &ledger, ledger_name)
    }

    async fn get_block_by_id(&self, cocoon_id: &str, ledger_name: &str, id: &str) -> Result<Block, CocoonError> {
        let ledger = self.ledger(cocoon_id, ledger_name)?;
        self.blockchain
            .get_block(&ledger.name, id)?
            .ok_or(CocoonError::BlockNotFound)
    }

    async fn get_range(
        &self,
        cocoon_id: &str,
        ledger_name: &str,
        mut query: RangeQuery,
    ) -> Result<Vec<Transaction>, CocoonError> {
        let ledger = self.ledger(cocoon_id, ledger_name)?;
        if !query.end.is_empty() {
            query.end = if query.start.is_empty() {
                make_tx_key(cocoon_id, &format!("%{}", query.end))
            } else {
                make_tx_key(cocoon_id, &query.end)
            };
        }
        if !query.start.is_empty() {
            query.start = make_tx_key(cocoon_id, &query.start);
        } else if query.end.is_empty() {
            // whole ledger, restricted to the caller's namespace
            query.start = make_tx_key(cocoon_id, "");
        }
        self.store
            .get_range(&ledger.name, &query)?
            .into_iter()
            .map(|tx| self.present(tx, &ledger, ledger_name))
            .collect()
    }

    fn clone_box(&self) -> Box<dyn OrdererController> {
        Box::new(self.clone())
    }
}
