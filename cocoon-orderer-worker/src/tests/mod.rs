// Copyright (c) 2023 The Cocoon Authors

use crate::{Orderer, OrdererClient, OrdererDiscovery, OrdererGrpc};
use assert_matches::assert_matches;
use cocoon_models::block::make_txs_hash;
use cocoon_models::ledger::Transaction;
use cocoon_models::naming::sha256_hex;
use cocoon_models::CocoonError;
use cocoon_orderer_exports::{OrdererConfig, OrdererController};
use cocoon_models::block::{Block, Chain};
use cocoon_store_exports::{
    BlockchainController, RangeQuery, StoreBatch, StoreConfig, StoreController, StoreError,
};
use cocoon_store_worker::CocoonDB;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn test_config() -> OrdererConfig {
    OrdererConfig {
        bind: "127.0.0.1:0".parse().unwrap(),
        put_retry_delay: Duration::from_millis(10),
        request_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

fn new_orderer() -> (Orderer, TempDir) {
    let dir = TempDir::new().unwrap();
    let db = CocoonDB::new(StoreConfig::new(dir.path().to_path_buf())).unwrap();
    db.init().unwrap();
    (
        Orderer::new(Box::new(db.clone()), Box::new(db), test_config()),
        dir,
    )
}

fn tx(id: &str, key: &str, value: &str) -> Transaction {
    Transaction {
        id: id.into(),
        key: key.into(),
        value: value.into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn chained_put_produces_blocks() {
    let (orderer, _dir) = new_orderer();
    let ledger = orderer.create_ledger("C1", "lg", true, true).await.unwrap();
    assert_eq!(ledger.name, "lg");
    assert!(ledger.chained);

    let first = orderer
        .put("C1", "lg", vec![tx("T1", "k", "v")])
        .await
        .unwrap();
    assert_eq!(first.tx_receipts.len(), 1);
    assert_eq!(first.tx_receipts[0].id, "T1");
    assert!(first.tx_receipts[0].err.is_empty());
    let block1 = first.block.unwrap();
    assert_eq!(block1.number, 1);
    assert_eq!(block1.prev_block_hash, sha256_hex("C1.lg"));

    let second = orderer
        .put("C1", "lg", vec![tx("T2", "k2", "v2")])
        .await
        .unwrap();
    let block2 = second.block.unwrap();
    assert_eq!(block2.number, 2);
    assert_eq!(block2.prev_block_hash, block1.hash);
    let members = block2.decode_transactions().unwrap();
    assert_eq!(block2.hash, make_txs_hash(&members));
    assert_eq!(members[0].key, "C1;k2");
}

#[tokio::test]
async fn get_attaches_block_and_strips_namespace() {
    let (orderer, _dir) = new_orderer();
    orderer.create_ledger("C1", "lg", true, false).await.unwrap();
    let res = orderer.put("C1", "lg", vec![tx("T1", "k", "v")]).await.unwrap();

    let got = orderer.get("C1", "lg", "k").await.unwrap();
    assert_eq!(got.key, "k");
    assert_eq!(got.ledger, "lg");
    assert!(got.block_id.is_empty());
    assert_eq!(got.block.unwrap().id, res.block.unwrap().id);

    let by_id = orderer.get_by_id("C1", "lg", "T1").await.unwrap();
    assert_eq!(by_id.value, "v");
    assert_eq!(orderer.get("C1", "lg", "nope").await, Err(CocoonError::TxNotFound));
    assert_eq!(
        orderer.get_block_by_id("C1", "lg", "nope").await,
        Err(CocoonError::BlockNotFound)
    );
}

#[tokio::test]
async fn unchained_put_has_no_block() {
    let (orderer, _dir) = new_orderer();
    let res = orderer
        .put("system", "public", vec![tx("T1", "k", "v")])
        .await
        .unwrap();
    assert!(res.block.is_none());
    let got = orderer.get("system", "public", "k").await.unwrap();
    assert!(got.block.is_none());
}

#[tokio::test]
async fn ledger_errors() {
    let (orderer, _dir) = new_orderer();
    assert_eq!(
        orderer.put("C1", "missing", vec![tx("T1", "k", "v")]).await,
        Err(CocoonError::LedgerNotFound)
    );
    orderer.create_ledger("C1", "lg", false, false).await.unwrap();
    assert_eq!(
        orderer.create_ledger("C1", "lg", true, false).await,
        Err(CocoonError::LedgerExists)
    );
    assert_eq!(orderer.get_ledger("C2", "lg").await, Err(CocoonError::LedgerNotFound));
}

#[tokio::test]
async fn nul_in_keys_is_an_invalid_argument() {
    let (orderer, _dir) = new_orderer();
    orderer.create_ledger("C1", "lg", true, false).await.unwrap();
    orderer.put("C1", "lg", vec![tx("T1", "a", "x")]).await.unwrap();

    assert_matches!(
        orderer.put("C1", "lg", vec![tx("T2", "a\0b", "y")]).await,
        Err(CocoonError::InvalidArgument(_))
    );
    assert_matches!(
        orderer.get("C1", "lg", "a\0b").await,
        Err(CocoonError::InvalidArgument(_))
    );
    assert_matches!(
        orderer.create_ledger("C1", "bad\0lg", false, false).await,
        Err(CocoonError::InvalidArgument(_))
    );
    assert_eq!(orderer.get("C1", "lg", "a").await.unwrap().value, "x");
}

/// Blockchain whose every block loses its height to another writer
#[derive(Clone)]
struct HeightAlwaysTaken {
    db: CocoonDB,
    stage_calls: Arc<AtomicU32>,
}

impl BlockchainController for HeightAlwaysTaken {
    fn create_chain(&self, name: &str, public: bool) -> Result<Chain, StoreError> {
        self.db.create_chain(name, public)
    }

    fn stage_chain(&self, batch: &mut StoreBatch, name: &str, public: bool) -> Result<Chain, StoreError> {
        self.db.stage_chain(batch, name, public)
    }

    fn get_chain(&self, name: &str) -> Result<Option<Chain>, StoreError> {
        self.db.get_chain(name)
    }

    fn create_block(&self, _id: &str, _chain_name: &str, _txs: &[Transaction]) -> Result<Block, StoreError> {
        Err(StoreError::DuplicatePrevBlockHash)
    }

    fn stage_block(
        &self,
        _batch: &mut StoreBatch,
        _id: &str,
        _chain_name: &str,
        _txs: &[Transaction],
    ) -> Result<Block, StoreError> {
        self.stage_calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::DuplicatePrevBlockHash)
    }

    fn get_block(&self, chain_name: &str, id: &str) -> Result<Option<Block>, StoreError> {
        self.db.get_block(chain_name, id)
    }

    fn get_tip(&self, chain_name: &str) -> Result<Option<Block>, StoreError> {
        self.db.get_tip(chain_name)
    }

    fn clone_box(&self) -> Box<dyn BlockchainController> {
        Box::new(self.clone())
    }
}

#[tokio::test]
async fn put_gives_up_after_max_attempts() {
    let dir = TempDir::new().unwrap();
    let db = CocoonDB::new(StoreConfig::new(dir.path().to_path_buf())).unwrap();
    db.init().unwrap();
    let stage_calls = Arc::new(AtomicU32::new(0));
    let blockchain = HeightAlwaysTaken {
        db: db.clone(),
        stage_calls: stage_calls.clone(),
    };
    let config = test_config();
    let max_attempts = config.put_max_attempts;
    assert_eq!(max_attempts, 5);
    let orderer = Orderer::new(Box::new(db), Box::new(blockchain), config);
    orderer.create_ledger("C1", "lg", true, true).await.unwrap();

    let res = orderer.put("C1", "lg", vec![tx("T1", "k", "v")]).await;
    assert_matches!(res, Err(CocoonError::DuplicatePrevBlockHash));
    assert_eq!(stage_calls.load(Ordering::SeqCst), max_attempts);

    assert_matches!(orderer.get("C1", "lg", "k").await, Err(CocoonError::TxNotFound));
    assert_matches!(orderer.get_by_id("C1", "lg", "T1").await, Err(CocoonError::TxNotFound));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_puts_get_distinct_heights() {
    let (orderer, _dir) = new_orderer();
    orderer.create_ledger("C1", "lg", true, true).await.unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let orderer = orderer.clone();
            tokio::spawn(async move {
                orderer
                    .put("C1", "lg", vec![tx(&format!("T{}", i), &format!("k{}", i), "v")])
                    .await
            })
        })
        .collect();

    let mut numbers = Vec::new();
    for handle in handles {
        let res = handle.await.unwrap().unwrap();
        numbers.push(res.block.unwrap().number);
    }
    numbers.sort_unstable();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn ranges_are_scoped_to_the_caller() {
    let (orderer, _dir) = new_orderer();
    orderer.create_ledger("c1", "main", false, false).await.unwrap();
    orderer.create_ledger("c2", "main", false, false).await.unwrap();
    for (cocoon, key) in [("c1", "account.ken"), ("c1", "account.glen"), ("c2", "account.bob")] {
        orderer
            .put(cocoon, "main", vec![tx(&format!("m{}{}", cocoon, key), key, "v")])
            .await
            .unwrap();
    }
    let txs = orderer
        .get_range(
            "c1",
            "main",
            RangeQuery {
                start: "account".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let keys: Vec<_> = txs.iter().map(|t| t.key.as_str()).collect();
    assert_eq!(keys, vec!["account.glen", "account.ken"]);

    let ending = orderer
        .get_range(
            "c1",
            "main",
            RangeQuery {
                end: "ken".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(ending.len(), 1);
    assert_eq!(ending[0].key, "account.ken");
}

#[tokio::test]
async fn grpc_round_trip() {
    let (orderer, _dir) = new_orderer();
    let stop_handle = OrdererGrpc::new(Box::new(orderer))
        .serve(&test_config())
        .await
        .unwrap();

    let client = OrdererClient::new(
        OrdererDiscovery::with_addrs(vec![stop_handle.local_addr().to_string()]),
        Duration::from_secs(5),
    );
    client.create_ledger("C1", "lg", true, true).await.unwrap();
    let res = client.put("C1", "lg", vec![tx("T1", "k", "v")]).await.unwrap();
    assert_eq!(res.block.as_ref().unwrap().number, 1);

    let got = client.get("C1", "lg", "k").await.unwrap();
    assert_eq!(got.value, "v");
    assert_eq!(got.block.unwrap().hash, res.block.unwrap().hash);

    assert_eq!(client.get("C1", "lg", "nope").await, Err(CocoonError::TxNotFound));
    assert_eq!(
        client.create_ledger("C1", "lg", false, false).await,
        Err(CocoonError::LedgerExists)
    );
    stop_handle.stop();
}

#[tokio::test]
async fn client_without_orderers() {
    let client = OrdererClient::new(OrdererDiscovery::with_addrs(vec![]), Duration::from_secs(1));
    assert_matches!(
        client.get_ledger("C1", "lg").await,
        Err(CocoonError::Internal(msg)) if msg == "no known orderer address"
    );
}
