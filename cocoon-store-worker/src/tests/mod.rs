// Copyright (c) 2023 The Cocoon Authors

use crate::CocoonDB;
use assert_matches::assert_matches;
use cocoon_models::ledger::Transaction;
use cocoon_models::naming::{genesis_hash, make_ledger_name, make_tx_key, ZERO_HASH};
use cocoon_store_exports::{
    BlockchainController, RangeQuery, StoreBatch, StoreConfig, StoreController, StoreError,
    DUPLICATE_TX_ID_ERROR,
};
use tempfile::TempDir;

fn new_db() -> (CocoonDB, TempDir) {
    let dir = TempDir::new().expect("cannot create temp dir");
    let db = CocoonDB::new(StoreConfig::new(dir.path().to_path_buf())).expect("cannot open db");
    db.init().expect("init failed");
    (db, dir)
}

fn tx(key: &str, value: &str, created_at: i64) -> Transaction {
    Transaction::new("", key, value, created_at)
}

fn hashed(key: &str, value: &str) -> Transaction {
    let mut t = tx(key, value, 1);
    t.hash = t.make_hash();
    t
}

#[test]
fn init_creates_system_ledgers_once() {
    let (db, _dir) = new_db();
    db.init().unwrap();
    let public = db.get_ledger("system;public").unwrap().unwrap();
    assert!(public.public && !public.chained);
    let private = db.get_ledger("system;private").unwrap().unwrap();
    assert!(!private.public);
}

#[test]
fn ledger_names_are_unique() {
    let (db, _dir) = new_db();
    let name = make_ledger_name("c1", "accounts");
    let ledger = db.create_ledger(&name, true, true).unwrap();
    assert_eq!(ledger.name, name);
    assert_eq!(db.create_ledger(&name, false, false), Err(StoreError::LedgerExists));
    assert!(db.get_ledger("c1;missing").unwrap().is_none());
}

#[test]
fn put_requires_existing_ledger_and_transactions() {
    let (db, _dir) = new_db();
    assert_eq!(
        db.put("c1;missing", vec![tx("c1;k", "v", 1)]),
        Err(StoreError::LedgerNotFound)
    );
    assert_eq!(db.put("system;public", vec![]), Err(StoreError::NoTransactions));
}

#[test]
fn duplicate_ids_are_reported_in_receipts() {
    let (db, _dir) = new_db();
    let first = tx("c1;k", "v", 1);
    let mut again = tx("c1;k2", "v", 1);
    again.id = first.id.clone();
    let receipts = db.put("system;public", vec![first.clone(), again]).unwrap();
    assert_eq!(receipts.len(), 2);
    assert!(receipts[0].err.is_empty());
    assert_eq!(receipts[1].err, DUPLICATE_TX_ID_ERROR);

    let receipts = db.put("system;public", vec![first.clone()]).unwrap();
    assert_eq!(receipts[0].err, DUPLICATE_TX_ID_ERROR);

    let stored = db.get_by_id("system;public", &first.id).unwrap().unwrap();
    assert!(stored.has_valid_hash());
    assert_eq!(stored.ledger, "system;public");
}

#[test]
fn get_returns_latest_version() {
    let (db, _dir) = new_db();
    db.put("system;public", vec![tx("c1;k", "v1", 10)]).unwrap();
    db.put("system;public", vec![tx("c1;k", "v2", 20)]).unwrap();
    db.put("system;public", vec![tx("c1;k", "v3", 20)]).unwrap();
    db.put("system;public", vec![tx("c1;kk", "other", 30)]).unwrap();
    assert_eq!(db.get("system;public", "c1;k").unwrap().unwrap().value, "v3");
    assert!(db.get("system;public", "c1;unknown").unwrap().is_none());
}

#[test]
fn keys_holding_the_separator_are_rejected() {
    let (db, _dir) = new_db();
    db.put("system;public", vec![tx("c1;a", "x", 1)]).unwrap();
    assert_eq!(
        db.put("system;public", vec![tx("c1;b", "ok", 2), tx("c1;a\0b", "y", 2)]),
        Err(StoreError::InvalidKey("transaction key"))
    );
    // nothing of the rejected put is stored
    assert!(db.get("system;public", "c1;b").unwrap().is_none());
    assert_eq!(db.get("system;public", "c1;a").unwrap().unwrap().value, "x");
    assert_eq!(
        db.get("system;public", "c1;a\0b"),
        Err(StoreError::InvalidKey("transaction key"))
    );
    let all = db
        .get_range(
            "system;public",
            &RangeQuery {
                start: "c1;a".into(),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(all.len(), 1);

    assert_eq!(
        db.create_ledger("c1;bad\0name", false, true),
        Err(StoreError::InvalidKey("ledger name"))
    );
    assert_eq!(
        db.create_chain("c1;bad\0chain", true),
        Err(StoreError::InvalidKey("chain name"))
    );
}

#[test]
fn range_queries() {
    let (db, _dir) = new_db();
    let ledger = make_ledger_name("c1", "main");
    db.create_ledger(&ledger, false, true).unwrap();
    for key in ["account.glen", "account.ken", "x", "xy"] {
        db.put(&ledger, vec![tx(&make_tx_key("c1", key), "v", 1)])
            .unwrap();
    }
    // newer version must not be counted twice
    db.put(&ledger, vec![tx(&make_tx_key("c1", "x"), "v2", 2)])
        .unwrap();

    let count = |start: &str, end: &str, inclusive: bool| {
        db.get_range(
            &ledger,
            &RangeQuery {
                start: start.into(),
                end: end.into(),
                inclusive,
                ..Default::default()
            },
        )
        .unwrap()
        .len()
    };
    assert_eq!(count("c1;account", "c1;x", false), 2);
    assert_eq!(count("c1;account", "c1;x", true), 4);
    assert_eq!(count("c1;account", "", false), 2);

    let all = db.get_range(&ledger, &RangeQuery::default()).unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all[2].value, "v2");
}

#[test]
fn range_pattern_with_paging() {
    let (db, _dir) = new_db();
    let ledger = "system;public";
    for key in ["ben.account", "glen.account", "account.ken"] {
        db.put(ledger, vec![tx(&make_tx_key("c1", key), "v", 1)])
            .unwrap();
    }
    let page = |offset: usize| {
        db.get_range(
            ledger,
            &RangeQuery {
                end: make_tx_key("c1", "%account"),
                limit: 1,
                offset,
                ..Default::default()
            },
        )
        .unwrap()
    };
    assert_eq!(page(0)[0].key, "c1;ben.account");
    assert_eq!(page(1)[0].key, "c1;glen.account");
    assert!(page(2).is_empty());
}

#[test]
fn blocks_are_chained_from_genesis() {
    let (db, _dir) = new_db();
    let name = make_ledger_name("c1", "chained");
    db.create_chain(&name, true).unwrap();
    assert_eq!(db.create_chain(&name, true), Err(StoreError::ChainExists));
    assert!(db.get_tip(&name).unwrap().is_none());

    let first = db.create_block("b1", &name, &[hashed("c1;a", "1")]).unwrap();
    assert_eq!(first.number, 1);
    assert_eq!(first.prev_block_hash, genesis_hash(&name));

    let second = db.create_block("b2", &name, &[hashed("c1;b", "2")]).unwrap();
    assert_eq!(second.number, 2);
    assert_eq!(second.prev_block_hash, first.hash);
    assert_eq!(db.get_tip(&name).unwrap().unwrap().id, "b2");
    assert_eq!(db.get_block(&name, "b1").unwrap().unwrap(), first);
    assert_eq!(second.decode_transactions().unwrap()[0].value, "2");
}

#[test]
fn unnamespaced_chain_starts_at_zero_hash() {
    let (db, _dir) = new_db();
    db.create_chain("plain", false).unwrap();
    let block = db.create_block("b1", "plain", &[hashed("k", "v")]).unwrap();
    assert_eq!(block.prev_block_hash, ZERO_HASH);
}

#[test]
fn block_validation() {
    let (db, _dir) = new_db();
    assert_eq!(db.create_block("b", "nope", &[hashed("k", "v")]), Err(StoreError::ChainNotFound));
    db.create_chain("c1;l", true).unwrap();
    assert_eq!(db.create_block("b", "c1;l", &[]), Err(StoreError::NoTransactions));
    let mut bad = hashed("k", "v");
    bad.value = "tampered".into();
    assert_matches!(
        db.create_block("b", "c1;l", &[bad.clone()]),
        Err(StoreError::InvalidBlockTransaction(id)) if id == bad.id
    );
}

#[test]
fn concurrent_staged_blocks_conflict() {
    let (db, _dir) = new_db();
    db.create_chain("c1;l", true).unwrap();

    let mut batch_a = StoreBatch::new();
    let mut batch_b = StoreBatch::new();
    db.stage_block(&mut batch_a, "a", "c1;l", &[hashed("k", "a")]).unwrap();
    db.stage_block(&mut batch_b, "b", "c1;l", &[hashed("k", "b")]).unwrap();

    db.commit(batch_a).unwrap();
    assert_eq!(db.commit(batch_b), Err(StoreError::DuplicatePrevBlockHash));
    assert_eq!(db.get_tip("c1;l").unwrap().unwrap().id, "a");
    assert!(db.get_block("c1;l", "b").unwrap().is_none());
}

#[test]
fn put_hook_runs_in_the_same_commit() {
    let (db, _dir) = new_db();
    db.create_chain("system;public", true).unwrap();
    let mut block_id = String::new();
    let receipts = db
        .put_then("system;public", vec![tx("c1;k", "v", 1)], &mut |batch, stored| {
            block_id = db.stage_block(batch, "blk", "system;public", stored)?.id;
            Ok(())
        })
        .unwrap();
    assert!(receipts[0].err.is_empty());
    assert_eq!(block_id, "blk");
    assert!(db.get_block("system;public", "blk").unwrap().is_some());

    // a failing hook discards the transactions
    let failing = tx("c1;k2", "v", 1);
    let res = db.put_then("system;public", vec![failing.clone()], &mut |_, _| {
        Err(StoreError::CallbackError("boom".into()))
    });
    assert_eq!(res, Err(StoreError::CallbackError("boom".into())));
    assert!(db.get_by_id("system;public", &failing.id).unwrap().is_none());
}

#[test]
fn sequence_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let number = {
        let db = CocoonDB::new(StoreConfig::new(dir.path().to_path_buf())).unwrap();
        db.init().unwrap();
        db.get_ledger("system;private").unwrap().unwrap().number
    };
    let db = CocoonDB::new(StoreConfig::new(dir.path().to_path_buf())).unwrap();
    let ledger = db.create_ledger("c1;after", false, false).unwrap();
    assert!(ledger.number > number);
}
