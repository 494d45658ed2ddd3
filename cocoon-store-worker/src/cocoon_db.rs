// Copyright (c) 2023 The Cocoon Authors

use crate::range::matches_range;
use cocoon_logging::cocoon_trace;
use cocoon_models::block::{make_txs_hash, Block, Chain};
use cocoon_models::ledger::{Ledger, Transaction, TxReceipt};
use cocoon_models::naming::genesis_hash;
use cocoon_store_exports::{
    composite_key, BlockchainController, LedgerHook, PutHook, RangeQuery, StoreBatch,
    StoreConfig, StoreController, StoreError, BLOCKS_CF, BLOCK_NUMBERS_CF, BLOCK_PREV_HASHES_CF,
    CF_ERROR, CHAINS_CF, COLUMN_FAMILIES, DUPLICATE_TX_ID_ERROR, KEY_SEPARATOR, LEDGERS_CF,
    METADATA_CF, OPEN_ERROR, RECORD_DESER_ERROR, SEQUENCE_KEY, TRANSACTIONS_CF, TX_IDS_CF,
    TX_KEYS_CF,
};
use cocoon_time::CocoonTime;
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use serde_json::Error as JsonError;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

struct Inner {
    db: DB,
    config: StoreConfig,
    /// last allocated sequence number
    seq: AtomicU64,
    commit_lock: Mutex<()>,
}

/// RocksDB backed store and blockchain
#[derive(Clone)]
pub struct CocoonDB {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CocoonDB {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CocoonDB {{ path: {:?} }}", self.inner.config.path)
    }
}

fn now_secs() -> i64 {
    CocoonTime::now()
        .map(|t| t.to_unix_secs())
        .unwrap_or_default()
}

fn rocks_err(err: rocksdb::Error) -> StoreError {
    StoreError::RocksDbError(err.to_string())
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes)
        .map_err(|e: JsonError| StoreError::SerializationError(format!("{}: {}", RECORD_DESER_ERROR, e)))
}

/// Ledger names and keys are joined with [`KEY_SEPARATOR`] and must not hold it
fn check_component(what: &'static str, value: &str) -> Result<(), StoreError> {
    if value.as_bytes().contains(&KEY_SEPARATOR) {
        return Err(StoreError::InvalidKey(what));
    }
    Ok(())
}

/// `<createdAt><seq>`, both big endian so versions sort chronologically
fn version_suffix(created_at: i64, seq: u64) -> Vec<u8> {
    let mut v = Vec::with_capacity(16);
    v.extend_from_slice(&u64::try_from(created_at).unwrap_or(0).to_be_bytes());
    v.extend_from_slice(&seq.to_be_bytes());
    v
}

impl CocoonDB {
    /// Opens (or creates) the database described by `config`
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        let db = DB::open_cf_descriptors(
            &db_opts,
            &config.path,
            COLUMN_FAMILIES
                .iter()
                .map(|cf| ColumnFamilyDescriptor::new(*cf, Options::default()))
                .collect::<Vec<_>>(),
        )
        .map_err(|e| StoreError::RocksDbError(format!("{}: {}", OPEN_ERROR, e)))?;

        let seq = {
            let handle = db
                .cf_handle(METADATA_CF)
                .ok_or_else(|| StoreError::RocksDbError(CF_ERROR.to_string()))?;
            match db.get_cf(handle, SEQUENCE_KEY).map_err(rocks_err)? {
                Some(bytes) => {
                    let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                        StoreError::SerializationError(RECORD_DESER_ERROR.to_string())
                    })?;
                    u64::from_be_bytes(arr)
                }
                None => 0,
            }
        };
        info!("store opened at {:?}", config.path);

        Ok(CocoonDB {
            inner: Arc::new(Inner {
                db,
                config,
                seq: AtomicU64::new(seq),
                commit_lock: Mutex::new(()),
            }),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StoreError> {
        self.inner
            .db
            .cf_handle(name)
            .ok_or_else(|| StoreError::RocksDbError(CF_ERROR.to_string()))
    }

    fn next_seq(&self) -> u64 {
        self.inner.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn get_raw(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.db.get_cf(self.cf(cf)?, key).map_err(rocks_err)
    }

    /// Entries of `cf` whose key starts with `prefix`, in key order
    fn scan_prefix(&self, cf: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut out = Vec::new();
        for item in self
            .inner
            .db
            .iterator_cf(self.cf(cf)?, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item.map_err(rocks_err)?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    /// Last entry of `cf` whose key starts with `prefix`, for fixed-width suffixes
    fn last_with_prefix(
        &self,
        cf: &str,
        prefix: &[u8],
        suffix_len: usize,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let mut upper = prefix.to_vec();
        upper.extend(std::iter::repeat(u8::MAX).take(suffix_len + 1));
        let mut iter = self
            .inner
            .db
            .iterator_cf(self.cf(cf)?, IteratorMode::From(&upper, Direction::Reverse));
        match iter.next() {
            Some(item) => {
                let (key, value) = item.map_err(rocks_err)?;
                Ok(key.starts_with(prefix).then(|| value.to_vec()))
            }
            None => Ok(None),
        }
    }

    /// Writes `batch` if none of its claimed keys exists
    pub fn commit(&self, batch: StoreBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let _guard = self.inner.commit_lock.lock();
        for claim in &batch.claims {
            if self.get_raw(claim.cf, &claim.key)?.is_some() {
                debug!("store commit rejected on claimed key in {}", claim.cf);
                return Err(claim.on_conflict.clone());
            }
        }
        let mut write_batch = WriteBatch::default();
        for (cf, entries) in &batch.puts {
            let handle = self.cf(cf)?;
            for (key, value) in entries {
                write_batch.put_cf(handle, key, value);
            }
        }
        write_batch.put_cf(
            self.cf(METADATA_CF)?,
            SEQUENCE_KEY,
            self.inner.seq.load(Ordering::SeqCst).to_be_bytes(),
        );
        self.inner.db.write(write_batch).map_err(rocks_err)
    }

    fn stage_ledger(
        &self,
        batch: &mut StoreBatch,
        name: &str,
        chained: bool,
        public: bool,
    ) -> Result<Ledger, StoreError> {
        check_component("ledger name", name)?;
        if self.get_raw(LEDGERS_CF, name.as_bytes())?.is_some() {
            return Err(StoreError::LedgerExists);
        }
        let ledger = Ledger {
            number: self.next_seq(),
            name: name.to_string(),
            public,
            chained,
            created_at: now_secs(),
        };
        batch.put_unique(
            LEDGERS_CF,
            name.as_bytes().to_vec(),
            serde_json::to_vec(&ledger)?,
            StoreError::LedgerExists,
        )?;
        Ok(ledger)
    }

    fn load_tx(&self, ledger: &str, id: &str) -> Result<Option<Transaction>, StoreError> {
        self.get_raw(TRANSACTIONS_CF, &composite_key(&[ledger.as_bytes(), id.as_bytes()]))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }
}

impl StoreController for CocoonDB {
    fn init(&self) -> Result<(), StoreError> {
        let ledgers = [
            (self.inner.config.system_public_ledger.clone(), true),
            (self.inner.config.system_private_ledger.clone(), false),
        ];
        for (name, public) in ledgers {
            match self.create_ledger(&name, false, public) {
                Ok(_) => info!("system ledger {} created", name),
                Err(StoreError::LedgerExists) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn create_ledger(&self, name: &str, chained: bool, public: bool) -> Result<Ledger, StoreError> {
        self.create_ledger_then(name, chained, public, &mut |_| Ok(()))
    }

    fn create_ledger_then(
        &self,
        name: &str,
        chained: bool,
        public: bool,
        then: LedgerHook<'_>,
    ) -> Result<Ledger, StoreError> {
        let mut batch = StoreBatch::new();
        let ledger = self.stage_ledger(&mut batch, name, chained, public)?;
        then(&mut batch)?;
        self.commit(batch)?;
        cocoon_trace!("store.create_ledger", { "name": name, "chained": chained });
        Ok(ledger)
    }

    fn get_ledger(&self, name: &str) -> Result<Option<Ledger>, StoreError> {
        self.get_raw(LEDGERS_CF, name.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn put(&self, ledger: &str, txs: Vec<Transaction>) -> Result<Vec<TxReceipt>, StoreError> {
        self.put_then(ledger, txs, &mut |_, _| Ok(()))
    }

    fn put_then(
        &self,
        ledger: &str,
        txs: Vec<Transaction>,
        then: PutHook<'_>,
    ) -> Result<Vec<TxReceipt>, StoreError> {
        if txs.is_empty() {
            return Err(StoreError::NoTransactions);
        }
        check_component("ledger name", ledger)?;
        for tx in &txs {
            check_component("transaction key", &tx.key)?;
        }
        if self.get_ledger(ledger)?.is_none() {
            return Err(StoreError::LedgerNotFound);
        }

        let mut batch = StoreBatch::new();
        let mut receipts = Vec::with_capacity(txs.len());
        let mut stored = Vec::with_capacity(txs.len());
        let mut seen: HashSet<String> = HashSet::new();
        let now = now_secs();
        for mut tx in txs {
            if tx.id.is_empty() {
                receipts.push(TxReceipt {
                    id: tx.id,
                    err: "transaction id is required".to_string(),
                });
                continue;
            }
            if seen.contains(&tx.id) || self.get_raw(TX_IDS_CF, tx.id.as_bytes())?.is_some() {
                receipts.push(TxReceipt {
                    id: tx.id,
                    err: DUPLICATE_TX_ID_ERROR.to_string(),
                });
                continue;
            }
            seen.insert(tx.id.clone());

            tx.ledger = ledger.to_string();
            tx.block = None;
            if tx.created_at == 0 {
                tx.created_at = now;
            }
            tx.hash = tx.make_hash();
            tx.number = self.next_seq();

            batch.put(
                TRANSACTIONS_CF,
                composite_key(&[ledger.as_bytes(), tx.id.as_bytes()]),
                serde_json::to_vec(&tx)?,
            );
            batch.put_unique(
                TX_IDS_CF,
                tx.id.as_bytes().to_vec(),
                ledger.as_bytes().to_vec(),
                StoreError::DuplicateTxId,
            )?;
            batch.put(
                TX_KEYS_CF,
                composite_key(&[
                    ledger.as_bytes(),
                    tx.key.as_bytes(),
                    &version_suffix(tx.created_at, tx.number),
                ]),
                tx.id.as_bytes().to_vec(),
            );
            receipts.push(TxReceipt {
                id: tx.id.clone(),
                err: String::new(),
            });
            stored.push(tx);
        }

        if !stored.is_empty() {
            then(&mut batch, &stored)?;
        }
        self.commit(batch)?;
        cocoon_trace!("store.put", { "ledger": ledger, "stored": stored.len() });
        Ok(receipts)
    }

    fn get(&self, ledger: &str, key: &str) -> Result<Option<Transaction>, StoreError> {
        check_component("ledger name", ledger)?;
        check_component("transaction key", key)?;
        let mut prefix = composite_key(&[ledger.as_bytes(), key.as_bytes()]);
        prefix.push(KEY_SEPARATOR);
        match self.last_with_prefix(TX_KEYS_CF, &prefix, 16)? {
            Some(id) => self.load_tx(ledger, &String::from_utf8_lossy(&id)),
            None => Ok(None),
        }
    }

    fn get_by_id(&self, ledger: &str, id: &str) -> Result<Option<Transaction>, StoreError> {
        self.load_tx(ledger, id)
    }

    fn get_range(&self, ledger: &str, query: &RangeQuery) -> Result<Vec<Transaction>, StoreError> {
        check_component("ledger name", ledger)?;
        let mut prefix = ledger.as_bytes().to_vec();
        prefix.push(KEY_SEPARATOR);

        // later versions overwrite earlier ones
        let mut latest: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        for (raw_key, id) in self.scan_prefix(TX_KEYS_CF, &prefix)? {
            let rest = &raw_key[prefix.len()..];
            let key_end = rest
                .iter()
                .position(|b| *b == KEY_SEPARATOR)
                .unwrap_or(rest.len());
            latest.insert(String::from_utf8_lossy(&rest[..key_end]).into_owned(), id);
        }

        let limit = if query.limit == 0 { usize::MAX } else { query.limit };
        latest
            .into_iter()
            .filter(|(key, _)| matches_range(key, query))
            .skip(query.offset)
            .take(limit)
            .filter_map(|(_, id)| {
                self.load_tx(ledger, &String::from_utf8_lossy(&id))
                    .transpose()
            })
            .collect()
    }

    fn clone_box(&self) -> Box<dyn StoreController> {
        Box::new(self.clone())
    }
}

impl BlockchainController for CocoonDB {
    fn create_chain(&self, name: &str, public: bool) -> Result<Chain, StoreError> {
        let mut batch = StoreBatch::new();
        let chain = self.stage_chain(&mut batch, name, public)?;
        self.commit(batch)?;
        Ok(chain)
    }

    fn stage_chain(&self, batch: &mut StoreBatch, name: &str, public: bool) -> Result<Chain, StoreError> {
        check_component("chain name", name)?;
        if self.get_raw(CHAINS_CF, name.as_bytes())?.is_some() {
            return Err(StoreError::ChainExists);
        }
        let chain = Chain {
            number: self.next_seq(),
            name: name.to_string(),
            public,
            created_at: now_secs(),
        };
        batch.put_unique(
            CHAINS_CF,
            name.as_bytes().to_vec(),
            serde_json::to_vec(&chain)?,
            StoreError::ChainExists,
        )?;
        Ok(chain)
    }

    fn get_chain(&self, name: &str) -> Result<Option<Chain>, StoreError> {
        self.get_raw(CHAINS_CF, name.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn create_block(&self, id: &str, chain_name: &str, txs: &[Transaction]) -> Result<Block, StoreError> {
        let mut batch = StoreBatch::new();
        let block = self.stage_block(&mut batch, id, chain_name, txs)?;
        self.commit(batch)?;
        Ok(block)
    }

    fn stage_block(
        &self,
        batch: &mut StoreBatch,
        id: &str,
        chain_name: &str,
        txs: &[Transaction],
    ) -> Result<Block, StoreError> {
        if txs.is_empty() {
            return Err(StoreError::NoTransactions);
        }
        if let Some(bad) = txs.iter().find(|tx| !tx.has_valid_hash()) {
            return Err(StoreError::InvalidBlockTransaction(bad.id.clone()));
        }
        if batch.get(CHAINS_CF, chain_name.as_bytes()).is_none()
            && self.get_chain(chain_name)?.is_none()
        {
            return Err(StoreError::ChainNotFound);
        }

        let (number, prev_block_hash) = match self.get_tip(chain_name)? {
            Some(tip) => (tip.number + 1, tip.hash),
            None => (1, genesis_hash(chain_name)),
        };
        let block = Block {
            id: id.to_string(),
            number,
            chain_name: chain_name.to_string(),
            prev_block_hash,
            hash: make_txs_hash(txs),
            transactions: serde_json::to_vec(txs)?,
            created_at: now_secs(),
        };

        batch.put(
            BLOCKS_CF,
            composite_key(&[chain_name.as_bytes(), id.as_bytes()]),
            serde_json::to_vec(&block)?,
        );
        batch.put_unique(
            BLOCK_NUMBERS_CF,
            composite_key(&[chain_name.as_bytes(), &number.to_be_bytes()]),
            id.as_bytes().to_vec(),
            StoreError::DuplicatePrevBlockHash,
        )?;
        batch.put_unique(
            BLOCK_PREV_HASHES_CF,
            composite_key(&[chain_name.as_bytes(), block.prev_block_hash.as_bytes()]),
            id.as_bytes().to_vec(),
            StoreError::DuplicatePrevBlockHash,
        )?;
        cocoon_trace!("store.stage_block", { "chain": chain_name, "number": number });
        Ok(block)
    }

    fn get_block(&self, chain_name: &str, id: &str) -> Result<Option<Block>, StoreError> {
        self.get_raw(BLOCKS_CF, &composite_key(&[chain_name.as_bytes(), id.as_bytes()]))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn get_tip(&self, chain_name: &str) -> Result<Option<Block>, StoreError> {
        let mut prefix = chain_name.as_bytes().to_vec();
        prefix.push(KEY_SEPARATOR);
        match self.last_with_prefix(BLOCK_NUMBERS_CF, &prefix, 8)? {
            Some(id) => self.get_block(chain_name, &String::from_utf8_lossy(&id)),
            None => Ok(None),
        }
    }

    fn clone_box(&self) -> Box<dyn BlockchainController> {
        Box::new(self.clone())
    }
}
