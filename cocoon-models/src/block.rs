// Copyright (c) 2023 The Cocoon Authors

use crate::ledger::Transaction;
use crate::naming::sha256_hex;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A hash-linked group of transactions of a chained ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// `sha256(uuid4)`
    pub id: String,
    /// height within the chain, starting at 1
    pub number: u64,
    /// internal name of the ledger
    pub chain_name: String,
    /// hash of the previous block, or the chain's genesis hash
    pub prev_block_hash: String,
    /// see [`make_txs_hash`]
    pub hash: String,
    /// JSON encoded member transactions
    #[serde(
        rename = "txs",
        default,
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "to_base64",
        deserialize_with = "from_base64"
    )]
    pub transactions: Vec<u8>,
    /// unix seconds
    pub created_at: i64,
}

impl Block {
    /// Decoded member transactions
    pub fn decode_transactions(&self) -> Result<Vec<Transaction>, serde_json::Error> {
        if self.transactions.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&self.transactions)
    }
}

/// A per-ledger chain marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Chain {
    /// position in the store
    #[serde(default)]
    pub number: u64,
    /// internal name of the ledger
    pub name: String,
    /// public flag of the ledger
    #[serde(default)]
    pub public: bool,
    /// unix seconds
    #[serde(default)]
    pub created_at: i64,
}

/// sha256 of the sorted concatenation of the transaction hashes
/// ```
/// # use cocoon_models::{block::make_txs_hash, ledger::Transaction, naming::sha256_hex};
/// let a = Transaction { hash: "b".into(), ..Default::default() };
/// let b = Transaction { hash: "a".into(), ..Default::default() };
/// assert_eq!(make_txs_hash(&[a, b]), sha256_hex("ab"));
/// ```
pub fn make_txs_hash(txs: &[Transaction]) -> String {
    let mut hashes: Vec<&str> = txs.iter().map(|tx| tx.hash.as_str()).collect();
    hashes.sort_unstable();
    sha256_hex(hashes.concat())
}

fn to_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(bytes))
}

fn from_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(deserializer)?;
    BASE64.decode(s).map_err(serde::de::Error::custom)
}
