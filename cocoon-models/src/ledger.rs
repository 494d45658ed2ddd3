// Copyright (c) 2023 The Cocoon Authors

//! Ledgers, transactions and put results.

use crate::block::Block;
use crate::naming::sha256_hex;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

/// A named append-only sequence of transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Ledger {
    /// position in the store
    #[serde(default)]
    pub number: u64,
    /// `<cocoonID>;<name>` in the store, the cocoon's own name in orderer replies
    pub name: String,
    /// readable by linked cocoons without an explicit acl
    #[serde(default)]
    pub public: bool,
    /// whether puts produce blocks
    #[serde(default)]
    pub chained: bool,
    /// unix seconds
    #[serde(default)]
    pub created_at: i64,
}

/// A single ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// position in the store
    #[serde(default, skip_serializing_if = "is_zero")]
    pub number: u64,
    /// ledger name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ledger: String,
    /// uuid
    #[serde(default)]
    pub id: String,
    /// key, internal once it reached the orderer
    #[serde(default)]
    pub key: String,
    /// opaque value
    #[serde(default)]
    pub value: String,
    /// see [`Transaction::make_hash`]
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hash: String,
    /// block holding the transaction, chained ledgers only
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub block_id: String,
    /// unix seconds
    #[serde(default)]
    pub created_at: i64,
    /// populated on reads from chained ledgers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<Box<Block>>,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

impl Transaction {
    /// Builds a fresh transaction with a new id
    pub fn new(ledger: &str, key: &str, value: &str, created_at: i64) -> Self {
        Transaction {
            ledger: ledger.to_string(),
            id: crate::naming::new_uuid(),
            key: key.to_string(),
            value: value.to_string(),
            created_at,
            ..Default::default()
        }
    }

    /// `sha256("<id>;<b64(key)>;<b64(value)>;<createdAt>")`
    pub fn make_hash(&self) -> String {
        sha256_hex(format!(
            "{};{};{};{}",
            self.id,
            BASE64.encode(self.key.as_bytes()),
            BASE64.encode(self.value.as_bytes()),
            self.created_at
        ))
    }

    /// true if the stored hash matches the content
    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.make_hash()
    }
}

/// Outcome of one transaction of a put
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TxReceipt {
    /// transaction id
    #[serde(rename = "ID")]
    pub id: String,
    /// empty on success
    #[serde(rename = "Err", default)]
    pub err: String,
}

/// Result of a put: a receipt per transaction and the block if one was made
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PutResult {
    /// one per input transaction, same order
    #[serde(default)]
    pub tx_receipts: Vec<TxReceipt>,
    /// block created for the stored transactions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<Block>,
}

impl PutResult {
    /// Receipt of a transaction
    pub fn receipt(&self, tx_id: &str) -> Option<&TxReceipt> {
        self.tx_receipts.iter().find(|r| r.id == tx_id)
    }
}
