// Copyright (c) 2023 The Cocoon Authors

use crate::types as grpc;
use cocoon_models::block::Block;
use cocoon_models::ledger::{Ledger, PutResult, Transaction, TxReceipt};

impl From<Ledger> for grpc::Ledger {
    fn from(value: Ledger) -> Self {
        grpc::Ledger {
            number: value.number,
            name: value.name,
            public: value.public,
            chained: value.chained,
            created_at: value.created_at,
        }
    }
}

impl From<grpc::Ledger> for Ledger {
    fn from(value: grpc::Ledger) -> Self {
        Ledger {
            number: value.number,
            name: value.name,
            public: value.public,
            chained: value.chained,
            created_at: value.created_at,
        }
    }
}

impl From<Block> for grpc::Block {
    fn from(value: Block) -> Self {
        grpc::Block {
            id: value.id,
            number: value.number,
            chain_name: value.chain_name,
            prev_block_hash: value.prev_block_hash,
            hash: value.hash,
            transactions: value.transactions,
            created_at: value.created_at,
        }
    }
}

impl From<grpc::Block> for Block {
    fn from(value: grpc::Block) -> Self {
        Block {
            id: value.id,
            number: value.number,
            chain_name: value.chain_name,
            prev_block_hash: value.prev_block_hash,
            hash: value.hash,
            transactions: value.transactions,
            created_at: value.created_at,
        }
    }
}

impl From<Transaction> for grpc::Transaction {
    fn from(value: Transaction) -> Self {
        grpc::Transaction {
            number: value.number,
            ledger: value.ledger,
            id: value.id,
            key: value.key,
            value: value.value,
            hash: value.hash,
            block_id: value.block_id,
            created_at: value.created_at,
            block: value.block.map(|b| (*b).into()),
        }
    }
}

impl From<grpc::Transaction> for Transaction {
    fn from(value: grpc::Transaction) -> Self {
        Transaction {
            number: value.number,
            ledger: value.ledger,
            id: value.id,
            key: value.key,
            value: value.value,
            hash: value.hash,
            block_id: value.block_id,
            created_at: value.created_at,
            block: value.block.map(|b| Box::new(b.into())),
        }
    }
}

impl From<Vec<Transaction>> for grpc::Transactions {
    fn from(value: Vec<Transaction>) -> Self {
        grpc::Transactions {
            transactions: value.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<grpc::Transactions> for Vec<Transaction> {
    fn from(value: grpc::Transactions) -> Self {
        value.transactions.into_iter().map(Into::into).collect()
    }
}

impl From<PutResult> for grpc::PutResult {
    fn from(value: PutResult) -> Self {
        grpc::PutResult {
            tx_receipts: value
                .tx_receipts
                .into_iter()
                .map(|r| grpc::TxReceipt { id: r.id, err: r.err })
                .collect(),
            block: value.block.map(Into::into),
        }
    }
}

impl From<grpc::PutResult> for PutResult {
    fn from(value: grpc::PutResult) -> Self {
        PutResult {
            tx_receipts: value
                .tx_receipts
                .into_iter()
                .map(|r| TxReceipt { id: r.id, err: r.err })
                .collect(),
            block: value.block.map(Into::into),
        }
    }
}
