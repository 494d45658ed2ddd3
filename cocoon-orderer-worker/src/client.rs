// Copyright (c) 2023 The Cocoon Authors

use crate::discovery::OrdererDiscovery;
use cocoon_models::block::Block;
use cocoon_models::ledger::{Ledger, PutResult, Transaction};
use cocoon_models::CocoonError;
use cocoon_orderer_exports::{OrdererController, OrdererError};
use cocoon_proto::orderer::orderer_client::OrdererClient as OrdererServiceClient;
use cocoon_proto::orderer::{
    CreateLedgerParams, GetBlockParams, GetLedgerParams, GetParams, GetRangeParams,
    PutTransactionParams,
};
use cocoon_proto::types as grpc;
use cocoon_store_exports::RangeQuery;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

/// Reaches a random discovered orderer on every call
#[derive(Debug, Clone)]
pub struct OrdererClient {
    discovery: OrdererDiscovery,
    timeout: Duration,
}

impl OrdererClient {
    /// Client over `discovery`; `timeout` bounds every call
    pub fn new(discovery: OrdererDiscovery, timeout: Duration) -> Self {
        OrdererClient { discovery, timeout }
    }

    async fn connect(&self) -> Result<OrdererServiceClient<Channel>, CocoonError> {
        let addr = self
            .discovery
            .rand_addr()
            .ok_or_else(|| CocoonError::from(OrdererError::NoOrdererAddress))?;
        let uri = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr
        } else {
            format!("http://{}", addr)
        };
        debug!("dialing orderer at {}", uri);
        let channel = Endpoint::from_shared(uri)
            .map_err(|e| CocoonError::Internal(format!("invalid orderer address: {}", e)))?
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .connect()
            .await
            .map_err(|e| CocoonError::Internal(format!("failed to connect to orderer: {}", e)))?;
        Ok(OrdererServiceClient::new(channel))
    }
}

#[async_trait::async_trait]
impl OrdererController for OrdererClient {
    async fn create_ledger(
        &self,
        cocoon_id: &str,
        name: &str,
        chained: bool,
        public: bool,
    ) -> Result<Ledger, CocoonError> {
        let ledger = self
            .connect()
            .await?
            .create_ledger(CreateLedgerParams {
                cocoon_id: cocoon_id.to_string(),
                name: name.to_string(),
                chained,
                public,
            })
            .await?
            .into_inner();
        Ok(ledger.into())
    }

    async fn get_ledger(&self, cocoon_id: &str, name: &str) -> Result<Ledger, CocoonError> {
        let ledger = self
            .connect()
            .await?
            .get_ledger(GetLedgerParams {
                cocoon_id: cocoon_id.to_string(),
                name: name.to_string(),
            })
            .await?
            .into_inner();
        Ok(ledger.into())
    }

    async fn put(
        &self,
        cocoon_id: &str,
        ledger: &str,
        txs: Vec<Transaction>,
    ) -> Result<PutResult, CocoonError> {
        let result = self
            .connect()
            .await?
            .put(PutTransactionParams {
                cocoon_id: cocoon_id.to_string(),
                ledger_name: ledger.to_string(),
                transactions: txs.into_iter().map(grpc::Transaction::from).collect(),
            })
            .await?
            .into_inner();
        Ok(result.into())
    }

    async fn get(&self, cocoon_id: &str, ledger: &str, key: &str) -> Result<Transaction, CocoonError> {
        let tx = self
            .connect()
            .await?
            .get(GetParams {
                cocoon_id: cocoon_id.to_string(),
                ledger: ledger.to_string(),
                key: key.to_string(),
                id: String::new(),
            })
            .await?
            .into_inner();
        Ok(tx.into())
    }

    async fn get_by_id(&self, cocoon_id: &str, ledger: &str, id: &str) -> Result<Transaction, CocoonError> {
        let tx = self
            .connect()
            .await?
            .get_by_id(GetParams {
                cocoon_id: cocoon_id.to_string(),
                ledger: ledger.to_string(),
                key: String::new(),
                id: id.to_string(),
            })
            .await?
            .into_inner();
        Ok(tx.into())
    }

    async fn get_block_by_id(&self, cocoon_id: &str, ledger: &str, id: &str) -> Result<Block, CocoonError> {
        let block = self
            .connect()
            .await?
            .get_block_by_id(GetBlockParams {
                cocoon_id: cocoon_id.to_string(),
                ledger: ledger.to_string(),
                id: id.to_string(),
            })
            .await?
            .into_inner();
        Ok(block.into())
    }

    async fn get_range(
        &self,
        cocoon_id: &str,
        ledger: &str,
        query: RangeQuery,
    ) -> Result<Vec<Transaction>, CocoonError> {
        let txs = self
            .connect()
            .await?
            .get_range(GetRangeParams {
                cocoon_id: cocoon_id.to_string(),
                ledger: ledger.to_string(),
                start_key: query.start,
                end_key: query.end,
                inclusive: query.inclusive,
                limit: u32::try_from(query.limit).unwrap_or(u32::MAX),
                offset: u32::try_from(query.offset).unwrap_or(u32::MAX),
            })
            .await?
            .into_inner();
        Ok(txs.into())
    }

    fn clone_box(&self) -> Box<dyn OrdererController> {
        Box::new(self.clone())
    }
}
