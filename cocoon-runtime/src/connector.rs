// Copyright (c) 2023 The Cocoon Authors

use cocoon_models::block::Block;
use cocoon_models::ledger::{Ledger, PutResult, Transaction};
use cocoon_models::CocoonError;
use cocoon_proto::connector::connector_client::ConnectorClient as ConnectorServiceClient;
use cocoon_proto::connector::{
    CreateLedgerRequest, GetBlockRequest, GetByIdRequest, GetLedgerRequest, GetRangeRequest,
    GetRequest, LockRequest, PutRequest,
};
use cocoon_proto::types as grpc;
use cocoon_store_exports::RangeQuery;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};

/// Operations the connector serves to its cocoon. `link_to` is the cocoon
/// owning the target resources.
#[cfg_attr(any(test, feature = "test-exports"), mockall::automock)]
#[async_trait::async_trait]
pub trait ConnectorClient: Send + Sync {
    /// Creates a ledger
    async fn create_ledger(
        &self,
        link_to: &str,
        name: &str,
        chained: bool,
        public: bool,
    ) -> Result<Ledger, CocoonError>;

    /// Reads a ledger
    async fn get_ledger(&self, link_to: &str, name: &str) -> Result<Ledger, CocoonError>;

    /// Stores transactions of one ledger
    async fn put(
        &self,
        link_to: &str,
        ledger: &str,
        txs: Vec<Transaction>,
    ) -> Result<PutResult, CocoonError>;

    /// Latest version of a key
    async fn get(&self, link_to: &str, ledger: &str, key: &str) -> Result<Transaction, CocoonError>;

    /// Transaction by id
    async fn get_by_id(&self, link_to: &str, ledger: &str, id: &str) -> Result<Transaction, CocoonError>;

    /// Block by id
    async fn get_block(&self, link_to: &str, ledger: &str, id: &str) -> Result<Block, CocoonError>;

    /// One page of a range
    async fn get_range(
        &self,
        link_to: &str,
        ledger: &str,
        query: RangeQuery,
    ) -> Result<Vec<Transaction>, CocoonError>;

    /// Acquires a lock, returns the holding session
    async fn acquire_lock(
        &self,
        link_to: &str,
        key: &str,
        ttl: Duration,
        session: &str,
    ) -> Result<String, CocoonError>;

    /// `Ok` when `session` holds the lock
    async fn is_lock_acquirer(&self, link_to: &str, key: &str, session: &str) -> Result<(), CocoonError>;

    /// Releases a lock held by `session`
    async fn release_lock(&self, link_to: &str, key: &str, session: &str) -> Result<(), CocoonError>;

    /// Returns a boxed clone of self.
    /// Allows cloning `Box<dyn ConnectorClient>`,
    fn clone_box(&self) -> Box<dyn ConnectorClient>;
}

impl Clone for Box<dyn ConnectorClient> {
    fn clone(&self) -> Box<dyn ConnectorClient> {
        self.clone_box()
    }
}

/// Reaches the connector service over gRPC, one connection per call
#[derive(Debug, Clone)]
pub struct GrpcConnectorClient {
    addr: String,
    timeout: Duration,
}

impl GrpcConnectorClient {
    /// Client of the connector at `addr`; `timeout` bounds every call
    pub fn new(addr: &str, timeout: Duration) -> Self {
        let addr = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.to_string()
        } else {
            format!("http://{}", addr)
        };
        GrpcConnectorClient { addr, timeout }
    }

    async fn connect(&self) -> Result<ConnectorServiceClient<Channel>, CocoonError> {
        let channel = Endpoint::from_shared(self.addr.clone())
            .map_err(|e| CocoonError::Internal(format!("invalid connector address: {}", e)))?
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .connect()
            .await
            .map_err(|e| CocoonError::Internal(format!("failed to connect to connector: {}", e)))?;
        Ok(ConnectorServiceClient::new(channel))
    }
}

#[async_trait::async_trait]
impl ConnectorClient for GrpcConnectorClient {
    async fn create_ledger(
        &self,
        link_to: &str,
        name: &str,
        chained: bool,
        public: bool,
    ) -> Result<Ledger, CocoonError> {
        let ledger = self
            .connect()
            .await?
            .create_ledger(CreateLedgerRequest {
                link_to: link_to.to_string(),
                name: name.to_string(),
                chained,
                public,
            })
            .await?
            .into_inner();
        Ok(ledger.into())
    }

    async fn get_ledger(&self, link_to: &str, name: &str) -> Result<Ledger, CocoonError> {
        let ledger = self
            .connect()
            .await?
            .get_ledger(GetLedgerRequest {
                link_to: link_to.to_string(),
                name: name.to_string(),
            })
            .await?
            .into_inner();
        Ok(ledger.into())
    }

    async fn put(
        &self,
        link_to: &str,
        ledger: &str,
        txs: Vec<Transaction>,
    ) -> Result<PutResult, CocoonError> {
        let result = self
            .connect()
            .await?
            .put(PutRequest {
                link_to: link_to.to_string(),
                ledger: ledger.to_string(),
                transactions: txs.into_iter().map(grpc::Transaction::from).collect(),
            })
            .await?
            .into_inner();
        Ok(result.into())
    }

    async fn get(&self, link_to: &str, ledger: &str, key: &str) -> Result<Transaction, CocoonError> {
        let tx = self
            .connect()
            .await?
            .get(GetRequest {
                link_to: link_to.to_string(),
                ledger: ledger.to_string(),
                key: key.to_string(),
            })
            .await?
            .into_inner();
        Ok(tx.into())
    }

    async fn get_by_id(&self, link_to: &str, ledger: &str, id: &str) -> Result<Transaction, CocoonError> {
        let tx = self
            .connect()
            .await?
            .get_by_id(GetByIdRequest {
                link_to: link_to.to_string(),
                ledger: ledger.to_string(),
                id: id.to_string(),
            })
            .await?
            .into_inner();
        Ok(tx.into())
    }

    async fn get_block(&self, link_to: &str, ledger: &str, id: &str) -> Result<Block, CocoonError> {
        let block = self
            .connect()
            .await?
            .get_block(GetBlockRequest {
                link_to: link_to.to_string(),
                ledger: ledger.to_string(),
                id: id.to_string(),
            })
            .await?
            .into_inner();
        Ok(block.into())
    }

    async fn get_range(
        &self,
        link_to: &str,
        ledger: &str,
        query: RangeQuery,
    ) -> Result<Vec<Transaction>, CocoonError> {
        let txs = self
            .connect()
            .await?
            .get_range(GetRangeRequest {
                link_to: link_to.to_string(),
                ledger: ledger.to_string(),
                start_key: query.start,
                end_key: query.end,
                inclusive: query.inclusive,
                limit: query.limit as u32,
                offset: query.offset as u32,
            })
            .await?
            .into_inner();
        Ok(txs.into())
    }

    async fn acquire_lock(
        &self,
        link_to: &str,
        key: &str,
        ttl: Duration,
        session: &str,
    ) -> Result<String, CocoonError> {
        let resp = self
            .connect()
            .await?
            .acquire_lock(LockRequest {
                link_to: link_to.to_string(),
                key: key.to_string(),
                ttl: ttl.as_secs() as u32,
                session: session.to_string(),
            })
            .await?
            .into_inner();
        Ok(resp.session)
    }

    async fn is_lock_acquirer(&self, link_to: &str, key: &str, session: &str) -> Result<(), CocoonError> {
        self.connect()
            .await?
            .is_lock_acquirer(LockRequest {
                link_to: link_to.to_string(),
                key: key.to_string(),
                ttl: 0,
                session: session.to_string(),
            })
            .await?;
        Ok(())
    }

    async fn release_lock(&self, link_to: &str, key: &str, session: &str) -> Result<(), CocoonError> {
        self.connect()
            .await?
            .release_lock(LockRequest {
                link_to: link_to.to_string(),
                key: key.to_string(),
                ttl: 0,
                session: session.to_string(),
            })
            .await?;
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn ConnectorClient> {
        Box::new(self.clone())
    }
}
