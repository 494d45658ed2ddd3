// Copyright (c) 2023 The Cocoon Authors

use crate::cocoon_code::CocoonCodeClient;
use cocoon_lock_exports::{validate_ttl, LockController};
use cocoon_logging::cocoon_trace;
use cocoon_models::acl::{system_acl, Interpreter, Operation};
use cocoon_models::naming::{make_lock_key, SYSTEM_COCOON_ID, SYSTEM_PUBLIC_LEDGER};
use cocoon_models::CocoonError;
use cocoon_platform::Platform;
use cocoon_proto::connector::connector_server::Connector as ConnectorService;
use cocoon_proto::connector::{
    CreateLedgerRequest, GetBlockRequest, GetByIdRequest, GetLedgerRequest, GetRangeRequest,
    GetRequest, InvokeRequest, InvokeResponse, LockRequest, LockResponse, PutRequest,
};
use cocoon_proto::stub::InvokeParams;
use cocoon_proto::types as grpc;
use cocoon_store_exports::RangeQuery;
use std::time::Duration;
use tonic::{Request, Response, Status};
use tracing::debug;

/// Serves the operations of a cocoon, checking links and access control
/// before reaching the orderer, the lock backend or the cocoon code
#[derive(Clone)]
pub struct ConnectorProxy {
    cocoon_id: String,
    link: String,
    platform: Platform,
    locks: Box<dyn LockController>,
    code: Box<dyn CocoonCodeClient>,
}

impl ConnectorProxy {
    /// Proxy of `cocoon_id`, natively linked to `link` when not empty
    pub fn new(
        cocoon_id: &str,
        link: &str,
        platform: Platform,
        locks: Box<dyn LockController>,
        code: Box<dyn CocoonCodeClient>,
    ) -> Self {
        ConnectorProxy {
            cocoon_id: cocoon_id.to_string(),
            link: link.to_string(),
            platform,
            locks,
            code,
        }
    }

    /// Id of the served cocoon
    pub fn cocoon_id(&self) -> &str {
        &self.cocoon_id
    }

    /// Empty `link_to` targets the served cocoon
    fn target<'a>(&'a self, link_to: &'a str) -> &'a str {
        if link_to.is_empty() {
            &self.cocoon_id
        } else {
            link_to
        }
    }

    /// A cocoon reaches its own resources, those of the cocoon it is natively
    /// linked to and, read only, those of the system cocoon
    pub fn check_link(&self, link_to: &str, op: Operation) -> Result<(), CocoonError> {
        if link_to == self.cocoon_id || (!self.link.is_empty() && link_to == self.link) {
            return Ok(());
        }
        if link_to == SYSTEM_COCOON_ID {
            if matches!(op, Operation::CreateLedger | Operation::Put) {
                return Err(CocoonError::PermissionDenied(format!(
                    "{} operation not allowed on system ledgers",
                    op.as_str()
                )));
            }
            return Ok(());
        }
        Err(CocoonError::PermissionDenied(format!(
            "cocoon ({}) is not natively linked to ({})",
            self.cocoon_id, link_to
        )))
    }

    /// Access control of the target cocoon. The served cocoon is not subject
    /// to its own rules.
    pub async fn check_acl(&self, link_to: &str, ledger: &str, op: Operation) -> Result<(), CocoonError> {
        if link_to == self.cocoon_id {
            return Ok(());
        }

        let allowed = if link_to == SYSTEM_COCOON_ID {
            let acl = system_acl();
            Interpreter::new(&acl, ledger == SYSTEM_PUBLIC_LEDGER).is_allowed(ledger, &self.cocoon_id, op)
        } else {
            let linked = self.platform.get_cocoon(link_to).await.map_err(CocoonError::from)?;
            let default_policy = match self.platform.orderer().get_ledger(link_to, ledger).await {
                Ok(l) => l.public,
                // ledgers to be created are private until a rule says otherwise
                Err(CocoonError::LedgerNotFound) if op == Operation::CreateLedger => false,
                Err(err) => return Err(err),
            };
            let interpreter = Interpreter::new(&linked.acl, default_policy);
            interpreter.check()?;
            interpreter.is_allowed(ledger, &self.cocoon_id, op)
        };

        cocoon_trace!("connector.acl", {
            "actor": self.cocoon_id,
            "link_to": link_to,
            "ledger": ledger,
            "op": op.as_str(),
            "allowed": allowed
        });
        if !allowed {
            return Err(CocoonError::PermissionDenied(format!(
                "{} operation not allowed",
                op.as_str()
            )));
        }
        Ok(())
    }

    async fn authorize<'a>(&'a self, link_to: &'a str, ledger: &str, op: Operation) -> Result<&'a str, CocoonError> {
        let link_to = self.target(link_to);
        self.check_link(link_to, op)?;
        self.check_acl(link_to, ledger, op).await?;
        Ok(link_to)
    }

    /// Lock keys of the system cocoon starting with `_` are reserved
    pub fn check_lock(&self, link_to: &str, key: &str) -> Result<(), CocoonError> {
        if key.trim().is_empty() {
            return Err(CocoonError::InvalidArgument("lock key is required".into()));
        }
        if link_to == SYSTEM_COCOON_ID {
            if key.starts_with('_') {
                return Err(CocoonError::PermissionDenied(
                    "lock keys starting with `_` are reserved".into(),
                ));
            }
            return Ok(());
        }
        self.check_link(link_to, Operation::Get)
    }
}

#[tonic::async_trait]
impl ConnectorService for ConnectorProxy {
    async fn create_ledger(
        &self,
        request: Request<CreateLedgerRequest>,
    ) -> Result<Response<grpc::Ledger>, Status> {
        let req = request.into_inner();
        let link_to = self
            .authorize(&req.link_to, &req.name, Operation::CreateLedger)
            .await?;
        let ledger = self
            .platform
            .orderer()
            .create_ledger(link_to, &req.name, req.chained, req.public)
            .await?;
        Ok(Response::new(ledger.into()))
    }

    async fn get_ledger(
        &self,
        request: Request<GetLedgerRequest>,
    ) -> Result<Response<grpc::Ledger>, Status> {
        let req = request.into_inner();
        let link_to = self.authorize(&req.link_to, &req.name, Operation::GetLedger).await?;
        let ledger = self.platform.orderer().get_ledger(link_to, &req.name).await?;
        Ok(Response::new(ledger.into()))
    }

    async fn put(&self, request: Request<PutRequest>) -> Result<Response<grpc::PutResult>, Status> {
        let req = request.into_inner();
        if req.transactions.is_empty() {
            return Err(CocoonError::InvalidArgument("no transactions provided".into()).into());
        }
        let link_to = self.authorize(&req.link_to, &req.ledger, Operation::Put).await?;
        let txs = req.transactions.into_iter().map(Into::into).collect();
        let result = self.platform.orderer().put(link_to, &req.ledger, txs).await?;
        Ok(Response::new(result.into()))
    }

    async fn get(&self, request: Request<GetRequest>) -> Result<Response<grpc::Transaction>, Status> {
        let req = request.into_inner();
        let link_to = self.authorize(&req.link_to, &req.ledger, Operation::Get).await?;
        let tx = self.platform.orderer().get(link_to, &req.ledger, &req.key).await?;
        Ok(Response::new(tx.into()))
    }

    async fn get_by_id(
        &self,
        request: Request<GetByIdRequest>,
    ) -> Result<Response<grpc::Transaction>, Status> {
        let req = request.into_inner();
        let link_to = self.authorize(&req.link_to, &req.ledger, Operation::GetById).await?;
        let tx = self
            .platform
            .orderer()
            .get_by_id(link_to, &req.ledger, &req.id)
            .await?;
        Ok(Response::new(tx.into()))
    }

    async fn get_block(
        &self,
        request: Request<GetBlockRequest>,
    ) -> Result<Response<grpc::Block>, Status> {
        let req = request.into_inner();
        let link_to = self
            .authorize(&req.link_to, &req.ledger, Operation::GetBlockById)
            .await?;
        let block = self
            .platform
            .orderer()
            .get_block_by_id(link_to, &req.ledger, &req.id)
            .await?;
        Ok(Response::new(block.into()))
    }

    async fn get_range(
        &self,
        request: Request<GetRangeRequest>,
    ) -> Result<Response<grpc::Transactions>, Status> {
        let req = request.into_inner();
        let link_to = self.authorize(&req.link_to, &req.ledger, Operation::RangeGet).await?;
        let query = RangeQuery {
            start: req.start_key,
            end: req.end_key,
            inclusive: req.inclusive,
            limit: req.limit as usize,
            offset: req.offset as usize,
        };
        let txs = self
            .platform
            .orderer()
            .get_range(link_to, &req.ledger, query)
            .await?;
        Ok(Response::new(txs.into()))
    }

    async fn acquire_lock(
        &self,
        request: Request<LockRequest>,
    ) -> Result<Response<LockResponse>, Status> {
        let req = request.into_inner();
        let link_to = self.target(&req.link_to);
        self.check_lock(link_to, &req.key)?;
        let ttl = Duration::from_secs(u64::from(req.ttl));
        validate_ttl(ttl).map_err(CocoonError::from)?;
        let session = self
            .locks
            .acquire(&make_lock_key(link_to, &req.key), ttl, &req.session)
            .await
            .map_err(CocoonError::from)?;
        debug!("lock {} acquired by {}", req.key, self.cocoon_id);
        Ok(Response::new(LockResponse { session }))
    }

    async fn is_lock_acquirer(
        &self,
        request: Request<LockRequest>,
    ) -> Result<Response<grpc::Void>, Status> {
        let req = request.into_inner();
        let link_to = self.target(&req.link_to);
        self.check_lock(link_to, &req.key)?;
        self.locks
            .is_acquirer(&make_lock_key(link_to, &req.key), &req.session)
            .await
            .map_err(CocoonError::from)?;
        Ok(Response::new(grpc::Void {}))
    }

    async fn release_lock(
        &self,
        request: Request<LockRequest>,
    ) -> Result<Response<grpc::Void>, Status> {
        let req = request.into_inner();
        let link_to = self.target(&req.link_to);
        self.check_lock(link_to, &req.key)?;
        self.locks
            .release(&make_lock_key(link_to, &req.key), &req.session)
            .await
            .map_err(CocoonError::from)?;
        Ok(Response::new(grpc::Void {}))
    }

    async fn invoke(
        &self,
        request: Request<InvokeRequest>,
    ) -> Result<Response<InvokeResponse>, Status> {
        let req = request.into_inner();
        let resp = self
            .code
            .invoke(InvokeParams {
                id: req.id,
                header: req.header,
                function: req.function,
                params: req.params,
            })
            .await?;
        Ok(Response::new(InvokeResponse {
            id: resp.id,
            status: resp.status,
            body: resp.body,
        }))
    }
}
