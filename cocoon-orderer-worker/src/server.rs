// Copyright (c) 2023 The Cocoon Authors

use cocoon_models::CocoonError;
use cocoon_orderer_exports::{OrdererConfig, OrdererController, OrdererError};
use cocoon_proto::orderer::orderer_server::{Orderer as OrdererService, OrdererServer};
use cocoon_proto::orderer::{
    CreateLedgerParams, GetBlockParams, GetLedgerParams, GetParams, GetRangeParams,
    PutTransactionParams,
};
use cocoon_proto::types as grpc;
use cocoon_proto::FILE_DESCRIPTOR_SET;
use cocoon_store_exports::RangeQuery;
use futures_util::FutureExt;
use std::net::SocketAddr;
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Request, Response, Status};
use tracing::{error, info, warn};

/// gRPC front end of an orderer
pub struct OrdererGrpc {
    /// orderer serving the calls
    pub orderer: Box<dyn OrdererController>,
}

impl OrdererGrpc {
    /// Front end of `orderer`
    pub fn new(orderer: Box<dyn OrdererController>) -> Self {
        OrdererGrpc { orderer }
    }

    /// Binds `config.bind` and serves until the returned handle is stopped
    pub async fn serve(self, config: &OrdererConfig) -> Result<StopHandle, OrdererError> {
        let (shutdown_send, shutdown_recv) = oneshot::channel::<()>();

        let reflection_service_opt = if config.enable_reflection {
            Some(
                tonic_reflection::server::Builder::configure()
                    .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
                    .build_v1()
                    .map_err(|e| OrdererError::ReflectionError(e.to_string()))?,
            )
        } else {
            None
        };

        let health_service_opt = if config.enable_health {
            let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
            health_reporter
                .set_serving::<OrdererServer<OrdererGrpc>>()
                .await;
            info!("orderer gRPC health service enabled");
            Some(health_service)
        } else {
            None
        };

        let listener = tokio::net::TcpListener::bind(config.bind)
            .await
            .map_err(|e| OrdererError::BindError(format!("{}: {}", config.bind, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| OrdererError::BindError(e.to_string()))?;

        let router = tonic::transport::Server::builder()
            .timeout(config.request_timeout)
            .add_optional_service(reflection_service_opt)
            .add_optional_service(health_service_opt)
            .add_service(OrdererServer::new(self));

        tokio::spawn(async move {
            if let Err(err) = router
                .serve_with_incoming_shutdown(
                    TcpListenerStream::new(listener),
                    shutdown_recv.map(drop),
                )
                .await
            {
                error!("orderer gRPC server stopped: {}", err);
            }
        });
        info!("orderer gRPC server listening on {}", local_addr);

        Ok(StopHandle {
            stop_cmd_sender: shutdown_send,
            local_addr,
        })
    }
}

/// Used to stop a gRPC server
pub struct StopHandle {
    stop_cmd_sender: oneshot::Sender<()>,
    local_addr: SocketAddr,
}

impl StopHandle {
    /// Builds a handle from a server's shutdown sender
    pub fn new(stop_cmd_sender: oneshot::Sender<()>, local_addr: SocketAddr) -> Self {
        StopHandle {
            stop_cmd_sender,
            local_addr,
        }
    }

    /// Address the server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops the server gracefully
    pub fn stop(self) {
        if let Err(e) = self.stop_cmd_sender.send(()) {
            warn!("gRPC server thread panicked: {:?}", e);
        } else {
            info!("gRPC server stop signal sent successfully");
        }
    }
}

#[tonic::async_trait]
impl OrdererService for OrdererGrpc {
    async fn create_ledger(
        &self,
        request: Request<CreateLedgerParams>,
    ) -> Result<Response<grpc::Ledger>, Status> {
        let params = request.into_inner();
        let ledger = self
            .orderer
            .create_ledger(&params.cocoon_id, &params.name, params.chained, params.public)
            .await?;
        Ok(Response::new(ledger.into()))
    }

    async fn get_ledger(
        &self,
        request: Request<GetLedgerParams>,
    ) -> Result<Response<grpc::Ledger>, Status> {
        let params = request.into_inner();
        let ledger = self.orderer.get_ledger(&params.cocoon_id, &params.name).await?;
        Ok(Response::new(ledger.into()))
    }

    async fn put(
        &self,
        request: Request<PutTransactionParams>,
    ) -> Result<Response<grpc::PutResult>, Status> {
        let params = request.into_inner();
        if params.transactions.is_empty() {
            return Err(CocoonError::InvalidArgument("no transactions provided".into()).into());
        }
        let txs = params.transactions.into_iter().map(Into::into).collect();
        let result = self
            .orderer
            .put(&params.cocoon_id, &params.ledger_name, txs)
            .await?;
        Ok(Response::new(result.into()))
    }

    async fn get(&self, request: Request<GetParams>) -> Result<Response<grpc::Transaction>, Status> {
        let params = request.into_inner();
        let tx = self
            .orderer
            .get(&params.cocoon_id, &params.ledger, &params.key)
            .await?;
        Ok(Response::new(tx.into()))
    }

    async fn get_by_id(
        &self,
        request: Request<GetParams>,
    ) -> Result<Response<grpc::Transaction>, Status> {
        let params = request.into_inner();
        let tx = self
            .orderer
            .get_by_id(&params.cocoon_id, &params.ledger, &params.id)
            .await?;
        Ok(Response::new(tx.into()))
    }

    async fn get_block_by_id(
        &self,
        request: Request<GetBlockParams>,
    ) -> Result<Response<grpc::Block>, Status> {
        let params = request.into_inner();
        let block = self
            .orderer
            .get_block_by_id(&params.cocoon_id, &params.ledger, &params.id)
            .await?;
        Ok(Response::new(block.into()))
    }

    async fn get_range(
        &self,
        request: Request<GetRangeParams>,
    ) -> Result<Response<grpc::Transactions>, Status> {
        let params = request.into_inner();
        let query = RangeQuery {
            start: params.start_key,
            end: params.end_key,
            inclusive: params.inclusive,
            limit: params.limit as usize,
            offset: params.offset as usize,
        };
        let txs = self
            .orderer
            .get_range(&params.cocoon_id, &params.ledger, query)
            .await?;
        Ok(Response::new(txs.into()))
    }
}
