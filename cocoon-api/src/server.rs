// Copyright (c) 2023 The Cocoon Authors

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::service::ApiService;
use cocoon_orderer_worker::StopHandle;
use cocoon_proto::api::api_server::{Api, ApiServer};
use cocoon_proto::api::{
    AddVoteRequest, CocoonPayloadRequest, CreateIdentityRequest, DeployRequest,
    GetCocoonRequest, GetIdentityRequest, GetReleaseRequest, LoginRequest,
    Response as ApiResponse, SignatoriesRequest, StopCocoonRequest,
};
use cocoon_proto::FILE_DESCRIPTOR_SET;
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::json;
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Request, Response, Status};
use tracing::{error, info};

const STATUS_OK: i32 = 200;

fn json_response<T: Serialize>(body: &T) -> Result<Response<ApiResponse>, Status> {
    let body = serde_json::to_vec(body)
        .map_err(|e| Status::from(ApiError::MalformedPayload("response", e.to_string())))?;
    Ok(Response::new(ApiResponse {
        status: STATUS_OK,
        body,
    }))
}

fn raw_response(body: impl Into<Vec<u8>>) -> Response<ApiResponse> {
    Response::new(ApiResponse {
        status: STATUS_OK,
        body: body.into(),
    })
}

/// gRPC front end of the platform API
pub struct ApiGrpc {
    /// service handling the calls
    pub service: ApiService,
}

impl ApiGrpc {
    /// Front end of `service`
    pub fn new(service: ApiService) -> Self {
        ApiGrpc { service }
    }

    /// Binds `config.bind` and serves until the returned handle is stopped
    pub async fn serve(self, config: &ApiConfig) -> Result<StopHandle, ApiError> {
        let (shutdown_send, shutdown_recv) = oneshot::channel::<()>();

        let reflection_service_opt = if config.enable_reflection {
            Some(
                tonic_reflection::server::Builder::configure()
                    .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
                    .build_v1()
                    .map_err(|e| ApiError::ReflectionError(e.to_string()))?,
            )
        } else {
            None
        };

        let health_service_opt = if config.enable_health {
            let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
            health_reporter.set_serving::<ApiServer<ApiGrpc>>().await;
            Some(health_service)
        } else {
            None
        };

        let listener = tokio::net::TcpListener::bind(config.bind)
            .await
            .map_err(|e| ApiError::BindError(format!("{}: {}", config.bind, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ApiError::BindError(e.to_string()))?;

        let router = tonic::transport::Server::builder()
            .timeout(config.request_timeout)
            .add_optional_service(reflection_service_opt)
            .add_optional_service(health_service_opt)
            .add_service(ApiServer::new(self));

        tokio::spawn(async move {
            if let Err(err) = router
                .serve_with_incoming_shutdown(
                    TcpListenerStream::new(listener),
                    shutdown_recv.map(drop),
                )
                .await
            {
                error!("api gRPC server stopped: {}", err);
            }
        });
        info!("api gRPC server listening on {}", local_addr);

        Ok(StopHandle::new(shutdown_send, local_addr))
    }
}

#[tonic::async_trait]
impl Api for ApiGrpc {
    async fn create_identity(
        &self,
        request: Request<CreateIdentityRequest>,
    ) -> Result<Response<ApiResponse>, Status> {
        let params = request.into_inner();
        let id = self
            .service
            .create_identity(&params.email, &params.password)
            .await?;
        json_response(&json!({ "id": id }))
    }

    async fn get_identity(
        &self,
        request: Request<GetIdentityRequest>,
    ) -> Result<Response<ApiResponse>, Status> {
        let params = request.into_inner();
        let identity = self.service.get_identity(&params.email, &params.id).await?;
        json_response(&identity)
    }

    async fn login(&self, request: Request<LoginRequest>) -> Result<Response<ApiResponse>, Status> {
        let params = request.into_inner();
        let token = self.service.login(&params.email, &params.password).await?;
        Ok(raw_response(token))
    }

    async fn create_cocoon(
        &self,
        request: Request<CocoonPayloadRequest>,
    ) -> Result<Response<ApiResponse>, Status> {
        let claims = self.service.authenticate(request.metadata())?;
        let params = request.into_inner();
        let cocoon = self.service.create_cocoon(&claims, &params.payload).await?;
        json_response(&cocoon)
    }

    async fn update_cocoon(
        &self,
        request: Request<CocoonPayloadRequest>,
    ) -> Result<Response<ApiResponse>, Status> {
        let claims = self.service.authenticate(request.metadata())?;
        let params = request.into_inner();
        let outcome = self
            .service
            .update_cocoon(&claims, &params.id, &params.payload)
            .await?;
        json_response(&outcome)
    }

    async fn get_cocoon(
        &self,
        request: Request<GetCocoonRequest>,
    ) -> Result<Response<ApiResponse>, Status> {
        let cocoon = self.service.get_cocoon(&request.into_inner().id).await?;
        json_response(&cocoon)
    }

    async fn get_release(
        &self,
        request: Request<GetReleaseRequest>,
    ) -> Result<Response<ApiResponse>, Status> {
        let release = self.service.get_release(&request.into_inner().id).await?;
        json_response(&release)
    }

    async fn add_signatories(
        &self,
        request: Request<SignatoriesRequest>,
    ) -> Result<Response<ApiResponse>, Status> {
        let claims = self.service.authenticate(request.metadata())?;
        let params = request.into_inner();
        let outcome = self
            .service
            .add_signatories(&claims, &params.cocoon_id, &params.ids)
            .await?;
        json_response(&outcome)
    }

    async fn remove_signatories(
        &self,
        request: Request<SignatoriesRequest>,
    ) -> Result<Response<ApiResponse>, Status> {
        let claims = self.service.authenticate(request.metadata())?;
        let params = request.into_inner();
        let removed = self
            .service
            .remove_signatories(&claims, &params.cocoon_id, &params.ids)
            .await?;
        json_response(&json!({ "removed": removed }))
    }

    async fn add_vote(
        &self,
        request: Request<AddVoteRequest>,
    ) -> Result<Response<ApiResponse>, Status> {
        let claims = self.service.authenticate(request.metadata())?;
        let params = request.into_inner();
        let outcome = self
            .service
            .add_vote(&claims, &params.release_id, &params.vote, &params.cocoon_id)
            .await?;
        json_response(&outcome)
    }

    async fn deploy(&self, request: Request<DeployRequest>) -> Result<Response<ApiResponse>, Status> {
        let claims = self.service.authenticate(request.metadata())?;
        let job_id = self
            .service
            .deploy(&claims, &request.into_inner().cocoon_id)
            .await?;
        Ok(raw_response(job_id))
    }

    async fn stop_cocoon(
        &self,
        request: Request<StopCocoonRequest>,
    ) -> Result<Response<ApiResponse>, Status> {
        let claims = self.service.authenticate(request.metadata())?;
        self.service
            .stop_cocoon(&claims, &request.into_inner().id)
            .await?;
        Ok(raw_response("done"))
    }
}
