// Copyright (c) 2023 The Cocoon Authors

use cocoon_models::CocoonError;
use cocoon_proto::stub::stub_client::StubClient;
use cocoon_proto::stub::{InvokeParams, InvokeResponse};
use cocoon_proto::types::Void;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};

/// Calls of the connector to the stub service of its cocoon code
#[cfg_attr(any(test, feature = "test-exports"), mockall::automock)]
#[async_trait::async_trait]
pub trait CocoonCodeClient: Send + Sync {
    /// Health check bounded by `timeout`
    async fn health_check(&self, timeout: Duration) -> Result<(), CocoonError>;

    /// Forwards an invoke request
    async fn invoke(&self, params: InvokeParams) -> Result<InvokeResponse, CocoonError>;

    /// Asks the code to stop
    async fn stop(&self) -> Result<(), CocoonError>;

    /// Clones the client in a box
    fn clone_box(&self) -> Box<dyn CocoonCodeClient>;
}

impl Clone for Box<dyn CocoonCodeClient> {
    fn clone(&self) -> Box<dyn CocoonCodeClient> {
        self.clone_box()
    }
}

/// gRPC client of the stub service
#[derive(Debug, Clone)]
pub struct GrpcCocoonCodeClient {
    addr: String,
    timeout: Duration,
}

impl GrpcCocoonCodeClient {
    /// Client of the stub at `addr`; `timeout` bounds invoke and stop
    pub fn new(addr: &str, timeout: Duration) -> Self {
        let addr = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.to_string()
        } else {
            format!("http://{}", addr)
        };
        GrpcCocoonCodeClient { addr, timeout }
    }

    async fn connect(&self, timeout: Duration) -> Result<StubClient<Channel>, CocoonError> {
        let channel = Endpoint::from_shared(self.addr.clone())
            .map_err(|e| CocoonError::Internal(format!("invalid cocoon code address: {}", e)))?
            .timeout(timeout)
            .connect_timeout(timeout)
            .connect()
            .await
            .map_err(|e| CocoonError::Internal(format!("failed to connect to cocoon code: {}", e)))?;
        Ok(StubClient::new(channel))
    }
}

#[async_trait::async_trait]
impl CocoonCodeClient for GrpcCocoonCodeClient {
    async fn health_check(&self, timeout: Duration) -> Result<(), CocoonError> {
        let ok = self
            .connect(timeout)
            .await?
            .health_check(Void {})
            .await?
            .into_inner();
        if ok.status != 200 {
            return Err(CocoonError::Internal(format!(
                "unexpected health status {}",
                ok.status
            )));
        }
        Ok(())
    }

    async fn invoke(&self, params: InvokeParams) -> Result<InvokeResponse, CocoonError> {
        Ok(self
            .connect(self.timeout)
            .await?
            .invoke(params)
            .await?
            .into_inner())
    }

    async fn stop(&self) -> Result<(), CocoonError> {
        self.connect(self.timeout).await?.stop(Void {}).await?;
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn CocoonCodeClient> {
        Box::new(self.clone())
    }
}
