// Copyright (c) 2023 The Cocoon Authors

use crate::cocoon_code::{CocoonCode, Invocation};
use crate::link::Link;
use cocoon_models::CocoonError;
use cocoon_proto::stub::stub_server::Stub;
use cocoon_proto::stub::{InvokeParams, InvokeResponse, Ok as HealthStatus};
use cocoon_proto::types::Void;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tonic::{Request, Response, Status};
use tracing::{debug, error, info, warn};

/// Shared by the stub service and the runtime
pub(crate) struct StubState {
    pub code: Arc<dyn CocoonCode>,
    pub link: Link,
    pub running: AtomicBool,
    pub stop_tx: mpsc::UnboundedSender<i32>,
}

/// Stub service called by the connector
pub(crate) struct StubGrpc {
    pub state: Arc<StubState>,
}

#[tonic::async_trait]
impl Stub for StubGrpc {
    async fn health_check(&self, _request: Request<Void>) -> Result<Response<HealthStatus>, Status> {
        debug!("health check");
        Ok(Response::new(HealthStatus { status: 200 }))
    }

    async fn invoke(&self, request: Request<InvokeParams>) -> Result<Response<InvokeResponse>, Status> {
        let params = request.into_inner();
        if !self.state.running.load(Ordering::SeqCst) {
            return Err(CocoonError::CocoonCodeNotRunning.into());
        }

        let call = self.state.code.invoke(
            &self.state.link,
            Invocation {
                tx_id: params.id.clone(),
                function: params.function.clone(),
                params: params.params,
                header: params.header,
            },
        );
        let (status, body) = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(value)) => match serde_json::to_vec(&value) {
                Ok(body) => (200, body),
                Err(e) => {
                    warn!("failed to encode the result of {}: {}", params.function, e);
                    (500, b"failed to encode invoke result".to_vec())
                }
            },
            Ok(Err(e)) => {
                debug!("invoke {} failed: {:?}", params.function, e);
                (500, e.to_string().into_bytes())
            }
            Err(_) => {
                error!("invoke {} panicked", params.function);
                (500, b"failed to complete invoke request".to_vec())
            }
        };
        Ok(Response::new(InvokeResponse {
            id: params.id,
            status,
            body,
        }))
    }

    async fn stop(&self, _request: Request<Void>) -> Result<Response<Void>, Status> {
        info!("stop requested by the connector");
        // the runtime may already be gone
        let _ = self.state.stop_tx.send(0);
        Ok(Response::new(Void {}))
    }
}
