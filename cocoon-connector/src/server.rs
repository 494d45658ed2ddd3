// Copyright (c) 2023 The Cocoon Authors

use crate::cocoon_code::CocoonCodeClient;
use crate::error::ConnectorError;
use crate::proxy::ConnectorProxy;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use cocoon_orderer_worker::StopHandle;
use cocoon_proto::connector::connector_server::ConnectorServer;
use cocoon_proto::stub::InvokeParams;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tracing::{error, info};

/// Serves the connector service of `proxy` on `bind`
pub async fn serve_connector(
    proxy: ConnectorProxy,
    bind: SocketAddr,
    request_timeout: Duration,
) -> Result<StopHandle, ConnectorError> {
    let (shutdown_send, shutdown_recv) = oneshot::channel::<()>();
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| ConnectorError::BindError(bind.to_string(), e.to_string()))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| ConnectorError::BindError(bind.to_string(), e.to_string()))?;

    let router = tonic::transport::Server::builder()
        .timeout(request_timeout)
        .add_service(ConnectorServer::new(proxy));
    tokio::spawn(async move {
        if let Err(err) = router
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown_recv.map(drop))
            .await
        {
            error!("connector gRPC server stopped: {}", err);
        }
    });
    info!("connector gRPC server listening on {}", local_addr);
    Ok(StopHandle::new(shutdown_send, local_addr))
}

/// Body of a structured invoke call
#[derive(Debug, Default, Deserialize)]
pub struct InvokeBody {
    /// transaction id, generated when empty
    #[serde(default)]
    pub id: String,
    /// function of the cocoon code
    #[serde(default)]
    pub function: String,
    /// arguments
    #[serde(default)]
    pub params: Vec<String>,
}

#[derive(Debug, Serialize)]
struct InvokeError {
    error: bool,
    code: String,
    msg: String,
}

fn invoke_error(status: StatusCode, code: &str, msg: String) -> (StatusCode, Json<serde_json::Value>) {
    let body = InvokeError {
        error: true,
        code: code.to_string(),
        msg,
    };
    (status, Json(json!(body)))
}

#[derive(Clone)]
struct HttpState {
    cocoon_id: String,
    code: Box<dyn CocoonCodeClient>,
}

async fn health(State(state): State<HttpState>) -> Json<serde_json::Value> {
    Json(json!({"status": "ok", "cocoonId": state.cocoon_id}))
}

async fn invoke(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<serde_json::Value>) {
    let mut header: HashMap<String, String> = headers
        .iter()
        .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
        .collect();
    let is_json = headers
        .get(axum::http::header::CONTENT_TYPE)
        .map_or(false, |v| v.as_bytes().starts_with(b"application/json"));

    let parsed = serde_json::from_str::<InvokeBody>(&body);
    let call = match parsed {
        Ok(call) if !call.function.trim().is_empty() => {
            if !call.id.is_empty() && uuid::Uuid::parse_str(&call.id).is_err() {
                return invoke_error(
                    StatusCode::BAD_REQUEST,
                    "2",
                    "Invalid ID. ID must be a UUIDv4 value".into(),
                );
            }
            let id = if call.id.is_empty() {
                uuid::Uuid::new_v4().to_string()
            } else {
                call.id
            };
            header.insert("Transaction-Id".into(), id.clone());
            header.insert("Structured".into(), "yes".into());
            InvokeParams {
                id,
                header,
                function: call.function,
                params: call.params,
            }
        }
        Err(_) if is_json => {
            return invoke_error(
                StatusCode::BAD_REQUEST,
                "1",
                "Invalid invoke body structure".into(),
            )
        }
        _ => {
            header.insert("Structured".into(), "no".into());
            header.insert("Body".into(), body);
            InvokeParams {
                header,
                ..Default::default()
            }
        }
    };

    match state.code.invoke(call).await {
        Ok(resp) => {
            let body: serde_json::Value = serde_json::from_slice(&resp.body)
                .unwrap_or_else(|_| json!(String::from_utf8_lossy(&resp.body)));
            (StatusCode::OK, Json(json!({"id": resp.id, "status": resp.status, "body": body})))
        }
        Err(err) => invoke_error(StatusCode::INTERNAL_SERVER_ERROR, "code_error", err.to_string()),
    }
}

/// HTTP routes: `GET /health` and `POST /v1/invoke`
pub fn http_router(cocoon_id: &str, code: Box<dyn CocoonCodeClient>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/invoke", post(invoke))
        .with_state(HttpState {
            cocoon_id: cocoon_id.to_string(),
            code,
        })
}

/// Serves [`http_router`] on `bind` until the handle is stopped
pub async fn serve_http(
    cocoon_id: &str,
    code: Box<dyn CocoonCodeClient>,
    bind: SocketAddr,
) -> Result<StopHandle, ConnectorError> {
    let (shutdown_send, shutdown_recv) = oneshot::channel::<()>();
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| ConnectorError::BindError(bind.to_string(), e.to_string()))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| ConnectorError::BindError(bind.to_string(), e.to_string()))?;
    let app = http_router(cocoon_id, code);
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_recv.map(drop))
            .await
        {
            error!("connector HTTP server stopped: {}", err);
        }
    });
    info!("connector HTTP server listening on {}", local_addr);
    Ok(StopHandle::new(shutdown_send, local_addr))
}
