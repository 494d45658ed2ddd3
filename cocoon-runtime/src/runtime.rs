// Copyright (c) 2023 The Cocoon Authors

use crate::block_maker::{BlockMaker, BlockMakerHandle, ConnectorCommitter};
use crate::cocoon_code::CocoonCode;
use crate::config::{RuntimeConfig, DEFAULT_LEDGER};
use crate::connector::{ConnectorClient, GrpcConnectorClient};
use crate::error::RuntimeError;
use crate::link::Link;
use crate::server::{StubGrpc, StubState};
use cocoon_models::naming::{SYSTEM_COCOON_ID, SYSTEM_PUBLIC_LEDGER};
use cocoon_proto::stub::stub_server::StubServer;
use futures_util::FutureExt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tracing::{error, info};

/// Exit code when the code fails to initialize
pub const EXIT_INIT_FAILED: i32 = 2;

/// Exit code when the stub service stops on its own
pub const EXIT_SERVER_FAILED: i32 = 1;

/// Runtime of one cocoon
pub struct Runtime {
    config: RuntimeConfig,
    connector: Box<dyn ConnectorClient>,
    block_maker: BlockMaker,
    system: Link,
    native: Link,
    me: Link,
}

impl Runtime {
    /// Runtime reaching its connector through `connector`
    pub fn new(config: RuntimeConfig, connector: Box<dyn ConnectorClient>) -> Self {
        let block_maker = BlockMaker::new(config.tx_per_block, config.block_creation_interval);
        let link = |id: &str, ledger: &str, native: bool| {
            Link::new(id, ledger, native, connector.clone(), block_maker.clone())
        };
        let system = link(SYSTEM_COCOON_ID, SYSTEM_PUBLIC_LEDGER, false);
        let native = link(config.native_id(), DEFAULT_LEDGER, true);
        let me = link(&config.cocoon_id, DEFAULT_LEDGER, false);
        Runtime {
            config,
            connector,
            block_maker,
            system,
            native,
            me,
        }
    }

    /// Runtime configured by the environment the connector prepared
    pub fn from_env() -> Result<Self, RuntimeError> {
        let config = RuntimeConfig::from_env()?;
        if config.connector_rpc_addr.is_empty() {
            return Err(RuntimeError::ConfigError("CONNECTOR_RPC_ADDR is not set".into()));
        }
        let connector = GrpcConnectorClient::new(&config.connector_rpc_addr, config.request_timeout);
        Ok(Runtime::new(config, Box::new(connector)))
    }

    /// Resources of the system cocoon
    pub fn system(&self) -> &Link {
        &self.system
    }

    /// Resources of the natively linked cocoon, or of this cocoon when not linked
    pub fn native(&self) -> &Link {
        &self.native
    }

    /// Resources of this cocoon
    pub fn me(&self) -> &Link {
        &self.me
    }

    /// Configuration in use
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Serves the stub service, starts the block maker and initializes `code`
    /// once the init delay elapsed
    pub async fn start<C: CocoonCode>(self, code: C) -> Result<RunningCocoon, RuntimeError> {
        let listener = TcpListener::bind(self.config.rpc_addr)
            .await
            .map_err(|e| RuntimeError::BindError(self.config.rpc_addr.to_string(), e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| RuntimeError::BindError(self.config.rpc_addr.to_string(), e.to_string()))?;

        let (stop_tx, stop_rx) = mpsc::unbounded_channel();
        let state = Arc::new(StubState {
            code: Arc::new(code),
            link: self.native.clone(),
            running: AtomicBool::new(false),
            stop_tx: stop_tx.clone(),
        });

        let block_maker = self
            .block_maker
            .start(Arc::new(ConnectorCommitter(self.connector.clone())));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let service = StubServer::new(StubGrpc {
            state: state.clone(),
        });
        let server_stop = stop_tx.clone();
        let server = tokio::spawn(async move {
            let result = tonic::transport::Server::builder()
                .add_service(service)
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown_rx.map(drop))
                .await;
            if let Err(e) = result {
                error!("stub server has stopped: {}", e);
                let _ = server_stop.send(EXIT_SERVER_FAILED);
            }
        });
        info!("stub service started on {}", local_addr);

        let init_delay = self.config.init_delay;
        let init_state = state.clone();
        let init = tokio::spawn(async move {
            tokio::time::sleep(init_delay).await;
            match init_state.code.init(&init_state.link).await {
                Ok(()) => {
                    init_state.running.store(true, Ordering::SeqCst);
                    info!("cocoon code initialized");
                }
                Err(e) => {
                    error!("cocoon code init returned error: {}", e);
                    let _ = init_state.stop_tx.send(EXIT_INIT_FAILED);
                }
            }
        });

        Ok(RunningCocoon {
            local_addr,
            state,
            stop_rx,
            shutdown_tx: Some(shutdown_tx),
            server: Some(server),
            init: Some(init),
            block_maker: Some(block_maker),
        })
    }

    /// Starts `code` and waits until it is stopped. Returns the exit code.
    pub async fn run<C: CocoonCode>(self, code: C) -> Result<i32, RuntimeError> {
        Ok(self.start(code).await?.wait().await)
    }
}

/// A started cocoon
pub struct RunningCocoon {
    local_addr: SocketAddr,
    state: Arc<StubState>,
    stop_rx: mpsc::UnboundedReceiver<i32>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
    init: Option<JoinHandle<()>>,
    block_maker: Option<BlockMakerHandle>,
}

impl RunningCocoon {
    /// Address the stub service listens on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the code was initialized
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Asks the cocoon to stop with `exit_code`
    pub fn stop(&self, exit_code: i32) {
        let _ = self.state.stop_tx.send(exit_code);
    }

    /// Waits for a stop request, then stops the block maker and the stub
    /// service. Returns the exit code.
    pub async fn wait(mut self) -> i32 {
        let exit_code = self.stop_rx.recv().await.unwrap_or(0);
        self.state.running.store(false, Ordering::SeqCst);
        if let Some(init) = self.init.take() {
            init.abort();
        }
        if let Some(block_maker) = self.block_maker.take() {
            block_maker.stop().await;
        }
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(server) = self.server.take() {
            let _ = server.await;
        }
        info!("cocoon code exiting with exit code {}", exit_code);
        exit_code
    }
}
