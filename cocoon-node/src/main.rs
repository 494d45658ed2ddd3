// Copyright (c) 2023 The Cocoon Authors
//! The `cocoon` binary: runs an orderer, the connector of one cocoon, or the
//! platform API.
#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]

mod settings;

use clap::{Args, Parser, Subcommand};
use cocoon_api::{start_api_worker, ApiConfig};
use cocoon_connector::{start_connector_worker, ConnectorConfig, LifecycleEvent, EXIT_FAILED};
use cocoon_orderer_exports::OrdererConfig;
use cocoon_orderer_worker::start_orderer_worker;
use settings::Settings;
use std::net::SocketAddr;
use tracing::{error, info};

const EXIT_OK: i32 = 0;
const EXIT_CLI_ERROR: i32 = -1;

#[derive(Parser, Debug)]
#[command(name = "cocoon", version, about = "Cocoon smart contract platform")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ledger ordering service
    Orderer {
        #[command(subcommand)]
        action: NodeAction,
    },
    /// Supervisor of one cocoon, started by the scheduler
    Connector {
        #[command(subcommand)]
        action: NodeAction,
    },
    /// Platform API
    Api {
        #[command(subcommand)]
        action: ApiAction,
    },
}

#[derive(Subcommand, Debug)]
enum NodeAction {
    /// Start the service
    Start(StartArgs),
}

#[derive(Subcommand, Debug)]
enum ApiAction {
    /// Start the service
    Start(ApiStartArgs),
}

#[derive(Args, Debug)]
struct StartArgs {
    /// Address to serve on
    #[arg(long)]
    bind_addr: Option<SocketAddr>,
}

#[derive(Args, Debug)]
struct ApiStartArgs {
    /// Address to serve on
    #[arg(long)]
    bind_addr: Option<SocketAddr>,
    /// HTTP address of the job scheduler
    #[arg(long)]
    scheduler_addr: Option<String>,
}

async fn run_orderer(settings: Settings, args: StartArgs) -> i32 {
    let mut config = OrdererConfig::from(settings.orderer);
    if let Some(path) = std::env::var("STORE_CON_STR").ok().filter(|p| !p.is_empty()) {
        config.store_path = path.into();
    }
    if let Some(bind) = args.bind_addr {
        config.bind = bind;
    }
    let (_orderer, stop_handle) = match start_orderer_worker(config).await {
        Ok(started) => started,
        Err(err) => {
            error!("could not start orderer: {}", err);
            return EXIT_FAILED;
        }
    };
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("could not listen to interrupt signal: {}", err);
    }
    info!("interrupt signal received");
    stop_handle.stop();
    EXIT_OK
}

async fn run_connector(settings: Settings, args: StartArgs) -> i32 {
    let mut base = ConnectorConfig::from(settings.connector);
    if let Some(bind) = args.bind_addr {
        base.bind = bind;
    }
    let config = match ConnectorConfig::from_env(base) {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            return err.exit_code();
        }
    };
    let worker = match start_connector_worker(config).await {
        Ok(worker) => worker,
        Err(err) => {
            error!("could not start connector: {}", err);
            return err.exit_code();
        }
    };
    let stopper = worker.stopper();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt signal received");
            let _ = stopper.send(LifecycleEvent::Stop { failed: false });
        }
    });
    worker.run().await
}

async fn run_api(settings: Settings, args: ApiStartArgs) -> i32 {
    let mut config = ApiConfig::from(settings.api).with_env();
    if let Some(bind) = args.bind_addr {
        config.bind = bind;
    }
    if let Some(addr) = args.scheduler_addr {
        config.scheduler_addr = addr;
    }
    let worker = match start_api_worker(config).await {
        Ok(worker) => worker,
        Err(err) => {
            error!("could not start api: {}", err);
            return EXIT_FAILED;
        }
    };
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("could not listen to interrupt signal: {}", err);
    }
    info!("interrupt signal received");
    worker.stop().await;
    EXIT_OK
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { EXIT_CLI_ERROR } else { EXIT_OK };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("could not load settings: {}", err);
            std::process::exit(EXIT_FAILED);
        }
    };
    cocoon_logging::init(settings.logging.level);

    let code = match cli.command {
        Command::Orderer {
            action: NodeAction::Start(args),
        } => run_orderer(settings, args).await,
        Command::Connector {
            action: NodeAction::Start(args),
        } => run_connector(settings, args).await,
        Command::Api {
            action: ApiAction::Start(args),
        } => run_api(settings, args).await,
    };
    std::process::exit(code);
}
