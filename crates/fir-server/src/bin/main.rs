//! Recommender server executable

use clap::{Arg, Command};
use fir_common::Config;
use fir_server::{Server, SessionCoordinator};
use fir_store::SessionStore;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let matches = Command::new("fir-server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Surrogate-guided fault-injection recommender")
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .value_name("ADDRESS")
                .help("Bind address, overriding FIR_SERVER__HOST/PORT")
                .required(false),
        )
        .get_matches();

    let config = match Config::load() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(&config.log_level);
    info!("starting fir-server v{}", env!("CARGO_PKG_VERSION"));

    let store = match SessionStore::open(&config.storage.path).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("failed to open session store: {e}");
            std::process::exit(1);
        }
    };

    let coordinator = match SessionCoordinator::with_http_executor(Arc::clone(&config), store) {
        Ok(coordinator) => Arc::new(coordinator),
        Err(e) => {
            error!("failed to initialize coordinator: {e}");
            std::process::exit(1);
        }
    };

    match coordinator.recover_interrupted().await {
        Ok(0) => {}
        Ok(count) => info!(count, "marked interrupted sessions as failed"),
        Err(e) => {
            error!("failed to recover persisted sessions: {e}");
            std::process::exit(1);
        }
    }

    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal, exiting");
            std::process::exit(0);
        }
    });

    let bind_addr = matches
        .get_one::<String>("bind")
        .cloned()
        .unwrap_or_else(|| config.server.bind_addr());

    let server = Server::new(coordinator);
    if let Err(e) = server.run(&bind_addr).await {
        error!("server error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fir={log_level},fir_server={log_level},fir_common={log_level},fir_optimizer={log_level},fir_analyzer={log_level},fir_executor={log_level},fir_store={log_level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
