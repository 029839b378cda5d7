//! space-node — p2pspace reference daemon
//!
//! Wires a persisted [`space_core::identity::Identity`] to sled-backed
//! storage and a plain-TCP sync transport. No UI, no bootstrap/rendezvous
//! signaling channel — both are external collaborators per spec.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use space_node::config::Config;
use space_node::server::Server;

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    let filter = EnvFilter::from_default_env()
        .add_directive(if config.verbose { "space_node=debug".parse().unwrap() } else { "space_node=info".parse().unwrap() });
    if config.log_format == "json" {
        tracing_subscriber::registry().with(fmt::layer().json()).with(filter).init();
    } else {
        tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
    }

    if let Err(e) = config.validate() {
        error!("invalid configuration: {e}");
        return ExitCode::FAILURE;
    }

    info!("space-node v{}", env!("CARGO_PKG_VERSION"));

    let server = match Server::new(config) {
        Ok(server) => Arc::new(server),
        Err(e) => {
            error!("failed to initialize server: {e}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        shutdown_server.shutdown();
    });

    if let Err(e) = server.run().await {
        error!("server error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
