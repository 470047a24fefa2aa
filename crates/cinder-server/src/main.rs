//! cinder server binary: parse flags, seed the store, serve RESP.

mod connection;
mod server;

use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use cinder_core::{ShardedStore, StoreConfig};

/// How long a graceful shutdown waits for shards to drain.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "cinder-server", about = "Sharded in-memory data store speaking RESP")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:6380")]
    addr: String,

    /// Number of initial shard nodes.
    #[arg(long, default_value_t = 2)]
    nodes: usize,

    /// Virtual nodes per shard on the hash ring.
    #[arg(long, default_value_t = 2)]
    replicas: usize,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cinder=info,cinder_core=info,cinder_server=info".into()),
        )
        .init();

    let args = Args::parse();

    let config = StoreConfig {
        replicas: args.replicas,
        ..StoreConfig::default()
    };
    let store = ShardedStore::new(config);

    for i in 0..args.nodes.max(1) {
        let node = format!("shard-{i}");
        if let Err(e) = store.add_node(&node).await {
            error!(node, "failed to add initial node: {e}");
            std::process::exit(1);
        }
    }
    info!(nodes = args.nodes.max(1), "initial shards ready");

    let listener = match tokio::net::TcpListener::bind(&args.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %args.addr, "failed to bind: {e}");
            std::process::exit(1);
        }
    };
    info!(addr = %args.addr, "server listening");

    tokio::select! {
        _ = server::serve(listener, store.clone()) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    match store.shutdown(SHUTDOWN_DEADLINE).await {
        Ok(()) => info!("server shut down cleanly"),
        Err(e) => error!("graceful shutdown failed: {e}"),
    }
}
