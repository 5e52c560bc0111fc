//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p arena_server -- [--addr 127.0.0.1:40200] [--tick-hz 30]
//!
//! The server listens for client connections, runs a fixed timestep
//! simulation, and broadcasts snapshots and events to connected clients.

use std::env;

use anyhow::Context;
use arena_server::GameServer;
use arena_shared::config::SimConfig;
use tracing::info;

fn parse_args() -> SimConfig {
    let mut cfg = SimConfig::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().unwrap_or(30);
                i += 2;
            }
            _ => i += 1,
        }
    }
    cfg
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args();
    info!(addr = %cfg.server_addr, tick_hz = cfg.tick_hz, "Starting server");

    let server = GameServer::bind(cfg).await.context("bind server")?;
    let local = server.local_addr()?;
    info!(%local, "Server listening");

    server.run().await
}
