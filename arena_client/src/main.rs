//! Standalone headless client binary.
//!
//! Usage:
//!   cargo run -p arena_client -- [--addr 127.0.0.1:40200] [--name pilot] [--color ff8800]
//!
//! Connects to a server, flies a scripted orbit (steady turn plus thrust),
//! and logs received events. Useful for soak-testing a server without a
//! renderer.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use arena_client::GameClient;
use arena_shared::math::wrap_angle_deg;
use arena_shared::net::ServerMsg;
use tracing::info;

struct Args {
    addr: String,
    name: Option<String>,
    color: Option<u32>,
}

fn parse_args() -> Args {
    let mut parsed = Args {
        addr: "127.0.0.1:40200".to_string(),
        name: None,
        color: None,
    };
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                parsed.addr = args[i + 1].clone();
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                parsed.name = Some(args[i + 1].clone());
                i += 2;
            }
            "--color" if i + 1 < args.len() => {
                parsed.color = u32::from_str_radix(&args[i + 1], 16).ok();
                i += 2;
            }
            _ => i += 1,
        }
    }
    parsed
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args();
    let addr: SocketAddr = args.addr.parse().context("parse --addr")?;

    let mut client = GameClient::connect(addr).await.context("connect")?;
    info!(player = %client.player_id, "Joined arena");

    if args.name.is_some() || args.color.is_some() {
        client.update_info(args.name, args.color).await?;
    }

    let tick_interval = Duration::from_secs_f32(1.0 / client.cfg.tick_hz as f32);
    let mut angle = 0.0f32;
    let mut tick = 0u64;

    while client.connected {
        // Scripted flight: slow steady turn under constant thrust.
        angle = wrap_angle_deg(angle + 2.0);
        client.send_input(true, angle, tick % 30 == 0).await?;

        while client.poll(Duration::from_millis(1)).await? {}
        client.advance_remotes();

        for event in client.take_events() {
            match event {
                ServerMsg::PlayerHit { id, by, .. } => {
                    info!(player = %id, by = %by, "Player hit");
                }
                ServerMsg::PlayerLanded {
                    id,
                    planet_id,
                    claimed,
                    ..
                } => {
                    info!(player = %id, planet = %planet_id, claimed, "Player landed");
                }
                ServerMsg::PlanetClaimed {
                    planet_id,
                    new_owner_id,
                    ..
                } => {
                    info!(planet = %planet_id, owner = %new_owner_id, "Planet claimed");
                }
                other => {
                    info!(event = ?other, "Event");
                }
            }
        }

        if tick % 150 == 0 {
            let (pos, vel) = (client.predictor.body.pos, client.predictor.body.vel);
            info!(
                x = pos.x,
                y = pos.y,
                speed = vel.len(),
                players = client.world.players.len(),
                pending = client.predictor.pending_len(),
                "Status"
            );
        }

        tick += 1;
        tokio::time::sleep(tick_interval).await;
    }

    info!("Disconnected from server");
    Ok(())
}
