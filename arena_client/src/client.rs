//! Client implementation.
//!
//! The client maintains:
//! - A framed TCP connection to the server
//! - A predicted local ship (immediate input application + reconciliation)
//! - Interpolators for every remote ship
//! - A mirror of the authoritative world (players, bullets, planets)
//! - A queue of discrete events for the presentation layer

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info, warn};

use arena_shared::config::SimConfig;
use arena_shared::entities::PlayerId;
use arena_shared::math::Vec2;
use arena_shared::net::{
    connect, ClientMsg, FrameReader, FrameWriter, ServerMsg, WorldSnapshot, PROTOCOL_VERSION,
};
use arena_shared::physics::GravitySource;

use crate::interp::RemoteInterpolator;
use crate::predict::Predictor;

/// High-level game client.
pub struct GameClient {
    pub player_id: PlayerId,
    pub cfg: SimConfig,
    pub predictor: Predictor,
    pub remotes: HashMap<PlayerId, RemoteInterpolator>,
    /// Latest authoritative world mirror.
    pub world: WorldSnapshot,
    /// Latest per-color control percentages.
    pub percentages: HashMap<u32, f32>,
    pub connected: bool,

    reader: FrameReader,
    writer: FrameWriter,
    events: Vec<ServerMsg>,
}

impl GameClient {
    /// Connects, performs the hello/welcome handshake, and waits for the
    /// initial full snapshot.
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        info!(server = %addr, "Connecting to server");
        let (mut reader, mut writer) = connect(addr).await?;

        writer
            .send(&ClientMsg::Hello {
                protocol: PROTOCOL_VERSION,
            })
            .await?;

        let welcome: ServerMsg = reader.recv().await.context("read welcome")?;
        let (player_id, cfg) = match welcome {
            ServerMsg::Welcome { player_id, config } => (player_id, config),
            other => anyhow::bail!("expected welcome, got {other:?}"),
        };

        let initial: ServerMsg = reader.recv().await.context("read initial state")?;
        let state = match initial {
            ServerMsg::GameState { state } => state,
            other => anyhow::bail!("expected game state, got {other:?}"),
        };

        info!(player = %player_id, "Connected to server");

        let mut client = Self {
            player_id,
            predictor: Predictor::new(cfg.clone()),
            cfg,
            remotes: HashMap::new(),
            world: WorldSnapshot::default(),
            percentages: HashMap::new(),
            connected: true,
            reader,
            writer,
            events: Vec::new(),
        };
        client.apply_snapshot(state, true);
        Ok(client)
    }

    /// Samples local input: predicts immediately, then puts the sequence-
    /// numbered command on the wire.
    pub async fn send_input(
        &mut self,
        is_thrusting: bool,
        angle: f32,
        is_shooting: bool,
    ) -> anyhow::Result<u32> {
        let sources = self.gravity_sources();
        let frame = self
            .predictor
            .apply_local_input(is_thrusting, angle, &sources);
        self.writer
            .send(&ClientMsg::PlayerInput {
                is_thrusting,
                angle,
                is_shooting,
                sequence_number: frame.sequence_number,
            })
            .await?;
        Ok(frame.sequence_number)
    }

    /// Requests a name/color change. The server validates and broadcasts the
    /// result.
    pub async fn update_info(
        &mut self,
        name: Option<String>,
        color: Option<u32>,
    ) -> anyhow::Result<()> {
        self.writer
            .send(&ClientMsg::UpdatePlayerInfo { name, color })
            .await
    }

    /// Polls the connection once with a short timeout. Returns true when a
    /// message was handled.
    pub async fn poll(&mut self, timeout: Duration) -> anyhow::Result<bool> {
        match tokio::time::timeout(timeout, self.reader.recv::<ServerMsg>()).await {
            Ok(Ok(msg)) => {
                self.handle(msg);
                Ok(true)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Connection error");
                self.connected = false;
                Ok(false)
            }
            Err(_) => Ok(false),
        }
    }

    /// Drains buffered discrete events (hits, landings, claims, ...).
    pub fn take_events(&mut self) -> Vec<ServerMsg> {
        std::mem::take(&mut self.events)
    }

    /// Advances every remote interpolator one rendered frame.
    pub fn advance_remotes(&mut self) {
        for interp in self.remotes.values_mut() {
            interp.advance();
        }
    }

    /// Applies one server message to local state, in arrival order.
    pub fn handle(&mut self, msg: ServerMsg) {
        match msg {
            ServerMsg::Welcome { .. } => {
                debug!("Duplicate welcome ignored");
            }
            ServerMsg::GameState { state } => self.apply_snapshot(state, true),
            ServerMsg::GameStateUpdate { state } => self.apply_snapshot(state, false),
            ServerMsg::ControlPercentagesUpdate { percentages } => {
                self.percentages = percentages;
            }
            ServerMsg::PlayerJoined { id, player } => {
                self.remotes
                    .insert(id, RemoteInterpolator::new(Vec2::new(player.x, player.y), player.angle));
                self.world.players.insert(id, player);
            }
            ServerMsg::PlayerLeft { id } => {
                self.world.players.remove(&id);
                self.remotes.remove(&id);
            }
            ServerMsg::PlayerInfoUpdate { id, name, color } => {
                if let Some(player) = self.world.players.get_mut(&id) {
                    player.name = name;
                    player.color = color;
                }
            }
            ServerMsg::PlanetCreated { id, planet } => {
                self.world.planets.insert(id, planet);
            }
            ServerMsg::CraterCreated { planet_id, crater } => {
                if let Some(planet) = self.world.planets.get_mut(&planet_id) {
                    planet.craters.push(crater);
                }
            }
            ServerMsg::PlanetRemoved { planet_id } => {
                self.world.planets.remove(&planet_id);
            }
            event @ ServerMsg::PlanetClaimed { .. } => {
                if let ServerMsg::PlanetClaimed {
                    planet_id,
                    new_owner_id,
                    player_color,
                    ..
                } = &event
                {
                    if let Some(planet) = self.world.planets.get_mut(planet_id) {
                        planet.owner_id = *new_owner_id;
                        planet.color = *player_color;
                    }
                }
                self.events.push(event);
            }
            // Presentation-layer notifications.
            event @ (ServerMsg::PlanetHit { .. }
            | ServerMsg::PlayerCrashed { .. }
            | ServerMsg::PlayerLanded { .. }
            | ServerMsg::PlayerTakeoff { .. }
            | ServerMsg::PlanetSeverelyDamaged { .. }
            | ServerMsg::PlayerHit { .. }) => {
                self.events.push(event);
            }
        }
    }

    /// Absorbs a snapshot: reconcile self, retarget remotes, refresh the
    /// mirror. A degraded snapshot (no planets while we know planets exist)
    /// only updates player motion state.
    fn apply_snapshot(&mut self, state: WorldSnapshot, initial: bool) {
        let sources = self.gravity_sources();

        if let Some(me) = state.players.get(&self.player_id) {
            if initial {
                self.predictor.reset_to(me);
            } else {
                self.predictor.reconcile(me, &sources);
            }
        }

        for (id, player) in &state.players {
            if *id == self.player_id {
                continue;
            }
            let pos = Vec2::new(player.x, player.y);
            match self.remotes.get_mut(id) {
                Some(interp) => interp.set_target(pos, player.angle),
                None => {
                    self.remotes
                        .insert(*id, RemoteInterpolator::new(pos, player.angle));
                }
            }
        }
        self.remotes.retain(|id, _| state.players.contains_key(id));

        let degraded = state.planets.is_empty() && !self.world.planets.is_empty();
        if degraded {
            for (id, player) in state.players {
                if let Some(known) = self.world.players.get_mut(&id) {
                    known.x = player.x;
                    known.y = player.y;
                    known.angle = player.angle;
                } else {
                    self.world.players.insert(id, player);
                }
            }
        } else {
            self.world = state;
        }
    }

    fn gravity_sources(&self) -> Vec<GravitySource> {
        self.world
            .planets
            .values()
            .map(|p| GravitySource {
                pos: Vec2::new(p.x, p.y),
                radius: p.radius,
            })
            .collect()
    }
}
