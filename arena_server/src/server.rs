//! Server implementation.
//!
//! An authoritative fixed-timestep arena loop:
//! - Socket I/O runs on per-client tasks; every mutation is forwarded to the
//!   single simulation task, so handlers and the tick never interleave.
//! - Broadcast is fire-and-forget: each client has a bounded outbound queue
//!   and frames are dropped when it is full, so a slow client never blocks
//!   the tick.
//! - Deferred state changes (invulnerability expiry, takeoff locks, planet
//!   removal) are cancellable timers fired at tick start.
//!
//! Determinism notes:
//! - Keep simulation in a fixed timestep.
//! - Use stable ordering when iterating collections with competing outcomes.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use arena_shared::config::SimConfig;
use arena_shared::entities::{now_ms, PlayerId};
use arena_shared::net::{
    decode_from_bytes, encode_to_bytes, ClientMsg, FrameListener, FrameReader, FrameWriter,
    ServerMsg, PROTOCOL_VERSION,
};

use crate::collision;
use crate::territory;
use crate::timers::{TimerKey, TimerQueue};
use crate::world::World;

/// Outbound queue depth per client; overflow frames are dropped.
const CLIENT_QUEUE_DEPTH: usize = 256;

/// Events handed from I/O tasks to the simulation task.
pub enum ClientEvent {
    Connected {
        id: PlayerId,
        addr: SocketAddr,
        tx: mpsc::Sender<Bytes>,
    },
    Msg {
        id: PlayerId,
        msg: ClientMsg,
    },
    Disconnected {
        id: PlayerId,
    },
}

/// Game server: owns the listener; `run` starts the accept loop and the
/// simulation task.
pub struct GameServer {
    pub cfg: SimConfig,
    listener: FrameListener,
}

impl GameServer {
    /// Binds the listener for the configured address.
    pub async fn bind(cfg: SimConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse()?;
        let listener = FrameListener::bind(addr).await?;
        Ok(Self { cfg, listener })
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the server until the process is stopped.
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_inner(None).await
    }

    /// Runs the simulation for a bounded number of ticks (tests).
    pub async fn run_for_ticks(self, ticks: u64) -> anyhow::Result<()> {
        self.run_inner(Some(ticks)).await
    }

    async fn run_inner(self, max_ticks: Option<u64>) -> anyhow::Result<()> {
        let (events_tx, events_rx) = mpsc::channel::<ClientEvent>(1024);
        tokio::spawn(accept_loop(self.listener, events_tx));

        let sim = SimTask::new(self.cfg, events_rx);
        sim.run(max_ticks).await
    }
}

async fn accept_loop(listener: FrameListener, events_tx: mpsc::Sender<ClientEvent>) {
    loop {
        match listener.accept().await {
            Ok((reader, writer, addr)) => {
                tokio::spawn(handle_connection(reader, writer, addr, events_tx.clone()));
            }
            Err(e) => {
                warn!(error = %e, "Accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// Handshake plus the per-client read loop. Malformed frames are skipped;
/// any transport error ends the session through the shared cleanup path.
async fn handle_connection(
    mut reader: FrameReader,
    writer: FrameWriter,
    addr: SocketAddr,
    events_tx: mpsc::Sender<ClientEvent>,
) {
    let hello: ClientMsg = match reader.recv().await {
        Ok(msg) => msg,
        Err(e) => {
            debug!(%addr, error = %e, "Handshake read failed");
            return;
        }
    };
    match hello {
        ClientMsg::Hello { protocol } if protocol == PROTOCOL_VERSION => {}
        other => {
            warn!(%addr, msg = ?other, "Unexpected handshake message");
            return;
        }
    }

    let id = PlayerId::new_unique();
    let (tx, rx) = mpsc::channel::<Bytes>(CLIENT_QUEUE_DEPTH);
    tokio::spawn(writer_task(writer, rx));

    if events_tx
        .send(ClientEvent::Connected { id, addr, tx })
        .await
        .is_err()
    {
        return;
    }
    info!(player = %id, %addr, "Client connected");

    loop {
        match reader.recv_bytes().await {
            Ok(frame) => match decode_from_bytes::<ClientMsg>(&frame) {
                Ok(msg) => {
                    if events_tx.send(ClientEvent::Msg { id, msg }).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    // Transient client fault: skip the frame, keep the session.
                    debug!(player = %id, error = %e, "Ignoring malformed frame");
                }
            },
            Err(_) => break,
        }
    }

    let _ = events_tx.send(ClientEvent::Disconnected { id }).await;
}

async fn writer_task(mut writer: FrameWriter, mut rx: mpsc::Receiver<Bytes>) {
    while let Some(payload) = rx.recv().await {
        if writer.send_bytes(&payload).await.is_err() {
            break;
        }
    }
}

/// The serialized state owner: all world mutation happens here, either in
/// `step` or in a client-event handler running strictly between ticks.
struct SimTask {
    world: World,
    timers: TimerQueue,
    clients: HashMap<PlayerId, mpsc::Sender<Bytes>>,
    events_rx: mpsc::Receiver<ClientEvent>,
    tick: u64,
    last_sweep_ms: i64,
}

impl SimTask {
    fn new(cfg: SimConfig, events_rx: mpsc::Receiver<ClientEvent>) -> Self {
        Self {
            world: World::new(cfg),
            timers: TimerQueue::new(),
            clients: HashMap::new(),
            events_rx,
            tick: 0,
            last_sweep_ms: now_ms(),
        }
    }

    async fn run(mut self, max_ticks: Option<u64>) -> anyhow::Result<()> {
        let period = Duration::from_secs_f32(self.world.cfg.tick_period_secs());
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.step(now_ms());
                    if let Some(max) = max_ticks {
                        if self.tick >= max {
                            return Ok(());
                        }
                    }
                }
                maybe = self.events_rx.recv() => match maybe {
                    Some(event) => self.handle_client_event(event),
                    None => return Ok(()),
                }
            }
        }
    }

    /// One fixed simulation step.
    fn step(&mut self, now: i64) {
        self.fire_timers(now);
        self.world.integrate();
        let events = collision::resolve(&mut self.world, now);
        self.dispatch_events(events, now);
        self.sweep_inactive(now);
        self.broadcast_snapshot();
        self.broadcast_percentages(now);
        self.tick += 1;
    }

    fn handle_client_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Connected { id, addr, tx } => self.on_connected(id, addr, tx),
            ClientEvent::Msg { id, msg } => self.on_message(id, msg),
            ClientEvent::Disconnected { id } => self.cleanup_player(id, "socket closed"),
        }
    }

    fn on_connected(&mut self, id: PlayerId, addr: SocketAddr, tx: mpsc::Sender<Bytes>) {
        let now = now_ms();
        self.world.spawn_player(id, now);
        self.world.place_planet(id, now);
        self.clients.insert(id, tx);

        self.send_to(
            id,
            &ServerMsg::Welcome {
                player_id: id,
                config: self.world.cfg.clone(),
            },
        );
        self.send_to(
            id,
            &ServerMsg::GameState {
                state: self.world.snapshot(),
            },
        );

        let joined = self.world.players.get(&id).map(|p| ServerMsg::PlayerJoined {
            id,
            player: self.world.player_snapshot(p),
        });
        let created = self.world.planets.get(&id).map(|p| ServerMsg::PlanetCreated {
            id,
            planet: self.world.planet_snapshot(p),
        });
        if let Some(msg) = joined {
            self.broadcast_except(id, &msg);
        }
        if let Some(msg) = created {
            self.broadcast_except(id, &msg);
        }

        info!(player = %id, %addr, players = self.world.players.len(), "Player joined arena");
    }

    fn on_message(&mut self, id: PlayerId, msg: ClientMsg) {
        match msg {
            ClientMsg::Hello { .. } => {
                debug!(player = %id, "Duplicate hello ignored");
            }
            ClientMsg::PlayerInput {
                is_thrusting,
                angle,
                is_shooting,
                sequence_number,
            } => {
                let now = now_ms();
                let events = self.world.apply_input(
                    id,
                    is_thrusting,
                    angle,
                    is_shooting,
                    sequence_number,
                    now,
                );
                self.dispatch_events(events, now);
            }
            ClientMsg::UpdatePlayerInfo { name, color } => {
                if let Some(event) = self.world.update_player_info(id, name, color, now_ms()) {
                    self.broadcast(&event);
                }
            }
        }
    }

    /// Broadcasts discrete events and arms the timers they imply.
    fn dispatch_events(&mut self, events: Vec<ServerMsg>, now: i64) {
        for event in events {
            match &event {
                ServerMsg::PlayerLanded { id, .. } => {
                    self.timers.schedule(
                        TimerKey::TakeoffLock(*id),
                        now + self.world.cfg.takeoff_lock_ms,
                    );
                }
                ServerMsg::PlayerTakeoff { id, .. } => {
                    // A fresh grant supersedes any unexpired invulnerability.
                    self.timers.schedule(
                        TimerKey::InvulnerabilityExpiry(*id),
                        now + self.world.cfg.takeoff_invuln_ms,
                    );
                }
                _ => {}
            }
            self.broadcast(&event);
        }
    }

    fn fire_timers(&mut self, now: i64) {
        for key in self.timers.due(now) {
            match key {
                TimerKey::InvulnerabilityExpiry(id) => {
                    if let Some(player) = self.world.players.get_mut(&id) {
                        player.invulnerable = false;
                    }
                }
                TimerKey::TakeoffLock(id) => {
                    if let Some(player) = self.world.players.get_mut(&id) {
                        player.can_takeoff = true;
                    }
                }
                TimerKey::PlanetRemoval(planet_id) => {
                    if self.world.planets.contains_key(&planet_id) {
                        self.world.remove_planet(planet_id);
                        self.broadcast(&ServerMsg::PlanetRemoved { planet_id });
                        info!(planet = %planet_id, "Planet removed after grace window");
                    }
                }
            }
        }
    }

    /// Disconnects players idle past the timeout. Runs on its own coarser
    /// period and reuses the disconnect cleanup path.
    fn sweep_inactive(&mut self, now: i64) {
        if now - self.last_sweep_ms < self.world.cfg.inactivity_sweep_ms {
            return;
        }
        self.last_sweep_ms = now;

        let idle: Vec<PlayerId> = self
            .world
            .players
            .values()
            .filter(|p| now - p.last_active > self.world.cfg.inactivity_timeout_ms)
            .map(|p| p.id)
            .collect();

        for id in idle {
            self.cleanup_player(id, "inactive");
        }
    }

    /// Shared disconnect path: the player goes immediately, the planet after
    /// the grace delay. Safe to call twice for the same id.
    fn cleanup_player(&mut self, id: PlayerId, reason: &str) {
        let had_client = self.clients.remove(&id).is_some();
        let had_player = self.world.players.contains_key(&id);
        if !had_client && !had_player {
            return;
        }
        self.world.remove_player(id);
        self.broadcast(&ServerMsg::PlayerLeft { id });

        if self.world.planets.contains_key(&id) {
            self.timers.schedule(
                TimerKey::PlanetRemoval(id),
                now_ms() + self.world.cfg.planet_removal_delay_ms,
            );
        }
        info!(player = %id, reason, "Player removed");
    }

    /// Encodes the snapshot once and fans it out. Serialization failure
    /// degrades to a positions-only snapshot instead of dropping the tick.
    fn broadcast_snapshot(&mut self) {
        let full = ServerMsg::GameStateUpdate {
            state: self.world.snapshot(),
        };
        let payload = match encode_to_bytes(&full) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Snapshot serialization failed; sending minimal snapshot");
                let minimal = ServerMsg::GameStateUpdate {
                    state: self.world.minimal_snapshot(),
                };
                match encode_to_bytes(&minimal) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, "Minimal snapshot failed; skipping broadcast");
                        return;
                    }
                }
            }
        };
        self.broadcast_bytes(&payload);
    }

    fn broadcast_percentages(&mut self, now: i64) {
        let percentages = territory::control_percentages(
            &self.world.planets,
            self.world.cfg.control_window_ms,
            now,
        );
        self.broadcast(&ServerMsg::ControlPercentagesUpdate { percentages });
    }

    fn broadcast(&mut self, msg: &ServerMsg) {
        match encode_to_bytes(msg) {
            Ok(payload) => self.broadcast_bytes(&payload),
            Err(e) => warn!(error = %e, "Failed to encode broadcast message"),
        }
    }

    fn broadcast_bytes(&self, payload: &Bytes) {
        for (id, tx) in &self.clients {
            if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(payload.clone()) {
                debug!(player = %id, "Outbound queue full; dropping frame");
            }
        }
    }

    fn broadcast_except(&self, skip: PlayerId, msg: &ServerMsg) {
        let Ok(payload) = encode_to_bytes(msg) else {
            return;
        };
        for (id, tx) in &self.clients {
            if *id == skip {
                continue;
            }
            if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(payload.clone()) {
                debug!(player = %id, "Outbound queue full; dropping frame");
            }
        }
    }

    fn send_to(&self, id: PlayerId, msg: &ServerMsg) {
        let Some(tx) = self.clients.get(&id) else {
            return;
        };
        if let Ok(payload) = encode_to_bytes(msg) {
            let _ = tx.try_send(payload);
        }
    }
}

/// Helper for tests: bind to an ephemeral port and return the reachable
/// config.
pub async fn bind_ephemeral() -> anyhow::Result<(GameServer, SimConfig)> {
    bind_ephemeral_with(SimConfig::default()).await
}

/// Like `bind_ephemeral`, but keeps the caller's timing overrides (short
/// grace windows, sweep periods, ...).
pub async fn bind_ephemeral_with(cfg: SimConfig) -> anyhow::Result<(GameServer, SimConfig)> {
    let cfg = SimConfig {
        server_addr: "127.0.0.1:0".to_string(),
        ..cfg
    };
    let server = GameServer::bind(cfg).await?;
    let addr = server.local_addr()?;

    let mut cfg = server.cfg.clone();
    cfg.server_addr = addr.to_string();
    Ok((server, cfg))
}
