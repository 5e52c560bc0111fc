//! Authoritative world state.
//!
//! One owned aggregate (players map, bullets list, planets map) mutated only
//! by the simulation task: message handlers run strictly between ticks, the
//! tick itself runs on the same task, so no mutation is ever concurrent.
//!
//! Discrete occurrences (joins, claims, hits, ...) are returned as the wire
//! events they become; the protocol is their only consumer.

use std::collections::HashMap;

use rand::Rng;
use tracing::{info, warn};

use arena_shared::config::SimConfig;
use arena_shared::entities::{Bullet, Planet, PlanetId, Player, PlayerId};
use arena_shared::math::{wrap_angle_deg, Vec2};
use arena_shared::net::{
    BulletSnapshot, PlanetSnapshot, PlayerSnapshot, ServerMsg, WorldSnapshot,
};
use arena_shared::physics::{self, GravitySource};

/// The single authoritative world aggregate.
pub struct World {
    pub cfg: SimConfig,
    pub players: HashMap<PlayerId, Player>,
    pub bullets: Vec<Bullet>,
    pub planets: HashMap<PlanetId, Planet>,
}

impl World {
    pub fn new(cfg: SimConfig) -> Self {
        Self {
            cfg,
            players: HashMap::new(),
            bullets: Vec::new(),
            planets: HashMap::new(),
        }
    }

    /// Gravity views of every live planet, rebuilt per tick.
    pub fn gravity_sources(&self) -> Vec<GravitySource> {
        self.planets
            .values()
            .map(|p| GravitySource {
                pos: p.pos,
                radius: p.radius,
            })
            .collect()
    }

    /// Random point on the spawn ring around the origin.
    pub fn random_spawn_point(&self) -> Vec2 {
        let mut rng = rand::thread_rng();
        let angle: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
        let dist: f32 = rng.gen_range(self.cfg.spawn_ring_min..=self.cfg.spawn_ring_max);
        Vec2::new(angle.cos() * dist, angle.sin() * dist)
    }

    /// Creates a player at a fresh spawn point.
    pub fn spawn_player(&mut self, id: PlayerId, now_ms: i64) -> &Player {
        let player = Player::new(id, self.random_spawn_point(), now_ms);
        info!(player = %id, x = player.pos.x, y = player.pos.y, "Player spawned");
        self.players.entry(id).or_insert(player)
    }

    /// Repositions a player after a fatal collision. The player keeps their
    /// identity and info; invulnerability is not granted on respawn.
    pub fn respawn_player(&mut self, id: PlayerId) {
        let spawn = self.random_spawn_point();
        if let Some(player) = self.players.get_mut(&id) {
            player.pos = spawn;
            player.vel = Vec2::ZERO;
            player.thrusting = false;
            player.invulnerable = false;
            player.landed_on = None;
            player.can_takeoff = true;
        }
    }

    /// Places a planet for `creator` via rejection sampling.
    ///
    /// Candidates are 800–1200 units from the creator with radius 80–160;
    /// a candidate within `r_a + r_b + separation` of any existing planet is
    /// rejected. If the attempt budget runs out the last candidate is used
    /// anyway and the degradation is logged.
    pub fn place_planet(&mut self, creator: PlayerId, now_ms: i64) -> &Planet {
        let anchor = self
            .players
            .get(&creator)
            .map(|p| p.pos)
            .unwrap_or(Vec2::ZERO);
        let color = self
            .players
            .get(&creator)
            .map(|p| p.color)
            .unwrap_or(0xff_ff_ff);

        let mut rng = rand::thread_rng();
        let mut candidate = Vec2::ZERO;
        let mut radius = self.cfg.planet_radius_min;
        let mut placed = false;

        for attempt in 0..self.cfg.placement_attempts {
            let angle: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
            let dist: f32 =
                rng.gen_range(self.cfg.planet_distance_min..=self.cfg.planet_distance_max);
            candidate = anchor + Vec2::new(angle.cos(), angle.sin()) * dist;
            radius = rng.gen_range(self.cfg.planet_radius_min..=self.cfg.planet_radius_max);

            let overlaps = self.planets.values().any(|other| {
                candidate.distance(other.pos) < other.radius + radius + self.cfg.planet_separation
            });
            if !overlaps {
                placed = true;
                if attempt > 0 {
                    info!(planet = %creator, attempts = attempt + 1, "Planet placed after retries");
                }
                break;
            }
        }

        if !placed {
            warn!(
                planet = %creator,
                attempts = self.cfg.placement_attempts,
                "Planet placement budget exhausted; using best-effort position"
            );
        }

        let planet_type = rng.gen_range(0..4u8);
        let planet = Planet::new(creator, candidate, radius, color, planet_type, now_ms);
        self.planets.entry(creator).or_insert(planet)
    }

    /// Applies one validated input command.
    ///
    /// Malformed values (non-finite angle) drop the whole command for this
    /// tick; the player's other state is untouched.
    pub fn apply_input(
        &mut self,
        id: PlayerId,
        is_thrusting: bool,
        angle: f32,
        is_shooting: bool,
        sequence_number: u32,
        now_ms: i64,
    ) -> Vec<ServerMsg> {
        if !angle.is_finite() {
            return Vec::new();
        }
        let (landed_on, can_takeoff) = {
            let Some(player) = self.players.get_mut(&id) else {
                return Vec::new();
            };
            player.last_active = now_ms;
            player.last_processed_input = Some(sequence_number);
            (player.landed_on, player.can_takeoff)
        };

        let mut events = Vec::new();

        match landed_on {
            Some(planet_id) => {
                // Angle stays frozen while landed. A thrust input with the
                // takeoff lock elapsed lifts the player off.
                if is_thrusting && can_takeoff {
                    events.extend(self.takeoff(id, planet_id));
                }
            }
            None => {
                if let Some(player) = self.players.get_mut(&id) {
                    player.angle = wrap_angle_deg(angle);
                    player.thrusting = is_thrusting;
                }
            }
        }

        if is_shooting {
            self.try_fire(id, now_ms);
        }

        events
    }

    /// Lifts a landed player off `planet_id`: reposition to clearance, boost
    /// along the outward radius, grant temporary invulnerability.
    fn takeoff(&mut self, id: PlayerId, planet_id: PlanetId) -> Vec<ServerMsg> {
        let Some(planet) = self.planets.get(&planet_id) else {
            // Planet vanished while landed; just unfreeze the player.
            if let Some(player) = self.players.get_mut(&id) {
                player.landed_on = None;
            }
            return Vec::new();
        };
        let (center, radius) = (planet.pos, planet.radius);

        let Some(player) = self.players.get_mut(&id) else {
            return Vec::new();
        };

        let outward = (player.pos - center).normalized();
        player.pos =
            center + outward * (radius + self.cfg.surface_clearance + self.cfg.takeoff_clearance);
        player.vel = outward * self.cfg.takeoff_boost;
        player.landed_on = None;
        player.invulnerable = true;

        vec![ServerMsg::PlayerTakeoff { id, planet_id }]
    }

    /// Fires a bullet if the per-player cooldown has elapsed.
    fn try_fire(&mut self, id: PlayerId, now_ms: i64) {
        let Some(player) = self.players.get_mut(&id) else {
            return;
        };
        if now_ms < player.next_shot_at {
            return;
        }
        player.next_shot_at = now_ms + self.cfg.shoot_cooldown_ms;

        let heading = Vec2::from_angle_deg(player.angle);
        self.bullets.push(Bullet {
            pos: player.pos,
            vel: heading * self.cfg.bullet_speed + player.vel,
            owner: id,
            created_at: now_ms,
        });
    }

    /// Applies a name/color change. Returns the broadcast event when
    /// anything actually changed. Counts as activity either way, so a client
    /// that only edits its info is not swept as idle.
    pub fn update_player_info(
        &mut self,
        id: PlayerId,
        name: Option<String>,
        color: Option<u32>,
        now_ms: i64,
    ) -> Option<ServerMsg> {
        let max_len = self.cfg.max_name_len;
        let player = self.players.get_mut(&id)?;
        player.last_active = now_ms;

        let mut changed = false;
        if let Some(name) = name {
            let trimmed: String = name.chars().take(max_len).collect();
            if !trimmed.is_empty() && trimmed != player.name {
                player.name = trimmed;
                changed = true;
            }
        }
        if let Some(color) = color {
            let masked = color & 0x00ff_ffff;
            if masked != player.color {
                player.color = masked;
                changed = true;
            }
        }

        changed.then(|| ServerMsg::PlayerInfoUpdate {
            id,
            name: player.name.clone(),
            color: player.color,
        })
    }

    /// Advances every non-landed player and every bullet by one tick.
    pub fn integrate(&mut self) {
        let sources = self.gravity_sources();

        for player in self.players.values_mut() {
            if player.landed_on.is_some() {
                // Landed: frozen angle, zero velocity.
                player.vel = Vec2::ZERO;
                continue;
            }
            physics::step_ship(
                &mut player.pos,
                &mut player.vel,
                player.angle,
                player.thrusting,
                &sources,
                &self.cfg,
            );
        }

        for bullet in &mut self.bullets {
            physics::step_bullet(&mut bullet.pos, &mut bullet.vel, &sources, &self.cfg);
        }
    }

    pub fn remove_player(&mut self, id: PlayerId) {
        self.players.remove(&id);
        self.bullets.retain(|b| b.owner != id);
    }

    /// Removes a planet, releasing any players still landed on it.
    pub fn remove_planet(&mut self, id: PlanetId) {
        if self.planets.remove(&id).is_none() {
            return;
        }
        for player in self.players.values_mut() {
            if player.landed_on == Some(id) {
                player.landed_on = None;
                player.can_takeoff = true;
            }
        }
    }

    /// Projects one player into its snapshot DTO.
    pub fn player_snapshot(&self, player: &Player) -> PlayerSnapshot {
        PlayerSnapshot {
            x: player.pos.x,
            y: player.pos.y,
            angle: player.angle,
            velocity_x: player.vel.x,
            velocity_y: player.vel.y,
            name: player.name.clone(),
            color: player.color,
            invulnerable: player.invulnerable,
            last_processed_input: player.last_processed_input,
            landed_on_planet: player.landed_on,
        }
    }

    /// Projects one planet into its snapshot DTO.
    pub fn planet_snapshot(&self, planet: &Planet) -> PlanetSnapshot {
        PlanetSnapshot {
            owner_id: planet.owner_id,
            x: planet.pos.x,
            y: planet.pos.y,
            radius: planet.radius,
            color: planet.color,
            craters: planet.craters.clone(),
            planet_type: planet.planet_type,
        }
    }

    /// Full snapshot projection, built field by field from internal state.
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            players: self
                .players
                .iter()
                .map(|(id, p)| (*id, self.player_snapshot(p)))
                .collect(),
            bullets: self
                .bullets
                .iter()
                .map(|b| BulletSnapshot {
                    x: b.pos.x,
                    y: b.pos.y,
                    velocity_x: b.vel.x,
                    velocity_y: b.vel.y,
                    owner_id: b.owner,
                    created_at: b.created_at,
                })
                .collect(),
            planets: self
                .planets
                .iter()
                .map(|(id, p)| (*id, self.planet_snapshot(p)))
                .collect(),
        }
    }

    /// Positions-only fallback used when full snapshot serialization fails.
    /// Carries no input acks, which switches clients to soft correction.
    pub fn minimal_snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            players: self
                .players
                .iter()
                .map(|(id, p)| {
                    (
                        *id,
                        PlayerSnapshot {
                            x: p.pos.x,
                            y: p.pos.y,
                            angle: p.angle,
                            velocity_x: 0.0,
                            velocity_y: 0.0,
                            name: String::new(),
                            color: p.color,
                            invulnerable: p.invulnerable,
                            last_processed_input: None,
                            landed_on_planet: p.landed_on,
                        },
                    )
                })
                .collect(),
            bullets: Vec::new(),
            planets: HashMap::new(),
        }
    }
}
