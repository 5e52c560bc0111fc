//! Configuration system.
//!
//! One `SimConfig` is shared by server and client so that prediction replays
//! the exact integration the authoritative tick performs. Loads from JSON
//! strings/files (file IO left to the app); every field has a default so a
//! partial config stays valid.

use serde::{Deserialize, Serialize};

/// Root configuration shared by client/server.
///
/// All physics constants are expressed per tick: the kernel integrates once
/// per fixed step, so changing `tick_hz` changes real-time pacing without
/// touching the constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Server listen address, e.g. `127.0.0.1:40200`.
    pub server_addr: String,
    /// Fixed simulation tick rate.
    pub tick_hz: u32,

    /// Side length of the toroidal world; coordinates wrap at ±world_size/2.
    pub world_size: f32,
    /// Acceleration added along the heading each tick while thrusting.
    pub thrust_power: f32,
    /// Speed clamp applied after forces.
    pub max_speed: f32,
    /// Multiplicative velocity decay per tick (players only).
    pub drag: f32,
    /// Gravitational constant; force per tick is `g * radius / dist²`.
    pub gravity: f32,
    /// Players feel a planet within `player_gravity_cutoff * radius`.
    pub player_gravity_cutoff: f32,
    /// Bullets feel a planet within `bullet_gravity_cutoff * radius`.
    pub bullet_gravity_cutoff: f32,
    /// Extra scaling applied to gravity acting on bullets.
    pub bullet_gravity_scale: f32,

    /// Maximum speed-toward-center that still counts as a safe landing.
    pub max_landing_speed: f32,
    /// A non-landed player within `radius + landing_proximity` of a surface
    /// is checked for landing/crash.
    pub landing_proximity: f32,
    /// Landed players sit at `radius + surface_clearance` from the center.
    pub surface_clearance: f32,
    /// Outward velocity granted on takeoff.
    pub takeoff_boost: f32,
    /// Takeoff repositions the player this far beyond the surface.
    pub takeoff_clearance: f32,
    /// Takeoff is locked for this long after landing.
    pub takeoff_lock_ms: i64,
    /// Invulnerability granted on takeoff.
    pub takeoff_invuln_ms: i64,

    /// Muzzle speed added along the heading when firing.
    pub bullet_speed: f32,
    /// Bullets expire after this long regardless of collisions.
    pub bullet_lifetime_ms: i64,
    /// Bullet-to-player collision distance.
    pub hit_radius: f32,
    /// Minimum delay between shots per player.
    pub shoot_cooldown_ms: i64,

    /// Players spawn on a ring this far from the origin.
    pub spawn_ring_min: f32,
    pub spawn_ring_max: f32,
    /// New planets are placed this far from their creator.
    pub planet_distance_min: f32,
    pub planet_distance_max: f32,
    pub planet_radius_min: f32,
    pub planet_radius_max: f32,
    /// Required gap beyond the two radii between any pair of planets.
    pub planet_separation: f32,
    /// Rejection-sampling attempt budget for planet placement.
    pub placement_attempts: u32,
    /// Grace delay before a disconnected player's planet is removed.
    pub planet_removal_delay_ms: i64,
    /// A planet with this many craters is reported as severely damaged.
    pub severe_damage_craters: usize,

    /// Trailing window for the control-percentage metric.
    pub control_window_ms: i64,

    /// Players idle past this are disconnected by the sweep.
    pub inactivity_timeout_ms: i64,
    /// Sweep period; coarser than the tick.
    pub inactivity_sweep_ms: i64,

    /// Display names are truncated to this many characters.
    pub max_name_len: usize,
    /// Without an input ack, the client only snaps to the server position
    /// past this divergence.
    pub soft_correction_threshold: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:40200".to_string(),
            tick_hz: 30,

            world_size: 5000.0,
            thrust_power: 0.15,
            max_speed: 8.0,
            drag: 0.99,
            gravity: 20.0,
            player_gravity_cutoff: 25.0,
            bullet_gravity_cutoff: 15.0,
            bullet_gravity_scale: 0.3,

            max_landing_speed: 3.0,
            landing_proximity: 15.0,
            surface_clearance: 5.0,
            takeoff_boost: 4.0,
            takeoff_clearance: 15.0,
            takeoff_lock_ms: 1_000,
            takeoff_invuln_ms: 1_500,

            bullet_speed: 10.0,
            bullet_lifetime_ms: 3_000,
            hit_radius: 30.0,
            shoot_cooldown_ms: 300,

            spawn_ring_min: 300.0,
            spawn_ring_max: 500.0,
            planet_distance_min: 800.0,
            planet_distance_max: 1_200.0,
            planet_radius_min: 80.0,
            planet_radius_max: 160.0,
            planet_separation: 400.0,
            placement_attempts: 20,
            planet_removal_delay_ms: 30_000,
            severe_damage_craters: 15,

            control_window_ms: 60_000,

            inactivity_timeout_ms: 120_000,
            inactivity_sweep_ms: 10_000,

            max_name_len: 20,
            soft_correction_threshold: 50.0,
        }
    }
}

impl SimConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Fixed tick period in seconds.
    pub fn tick_period_secs(&self) -> f32 {
        1.0 / self.tick_hz as f32
    }

    /// Half of the world side; the wrap boundary on each axis.
    pub fn half_world(&self) -> f32 {
        self.world_size / 2.0
    }
}
