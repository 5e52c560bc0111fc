//! Physics kernel.
//!
//! One fixed-step integrator shared by the authoritative server tick and by
//! client-side prediction/replay. Determinism notes:
//! - All constants are per-tick; no wall-clock time enters the kernel.
//! - Same input + same planet set => bitwise identical output, which is what
//!   makes reconciliation replay exact.
//!
//! Gravity is an explicit O(entities × planets) pass with per-kind cutoff
//! radii; no spatial index at expected entity counts.

use crate::config::SimConfig;
use crate::math::Vec2;

/// Minimal view of a planet for gravity purposes. Built per tick from the
/// planet map (server) or from the latest snapshot (client prediction).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GravitySource {
    pub pos: Vec2,
    pub radius: f32,
}

/// Sum of gravitational accelerations on a body at `pos`.
///
/// Each source within `cutoff_mult * radius` contributes
/// `scale * g * radius / dist²` toward its center. Planet radius stands in
/// for mass; the force is added directly to velocity, not mass-normalized.
pub fn gravity_accel(
    pos: Vec2,
    sources: &[GravitySource],
    cutoff_mult: f32,
    scale: f32,
    cfg: &SimConfig,
) -> Vec2 {
    let mut accel = Vec2::ZERO;
    for source in sources {
        let to_center = source.pos - pos;
        let dist_sq = to_center.len_sq();
        let cutoff = cutoff_mult * source.radius;
        if dist_sq <= f32::EPSILON || dist_sq > cutoff * cutoff {
            continue;
        }
        let magnitude = scale * cfg.gravity * source.radius / dist_sq;
        accel += to_center.normalized() * magnitude;
    }
    accel
}

/// Wraps a coordinate exceeding ±half the world size to the opposite edge.
pub fn wrap_position(pos: &mut Vec2, world_size: f32) {
    let half = world_size / 2.0;
    if pos.x > half {
        pos.x -= world_size;
    } else if pos.x < -half {
        pos.x += world_size;
    }
    if pos.y > half {
        pos.y -= world_size;
    } else if pos.y < -half {
        pos.y += world_size;
    }
}

/// Advances a ship by one tick: thrust, gravity, drag, speed clamp,
/// integration, world wrap. Landed ships must not be stepped.
pub fn step_ship(
    pos: &mut Vec2,
    vel: &mut Vec2,
    angle_deg: f32,
    thrusting: bool,
    sources: &[GravitySource],
    cfg: &SimConfig,
) {
    if thrusting {
        *vel += Vec2::from_angle_deg(angle_deg) * cfg.thrust_power;
    }

    *vel += gravity_accel(*pos, sources, cfg.player_gravity_cutoff, 1.0, cfg);

    *vel = *vel * cfg.drag;

    let speed = vel.len();
    if speed > cfg.max_speed {
        *vel = vel.normalized() * cfg.max_speed;
    }

    *pos += *vel;
    wrap_position(pos, cfg.world_size);
}

/// Advances a bullet by one tick: reduced gravity, integration, world wrap.
/// No thrust, no drag; lifetime expiry is the caller's concern.
pub fn step_bullet(pos: &mut Vec2, vel: &mut Vec2, sources: &[GravitySource], cfg: &SimConfig) {
    *vel += gravity_accel(
        *pos,
        sources,
        cfg.bullet_gravity_cutoff,
        cfg.bullet_gravity_scale,
        cfg,
    );
    *pos += *vel;
    wrap_position(pos, cfg.world_size);
}
