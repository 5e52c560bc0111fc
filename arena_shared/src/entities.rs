//! Simulation entities.
//!
//! Plain owned data, mutated only by the server's serialized simulation task.
//! Bullets are transient values owned solely by the world's bullet list; no
//! entity holds a back-reference to another, only ids.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::math::Vec2;

static NEXT_PLAYER_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies a connected player. Doubles as the identity of the planet
/// created for that player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

impl PlayerId {
    pub fn new_unique() -> Self {
        PlayerId(NEXT_PLAYER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A planet's stable identity: the id of the player it was created for.
/// Distinct from `Planet::owner_id`, which changes when the planet is claimed.
pub type PlanetId = PlayerId;

/// A piloted ship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub pos: Vec2,
    /// Heading in degrees, wrapped to `[0, 360)`.
    pub angle: f32,
    pub vel: Vec2,
    /// Thrust intent from the latest input.
    pub thrusting: bool,
    pub invulnerable: bool,
    /// Planet the player is currently landed on, if any. While set, angle is
    /// frozen and velocity is zero.
    pub landed_on: Option<PlanetId>,
    /// Briefly false after landing to prevent claim/crash oscillation.
    pub can_takeoff: bool,
    /// Display name, at most the configured maximum length.
    pub name: String,
    /// 24-bit RGB.
    pub color: u32,
    /// Sequence number of the last input applied by the server.
    pub last_processed_input: Option<u32>,
    /// Earliest time the player may fire again (ms).
    pub next_shot_at: i64,
    /// Last time any input arrived from this player (ms).
    pub last_active: i64,
}

impl Player {
    pub fn new(id: PlayerId, pos: Vec2, now_ms: i64) -> Self {
        Self {
            id,
            pos,
            angle: 0.0,
            vel: Vec2::ZERO,
            thrusting: false,
            invulnerable: false,
            landed_on: None,
            can_takeoff: true,
            name: format!("Player {}", id),
            color: 0xff_ff_ff,
            last_processed_input: None,
            next_shot_at: 0,
            last_active: now_ms,
        }
    }
}

/// A projectile in flight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bullet {
    pub pos: Vec2,
    pub vel: Vec2,
    pub owner: PlayerId,
    /// Creation time (ms); bullets expire after the configured lifetime.
    pub created_at: i64,
}

/// A surface impact mark.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Crater {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    /// Impact angle in degrees relative to the planet center.
    pub angle: f32,
}

/// One entry in a planet's ownership history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OwnershipRecord {
    pub owner: PlayerId,
    pub color: u32,
    /// Wall-clock ms. Strictly increasing within one planet's history.
    pub at_ms: i64,
}

/// A gravitating, claimable planet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Planet {
    /// Stable identity: the creating player's id.
    pub id: PlanetId,
    pub pos: Vec2,
    pub radius: f32,
    pub color: u32,
    /// Current owner; diverges from `id` once claimed by another player.
    pub owner_id: PlayerId,
    /// Append-only ownership log, strictly increasing in timestamp.
    pub history: Vec<OwnershipRecord>,
    pub craters: Vec<Crater>,
    /// Cosmetic variant picked at creation, carried on the wire.
    pub planet_type: u8,
    /// Set once the severe-damage notification has been sent.
    pub severe_damage_notified: bool,
}

impl Planet {
    pub fn new(id: PlanetId, pos: Vec2, radius: f32, color: u32, planet_type: u8, now_ms: i64) -> Self {
        Self {
            id,
            pos,
            radius,
            color,
            owner_id: id,
            history: vec![OwnershipRecord {
                owner: id,
                color,
                at_ms: now_ms,
            }],
            craters: Vec::new(),
            planet_type,
            severe_damage_notified: false,
        }
    }

    /// Transfers ownership to `owner`, appending a history record.
    ///
    /// Returns the previous owner. Timestamp ties with the last record are
    /// bumped by 1 ms so the history stays strictly increasing.
    pub fn claim(&mut self, owner: PlayerId, color: u32, now_ms: i64) -> PlayerId {
        let previous = self.owner_id;
        let at_ms = match self.history.last() {
            Some(last) if now_ms <= last.at_ms => last.at_ms + 1,
            _ => now_ms,
        };
        self.history.push(OwnershipRecord { owner, color, at_ms });
        self.owner_id = owner;
        self.color = color;
        previous
    }
}

/// Current wall-clock time in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_updates_owner_and_history() {
        let creator = PlayerId(1);
        let mut planet = Planet::new(creator, Vec2::ZERO, 100.0, 0xff0000, 0, 1_000);
        let lander = PlayerId(2);

        let previous = planet.claim(lander, 0x00ff00, 2_000);
        assert_eq!(previous, creator);
        assert_eq!(planet.owner_id, lander);
        assert_eq!(planet.color, 0x00ff00);
        assert_eq!(planet.history.len(), 2);
    }

    #[test]
    fn history_timestamps_strictly_increase() {
        let mut planet = Planet::new(PlayerId(1), Vec2::ZERO, 100.0, 0, 0, 5_000);
        // Same-millisecond claims must still produce increasing timestamps.
        planet.claim(PlayerId(2), 1, 5_000);
        planet.claim(PlayerId(3), 2, 5_000);

        let stamps: Vec<i64> = planet.history.iter().map(|r| r.at_ms).collect();
        for pair in stamps.windows(2) {
            assert!(pair[0] < pair[1], "timestamps not strictly increasing: {stamps:?}");
        }
    }
}
