//! Collision and interaction resolver.
//!
//! Runs once per tick, after integration. Per bullet the checks are ordered:
//! lifetime expiry, then player hits, then planet hits; a bullet is removed
//! as soon as any check resolves. Player/planet landings and crashes are
//! resolved afterwards. Iteration is in ascending id order so competing
//! outcomes resolve the same way on every run.

use rand::Rng;

use arena_shared::entities::{Crater, PlanetId, PlayerId};
use arena_shared::math::{wrap_angle_deg, Vec2};
use arena_shared::net::ServerMsg;

use crate::world::World;

/// Resolves all collisions for this tick, mutating the world and returning
/// the discrete events to broadcast.
pub fn resolve(world: &mut World, now_ms: i64) -> Vec<ServerMsg> {
    let mut events = Vec::new();
    resolve_bullets(world, now_ms, &mut events);
    resolve_landings(world, now_ms, &mut events);
    events
}

fn resolve_bullets(world: &mut World, now_ms: i64, events: &mut Vec<ServerMsg>) {
    let bullets = std::mem::take(&mut world.bullets);
    let mut kept = Vec::with_capacity(bullets.len());

    let mut player_ids: Vec<PlayerId> = world.players.keys().copied().collect();
    player_ids.sort_unstable();
    let mut planet_ids: Vec<PlanetId> = world.planets.keys().copied().collect();
    planet_ids.sort_unstable();

    'bullets: for bullet in bullets {
        if now_ms - bullet.created_at >= world.cfg.bullet_lifetime_ms {
            continue;
        }

        // Player hits take precedence over planet hits within one tick.
        for &pid in &player_ids {
            let Some(player) = world.players.get(&pid) else {
                continue;
            };
            if pid == bullet.owner || player.invulnerable {
                continue;
            }
            if bullet.pos.distance(player.pos) < world.cfg.hit_radius {
                events.push(ServerMsg::PlayerHit {
                    id: pid,
                    by: bullet.owner,
                    x: player.pos.x,
                    y: player.pos.y,
                });
                world.respawn_player(pid);
                continue 'bullets;
            }
        }

        for &planet_id in &planet_ids {
            let Some(planet) = world.planets.get(&planet_id) else {
                continue;
            };
            if bullet.pos.distance(planet.pos) < planet.radius + world.cfg.surface_clearance {
                impact_planet(world, planet_id, bullet.pos, events);
                continue 'bullets;
            }
        }

        kept.push(bullet);
    }

    world.bullets = kept;
}

/// Records a bullet impact on a planet: hit event with the exact surface
/// coordinates, a crater, and a one-time severe-damage notification.
fn impact_planet(world: &mut World, planet_id: PlanetId, bullet_pos: Vec2, events: &mut Vec<ServerMsg>) {
    let severe_threshold = world.cfg.severe_damage_craters;
    let Some(planet) = world.planets.get_mut(&planet_id) else {
        return;
    };

    let outward = (bullet_pos - planet.pos).normalized();
    let impact = planet.pos + outward * planet.radius;
    let impact_angle = wrap_angle_deg(outward.y.atan2(outward.x).to_degrees());

    events.push(ServerMsg::PlanetHit {
        planet_id,
        x: impact.x,
        y: impact.y,
        impact_angle,
    });

    let crater = Crater {
        x: impact.x,
        y: impact.y,
        radius: rand::thread_rng().gen_range(6.0..14.0),
        angle: impact_angle,
    };
    planet.craters.push(crater);
    events.push(ServerMsg::CraterCreated { planet_id, crater });

    if planet.craters.len() >= severe_threshold && !planet.severe_damage_notified {
        planet.severe_damage_notified = true;
        events.push(ServerMsg::PlanetSeverelyDamaged { planet_id });
    }
}

fn resolve_landings(world: &mut World, now_ms: i64, events: &mut Vec<ServerMsg>) {
    let mut player_ids: Vec<PlayerId> = world.players.keys().copied().collect();
    player_ids.sort_unstable();

    for pid in player_ids {
        let Some(player) = world.players.get(&pid) else {
            continue;
        };
        if player.landed_on.is_some() {
            continue;
        }
        let (pos, vel, invulnerable, color) =
            (player.pos, player.vel, player.invulnerable, player.color);

        // Nearest planet whose surface is within the landing proximity band.
        let candidate = world
            .planets
            .values()
            .filter(|p| pos.distance(p.pos) < p.radius + world.cfg.landing_proximity)
            .min_by(|a, b| {
                let da = pos.distance(a.pos) - a.radius;
                let db = pos.distance(b.pos) - b.radius;
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|p| (p.id, p.pos, p.radius));

        let Some((planet_id, center, radius)) = candidate else {
            continue;
        };

        // Velocity component directed toward the planet center.
        let impact_speed = vel.dot((center - pos).normalized());

        if impact_speed > world.cfg.max_landing_speed && !invulnerable {
            events.push(ServerMsg::PlayerCrashed {
                id: pid,
                x: pos.x,
                y: pos.y,
            });
            world.respawn_player(pid);
            continue;
        }

        // Safe landing: snap to the surface, freeze, claim.
        let outward = (pos - center).normalized();
        let surface = center + outward * (radius + world.cfg.surface_clearance);
        let tangent_angle = wrap_angle_deg(outward.y.atan2(outward.x).to_degrees() + 90.0);

        if let Some(player) = world.players.get_mut(&pid) {
            player.pos = surface;
            player.angle = tangent_angle;
            player.vel = Vec2::ZERO;
            player.thrusting = false;
            player.landed_on = Some(planet_id);
            player.can_takeoff = false;
        }

        let Some(planet) = world.planets.get_mut(&planet_id) else {
            continue;
        };
        let previous_owner = planet.claim(pid, color, now_ms);
        let claimed = previous_owner != pid;
        let was_claimed = previous_owner != planet.id;

        events.push(ServerMsg::PlayerLanded {
            id: pid,
            planet_id,
            claimed,
            previous_owner,
            was_claimed,
        });
        events.push(ServerMsg::PlanetClaimed {
            planet_id,
            new_owner_id: pid,
            previous_owner_id: previous_owner,
            player_color: color,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_shared::config::SimConfig;
    use arena_shared::entities::{Bullet, Planet, Player};

    fn world() -> World {
        World::new(SimConfig::default())
    }

    fn add_player(world: &mut World, pos: Vec2) -> PlayerId {
        let id = PlayerId::new_unique();
        let mut player = Player::new(id, pos, 0);
        player.pos = pos;
        world.players.insert(id, player);
        id
    }

    fn add_planet(world: &mut World, creator: PlayerId, pos: Vec2, radius: f32) -> PlanetId {
        let planet = Planet::new(creator, pos, radius, 0xff0000, 0, 0);
        world.planets.insert(creator, planet);
        creator
    }

    #[test]
    fn bullet_expires_after_lifetime() {
        let mut w = world();
        let shooter = add_player(&mut w, Vec2::new(2_000.0, 2_000.0));
        w.bullets.push(Bullet {
            pos: Vec2::ZERO,
            vel: Vec2::ZERO,
            owner: shooter,
            created_at: 0,
        });

        let bullet_lifetime_ms = w.cfg.bullet_lifetime_ms;
        let events = resolve(&mut w, bullet_lifetime_ms);
        assert!(w.bullets.is_empty());
        assert!(events.is_empty(), "expiry is silent: {events:?}");
    }

    #[test]
    fn bullet_hit_respawns_player_with_pre_respawn_coords() {
        let mut w = world();
        let shooter = add_player(&mut w, Vec2::new(1_000.0, 1_000.0));
        let target_pos = Vec2::new(100.0, 50.0);
        let target = add_player(&mut w, target_pos);
        w.bullets.push(Bullet {
            pos: target_pos + Vec2::new(5.0, 0.0),
            vel: Vec2::ZERO,
            owner: shooter,
            created_at: 0,
        });

        let events = resolve(&mut w, 1);
        assert!(w.bullets.is_empty());

        let hit = events
            .iter()
            .find_map(|e| match e {
                ServerMsg::PlayerHit { id, by, x, y } => Some((*id, *by, *x, *y)),
                _ => None,
            })
            .expect("playerHit event");
        assert_eq!(hit.0, target);
        assert_eq!(hit.1, shooter);
        assert_eq!(hit.2, target_pos.x);
        assert_eq!(hit.3, target_pos.y);

        let respawned = &w.players[&target];
        assert!(respawned.pos.distance(target_pos) > 1.0, "should move to a new spawn");
        assert!(!respawned.invulnerable);
        assert_eq!(respawned.vel, Vec2::ZERO);
    }

    #[test]
    fn invulnerable_and_owner_are_not_hit() {
        let mut w = world();
        let shooter = add_player(&mut w, Vec2::new(0.0, 0.0));
        let shielded = add_player(&mut w, Vec2::new(10.0, 0.0));
        w.players.get_mut(&shielded).unwrap().invulnerable = true;

        // Bullet overlaps both its owner and the invulnerable player.
        w.bullets.push(Bullet {
            pos: Vec2::new(5.0, 0.0),
            vel: Vec2::ZERO,
            owner: shooter,
            created_at: 0,
        });

        let events = resolve(&mut w, 1);
        assert!(events.is_empty());
        assert_eq!(w.bullets.len(), 1, "bullet should survive the tick");
    }

    #[test]
    fn player_hit_takes_precedence_over_planet_hit() {
        let mut w = world();
        let shooter = add_player(&mut w, Vec2::new(2_000.0, 0.0));
        let target = add_player(&mut w, Vec2::new(100.0, 0.0));
        add_planet(&mut w, shooter, Vec2::new(100.0, 0.0), 120.0);

        w.bullets.push(Bullet {
            pos: Vec2::new(110.0, 0.0),
            vel: Vec2::ZERO,
            owner: PlayerId::new_unique(),
            created_at: 0,
        });

        let events = resolve(&mut w, 1);
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerMsg::PlayerHit { id, .. } if *id == target)));
        assert!(!events.iter().any(|e| matches!(e, ServerMsg::PlanetHit { .. })));
    }

    #[test]
    fn bullet_planet_impact_creates_crater_on_surface() {
        let mut w = world();
        let creator = PlayerId::new_unique();
        let center = Vec2::new(500.0, -200.0);
        let planet_id = add_planet(&mut w, creator, center, 100.0);

        w.bullets.push(Bullet {
            pos: center + Vec2::new(102.0, 0.0),
            vel: Vec2::ZERO,
            owner: PlayerId::new_unique(),
            created_at: 0,
        });

        let events = resolve(&mut w, 1);
        assert!(w.bullets.is_empty());

        let (x, y, angle) = events
            .iter()
            .find_map(|e| match e {
                ServerMsg::PlanetHit { x, y, impact_angle, .. } => Some((*x, *y, *impact_angle)),
                _ => None,
            })
            .expect("planetHit event");
        assert!((x - (center.x + 100.0)).abs() < 1e-3);
        assert!((y - center.y).abs() < 1e-3);
        assert!(angle.abs() < 1e-3, "impact from +x should be angle 0, got {angle}");

        assert!(events.iter().any(|e| matches!(e, ServerMsg::CraterCreated { .. })));
        assert_eq!(w.planets[&planet_id].craters.len(), 1);
    }

    #[test]
    fn severe_damage_notified_once() {
        let mut w = world();
        let creator = PlayerId::new_unique();
        let center = Vec2::new(800.0, 800.0);
        let planet_id = add_planet(&mut w, creator, center, 100.0);
        let threshold = w.cfg.severe_damage_craters;

        let mut severe_events = 0;
        for _ in 0..(threshold + 5) {
            w.bullets.push(Bullet {
                pos: center + Vec2::new(101.0, 0.0),
                vel: Vec2::ZERO,
                owner: PlayerId::new_unique(),
                created_at: 0,
            });
            let events = resolve(&mut w, 1);
            severe_events += events
                .iter()
                .filter(|e| matches!(e, ServerMsg::PlanetSeverelyDamaged { .. }))
                .count();
        }

        assert_eq!(severe_events, 1);
        assert_eq!(w.planets[&planet_id].craters.len(), threshold + 5);
    }

    #[test]
    fn slow_approach_lands_and_claims() {
        let mut w = world();
        let owner = PlayerId::new_unique();
        let center = Vec2::new(1_000.0, 0.0);
        let planet_id = add_planet(&mut w, owner, center, 100.0);

        let lander = add_player(&mut w, center + Vec2::new(110.0, 0.0));
        {
            let p = w.players.get_mut(&lander).unwrap();
            p.vel = Vec2::new(-1.0, 0.0); // gentle approach
            p.color = 0x00ff00;
        }

        let events = resolve(&mut w, 10_000);

        let landed = events
            .iter()
            .find_map(|e| match e {
                ServerMsg::PlayerLanded { id, claimed, previous_owner, was_claimed, .. } => {
                    Some((*id, *claimed, *previous_owner, *was_claimed))
                }
                _ => None,
            })
            .expect("playerLanded event");
        assert_eq!(landed, (lander, true, owner, false));

        assert!(events.iter().any(|e| matches!(
            e,
            ServerMsg::PlanetClaimed { new_owner_id, previous_owner_id, .. }
                if *new_owner_id == lander && *previous_owner_id == owner
        )));

        let planet = &w.planets[&planet_id];
        assert_eq!(planet.owner_id, lander);
        assert_eq!(planet.color, 0x00ff00);

        let p = &w.players[&lander];
        assert_eq!(p.landed_on, Some(planet_id));
        assert!(!p.can_takeoff);
        assert_eq!(p.vel, Vec2::ZERO);
        let surface_dist = p.pos.distance(center);
        assert!((surface_dist - (100.0 + w.cfg.surface_clearance)).abs() < 1e-3);
    }

    #[test]
    fn second_claim_reports_was_claimed() {
        let mut w = world();
        let creator = PlayerId::new_unique();
        let center = Vec2::new(-1_000.0, 500.0);
        add_planet(&mut w, creator, center, 100.0);

        let first = add_player(&mut w, center + Vec2::new(108.0, 0.0));
        w.players.get_mut(&first).unwrap().vel = Vec2::new(-0.5, 0.0);
        resolve(&mut w, 1_000);

        // First lander takes off again (simulated directly).
        {
            let p = w.players.get_mut(&first).unwrap();
            p.landed_on = None;
            p.pos = Vec2::new(2_000.0, 2_000.0);
        }

        let second = add_player(&mut w, center + Vec2::new(0.0, 108.0));
        w.players.get_mut(&second).unwrap().vel = Vec2::new(0.0, -0.5);
        let events = resolve(&mut w, 2_000);

        let was_claimed = events
            .iter()
            .find_map(|e| match e {
                ServerMsg::PlayerLanded { was_claimed, previous_owner, .. } => {
                    Some((*was_claimed, *previous_owner))
                }
                _ => None,
            })
            .expect("playerLanded event");
        assert_eq!(was_claimed, (true, first));
    }

    #[test]
    fn fast_impact_crashes_and_respawns() {
        let mut w = world();
        let creator = PlayerId::new_unique();
        let center = Vec2::new(0.0, 1_200.0);
        let planet_id = add_planet(&mut w, creator, center, 100.0);

        let start = center + Vec2::new(0.0, -110.0);
        let pilot = add_player(&mut w, start);
        w.players.get_mut(&pilot).unwrap().vel =
            Vec2::new(0.0, w.cfg.max_landing_speed + 2.0);

        let events = resolve(&mut w, 1);
        let crash = events
            .iter()
            .find_map(|e| match e {
                ServerMsg::PlayerCrashed { id, x, y } => Some((*id, *x, *y)),
                _ => None,
            })
            .expect("playerCrashed event");
        assert_eq!(crash, (pilot, start.x, start.y));

        let p = &w.players[&pilot];
        assert_eq!(p.landed_on, None);
        assert!(p.pos.distance(start) > 1.0, "should respawn elsewhere");
        // Crash never transfers ownership.
        assert_eq!(w.planets[&planet_id].owner_id, creator);
    }

    #[test]
    fn invulnerable_fast_approach_lands_safely() {
        let mut w = world();
        let creator = PlayerId::new_unique();
        let center = Vec2::new(400.0, 400.0);
        add_planet(&mut w, creator, center, 100.0);

        let pilot = add_player(&mut w, center + Vec2::new(110.0, 0.0));
        {
            let p = w.players.get_mut(&pilot).unwrap();
            p.vel = Vec2::new(-(w.cfg.max_landing_speed + 5.0), 0.0);
            p.invulnerable = true;
        }

        let events = resolve(&mut w, 1);
        assert!(!events.iter().any(|e| matches!(e, ServerMsg::PlayerCrashed { .. })));
        assert!(events.iter().any(|e| matches!(e, ServerMsg::PlayerLanded { .. })));
    }
}
