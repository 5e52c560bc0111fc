//! Ownership and territory tracking.
//!
//! Derives a per-color control percentage over a trailing window from each
//! planet's ownership history. Pure read-side aggregation; never mutates
//! entity state. Recomputed and broadcast every tick.

use std::collections::HashMap;

use arena_shared::entities::{Planet, PlanetId};

/// Percentage of control per color over the trailing window ending at
/// `now_ms`.
///
/// For each planet, each history entry owns the span up to the next entry
/// (or up to `now_ms` for the last one); spans are clipped to the window, so
/// entries older than the window contribute from the window start only.
/// Returns an empty map when no history intersects the window.
pub fn control_percentages(
    planets: &HashMap<PlanetId, Planet>,
    window_ms: i64,
    now_ms: i64,
) -> HashMap<u32, f32> {
    let window_start = now_ms - window_ms;
    let mut durations: HashMap<u32, i64> = HashMap::new();

    for planet in planets.values() {
        for (i, record) in planet.history.iter().enumerate() {
            let span_end = planet
                .history
                .get(i + 1)
                .map(|next| next.at_ms)
                .unwrap_or(now_ms);

            let clipped_start = record.at_ms.max(window_start);
            let clipped_end = span_end.min(now_ms);
            if clipped_end > clipped_start {
                *durations.entry(record.color).or_default() += clipped_end - clipped_start;
            }
        }
    }

    let total: i64 = durations.values().sum();
    if total <= 0 {
        return HashMap::new();
    }

    durations
        .into_iter()
        .map(|(color, ms)| (color, 100.0 * ms as f32 / total as f32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_shared::entities::{Planet, PlayerId};
    use arena_shared::math::Vec2;

    const RED: u32 = 0xff0000;
    const BLUE: u32 = 0x0000ff;

    fn planet(creator: u32, color: u32, created_at: i64) -> Planet {
        Planet::new(PlayerId(creator), Vec2::ZERO, 100.0, color, 0, created_at)
    }

    #[test]
    fn no_planets_yields_empty_map() {
        assert!(control_percentages(&HashMap::new(), 60_000, 1_000_000).is_empty());
    }

    #[test]
    fn single_owner_gets_full_control() {
        let mut planets = HashMap::new();
        planets.insert(PlayerId(1), planet(1, RED, 0));

        let pct = control_percentages(&planets, 60_000, 30_000);
        assert_eq!(pct.len(), 1);
        assert!((pct[&RED] - 100.0).abs() < 1e-3);
    }

    #[test]
    fn percentages_sum_to_100() {
        let mut planets = HashMap::new();
        let mut p = planet(1, RED, 0);
        p.claim(PlayerId(2), BLUE, 40_000);
        planets.insert(PlayerId(1), p);
        planets.insert(PlayerId(3), planet(3, RED, 10_000));

        let pct = control_percentages(&planets, 60_000, 60_000);
        let total: f32 = pct.values().sum();
        assert!((total - 100.0).abs() < 1e-3, "total {total}");
    }

    #[test]
    fn claim_splits_window_proportionally() {
        let mut planets = HashMap::new();
        let mut p = planet(1, RED, 0);
        // Window [40_000, 100_000]; red until 70_000, blue after: 50/50.
        p.claim(PlayerId(2), BLUE, 70_000);
        planets.insert(PlayerId(1), p);

        let pct = control_percentages(&planets, 60_000, 100_000);
        assert!((pct[&RED] - 50.0).abs() < 1e-3, "red {:?}", pct);
        assert!((pct[&BLUE] - 50.0).abs() < 1e-3, "blue {:?}", pct);
    }

    #[test]
    fn entries_before_window_floored_at_window_start() {
        let mut planets = HashMap::new();
        // Created long before the window; still counts only from the window
        // start, so a newer claim elsewhere gets its fair share.
        planets.insert(PlayerId(1), planet(1, RED, 0));
        planets.insert(PlayerId(2), planet(2, BLUE, 970_000));

        let pct = control_percentages(&planets, 60_000, 1_000_000);
        // Red: 60s within window. Blue: 30s.
        assert!((pct[&RED] - 200.0 / 3.0).abs() < 0.1, "{pct:?}");
        assert!((pct[&BLUE] - 100.0 / 3.0).abs() < 0.1, "{pct:?}");
    }

    #[test]
    fn history_entirely_outside_window_is_empty() {
        let mut planets = HashMap::new();
        planets.insert(PlayerId(1), planet(1, RED, 0));

        // The planet exists, so its last entry extends to `now`; only a
        // window placed entirely before creation is empty.
        let pct = control_percentages(&planets, 60_000, -10_000);
        assert!(pct.is_empty());
    }
}
