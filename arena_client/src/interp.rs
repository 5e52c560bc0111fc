//! Remote player interpolation.
//!
//! Remote ships are never predicted. Each snapshot becomes an interpolation
//! target: the current rendered state becomes the start, progress resets,
//! and every frame advances progress at a fixed rate toward the target.
//! Angles interpolate along the shortest arc so a 350° to 10° turn does not
//! spin the long way around.

use arena_shared::math::{lerp_angle_deg, Vec2};

/// Default per-frame progress; snapshots arrive every few rendered frames.
pub const DEFAULT_RATE: f32 = 0.35;

/// Interpolated view of one remote ship.
#[derive(Debug, Clone, Copy)]
pub struct RemoteInterpolator {
    start_pos: Vec2,
    start_angle: f32,
    target_pos: Vec2,
    target_angle: f32,
    progress: f32,
    rate: f32,
}

impl RemoteInterpolator {
    pub fn new(pos: Vec2, angle: f32) -> Self {
        Self {
            start_pos: pos,
            start_angle: angle,
            target_pos: pos,
            target_angle: angle,
            progress: 1.0,
            rate: DEFAULT_RATE,
        }
    }

    /// Adopts a fresh snapshot: the currently rendered state becomes the new
    /// start and progress restarts.
    pub fn set_target(&mut self, pos: Vec2, angle: f32) {
        let (current_pos, current_angle) = self.current();
        self.start_pos = current_pos;
        self.start_angle = current_angle;
        self.target_pos = pos;
        self.target_angle = angle;
        self.progress = 0.0;
    }

    /// Advances one rendered frame.
    pub fn advance(&mut self) {
        self.progress = (self.progress + self.rate).min(1.0);
    }

    /// Current rendered position and heading.
    pub fn current(&self) -> (Vec2, f32) {
        let pos = self.start_pos.lerp(self.target_pos, self.progress);
        let angle = lerp_angle_deg(self.start_angle, self.target_angle, self.progress);
        (pos, angle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaches_target_and_stays() {
        let mut interp = RemoteInterpolator::new(Vec2::ZERO, 0.0);
        interp.set_target(Vec2::new(10.0, 0.0), 0.0);

        for _ in 0..10 {
            interp.advance();
        }
        let (pos, _) = interp.current();
        assert!((pos.x - 10.0).abs() < 1e-6);

        interp.advance();
        let (pos, _) = interp.current();
        assert!((pos.x - 10.0).abs() < 1e-6, "must clamp at the target");
    }

    #[test]
    fn new_target_starts_from_rendered_state() {
        let mut interp = RemoteInterpolator::new(Vec2::ZERO, 0.0);
        interp.set_target(Vec2::new(10.0, 0.0), 0.0);
        interp.advance();
        let (mid, _) = interp.current();
        assert!(mid.x > 0.0 && mid.x < 10.0);

        // Retargeting mid-flight must not snap back to the old start.
        interp.set_target(Vec2::new(20.0, 0.0), 0.0);
        let (pos, _) = interp.current();
        assert!((pos.x - mid.x).abs() < 1e-6);
    }

    #[test]
    fn angle_takes_shortest_path_across_wrap() {
        let mut interp = RemoteInterpolator::new(Vec2::ZERO, 350.0);
        interp.set_target(Vec2::ZERO, 10.0);
        interp.advance();
        let (_, angle) = interp.current();
        // Halfway-ish through a +20° arc, never through 180°.
        assert!(
            !(30.0..330.0).contains(&angle),
            "angle {angle} went the long way"
        );
    }
}
