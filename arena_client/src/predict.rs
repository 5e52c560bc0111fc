//! Prediction and reconciliation.
//!
//! The local ship applies its own inputs immediately through the same physics
//! kernel the server runs, so an honest client and the server integrate
//! identical trajectories. Every input carries a sequence number and stays in
//! a pending queue until a snapshot acknowledges it; on each acknowledging
//! snapshot the body is hard-reset to the authoritative state and the
//! unacknowledged remainder is replayed in order. Snapshots without an ack
//! (degraded fallback) trigger a soft correction instead: the body snaps to
//! the server position only past a divergence threshold.

use std::collections::VecDeque;

use arena_shared::config::SimConfig;
use arena_shared::math::Vec2;
use arena_shared::net::PlayerSnapshot;
use arena_shared::physics::{step_ship, GravitySource};

/// One not-yet-acknowledged input.
#[derive(Debug, Clone, Copy)]
pub struct InputFrame {
    pub sequence_number: u32,
    pub is_thrusting: bool,
    pub angle: f32,
}

/// Locally predicted ship state.
#[derive(Debug, Clone, Copy, Default)]
pub struct PredictedBody {
    pub pos: Vec2,
    pub vel: Vec2,
    pub angle: f32,
}

/// Predicted local ship plus the pending-input queue.
pub struct Predictor {
    cfg: SimConfig,
    pub body: PredictedBody,
    pending: VecDeque<InputFrame>,
    next_sequence: u32,
    /// While landed the body is frozen; the server ignores steering and only
    /// a takeoff changes state.
    pub landed: bool,
}

impl Predictor {
    pub fn new(cfg: SimConfig) -> Self {
        Self {
            cfg,
            body: PredictedBody::default(),
            pending: VecDeque::new(),
            next_sequence: 0,
            landed: false,
        }
    }

    /// Seeds the body from an authoritative snapshot (join or respawn).
    pub fn reset_to(&mut self, snapshot: &PlayerSnapshot) {
        self.body = PredictedBody {
            pos: Vec2::new(snapshot.x, snapshot.y),
            vel: Vec2::new(snapshot.velocity_x, snapshot.velocity_y),
            angle: snapshot.angle,
        };
        self.landed = snapshot.landed_on_planet.is_some();
        self.pending.clear();
    }

    /// Records a local input, applies it immediately, and returns the frame
    /// to put on the wire.
    pub fn apply_local_input(
        &mut self,
        is_thrusting: bool,
        angle: f32,
        sources: &[GravitySource],
    ) -> InputFrame {
        self.next_sequence += 1;
        let frame = InputFrame {
            sequence_number: self.next_sequence,
            is_thrusting,
            angle,
        };
        self.pending.push_back(frame);
        self.step(frame, sources);
        frame
    }

    /// Reconciles against the authoritative view of the local player.
    pub fn reconcile(&mut self, me: &PlayerSnapshot, sources: &[GravitySource]) {
        self.landed = me.landed_on_planet.is_some();

        match me.last_processed_input {
            Some(ack) => {
                while matches!(self.pending.front(), Some(f) if f.sequence_number <= ack) {
                    self.pending.pop_front();
                }
                self.body = PredictedBody {
                    pos: Vec2::new(me.x, me.y),
                    vel: Vec2::new(me.velocity_x, me.velocity_y),
                    angle: me.angle,
                };
                let remainder: Vec<InputFrame> = self.pending.iter().copied().collect();
                for frame in remainder {
                    self.step(frame, sources);
                }
            }
            None => {
                // Degraded snapshot: positions only, no ack, velocity
                // fabricated as zero. Snap the position only, and only on
                // clear divergence, so predicted momentum survives.
                let server_pos = Vec2::new(me.x, me.y);
                if self.body.pos.distance(server_pos) > self.cfg.soft_correction_threshold {
                    self.body.pos = server_pos;
                }
            }
        }
    }

    /// Number of inputs awaiting acknowledgement.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn step(&mut self, frame: InputFrame, sources: &[GravitySource]) {
        if self.landed {
            return;
        }
        self.body.angle = frame.angle;
        step_ship(
            &mut self.body.pos,
            &mut self.body.vel,
            self.body.angle,
            frame.is_thrusting,
            sources,
            &self.cfg,
        );
    }
}
