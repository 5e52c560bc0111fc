//! `arena_shared`
//!
//! Shared libraries used by both the arena client and the authoritative
//! server.
//!
//! Design goals:
//! - Deterministic and modular where practical; the physics kernel is the
//!   same code on both ends so reconciliation replay is exact.
//! - Clear separation of concerns (net, entities, physics, math, config).
//! - No `unsafe`.

pub mod config;
pub mod entities;
pub mod math;
pub mod net;
pub mod physics;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::entities::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::physics::*;
}
