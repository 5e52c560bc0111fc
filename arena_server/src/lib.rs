//! `arena_server`
//!
//! Server-side systems:
//! - Fixed timestep simulation loop
//! - Authoritative world state (players, bullets, planets)
//! - Collision and landing resolution
//! - Territory control aggregation
//! - Snapshot and event broadcast over TCP frames
//!
//! Concurrency model: per-client I/O tasks forward everything to a single
//! simulation task; handlers and the tick never run concurrently.

pub mod collision;
pub mod server;
pub mod territory;
pub mod timers;
pub mod world;

pub use server::GameServer;
