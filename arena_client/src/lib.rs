//! `arena_client`
//!
//! Client-side systems:
//! - Local prediction through the shared physics kernel
//! - Reconciliation against acknowledged inputs (hard reset + replay)
//! - Soft position correction when snapshots carry no ack
//! - Remote player interpolation between snapshots
//! - Framed TCP connection and event handling

pub mod client;
pub mod interp;
pub mod predict;

pub use client::GameClient;
