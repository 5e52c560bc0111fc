//! Wire protocol.
//!
//! Goals:
//! - One persistent bidirectional channel per client: length-prefixed JSON
//!   frames over a single TCP stream.
//! - Every message is an explicit tagged variant with camelCase fields;
//!   payloads are schema-driven DTO projections of internal state, never a
//!   generic traversal of live entities.
//! - Keep serialization explicit and versionable.

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};

use crate::config::SimConfig;
use crate::entities::{Crater, PlanetId, PlayerId};

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Client → server messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMsg {
    /// Connection handshake.
    #[serde(rename_all = "camelCase")]
    Hello { protocol: u32 },

    /// Per-tick input command. The sequence number is strictly increasing
    /// per client and echoed back in snapshots for reconciliation.
    #[serde(rename_all = "camelCase")]
    PlayerInput {
        is_thrusting: bool,
        angle: f32,
        is_shooting: bool,
        sequence_number: u32,
    },

    /// Name/color change request; fields are optional and validated at the
    /// boundary.
    #[serde(rename_all = "camelCase")]
    UpdatePlayerInfo {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        color: Option<u32>,
    },
}

/// Server → client messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMsg {
    /// Handshake reply: assigned id plus the simulation constants the client
    /// needs to predict with the exact server integration.
    #[serde(rename_all = "camelCase")]
    Welcome { player_id: PlayerId, config: SimConfig },

    /// Full snapshot sent once on join.
    #[serde(rename_all = "camelCase")]
    GameState { state: WorldSnapshot },

    /// Full authoritative snapshot, broadcast every tick (not a delta).
    #[serde(rename_all = "camelCase")]
    GameStateUpdate { state: WorldSnapshot },

    /// Per-color control percentages over the trailing window.
    #[serde(rename_all = "camelCase")]
    ControlPercentagesUpdate { percentages: HashMap<u32, f32> },

    #[serde(rename_all = "camelCase")]
    PlayerJoined { id: PlayerId, player: PlayerSnapshot },

    #[serde(rename_all = "camelCase")]
    PlayerLeft { id: PlayerId },

    #[serde(rename_all = "camelCase")]
    PlayerInfoUpdate { id: PlayerId, name: String, color: u32 },

    #[serde(rename_all = "camelCase")]
    PlanetCreated { id: PlanetId, planet: PlanetSnapshot },

    /// A bullet struck a planet surface at the given point.
    #[serde(rename_all = "camelCase")]
    PlanetHit {
        planet_id: PlanetId,
        x: f32,
        y: f32,
        impact_angle: f32,
    },

    #[serde(rename_all = "camelCase")]
    CraterCreated { planet_id: PlanetId, crater: Crater },

    #[serde(rename_all = "camelCase")]
    PlanetRemoved { planet_id: PlanetId },

    /// Fatal surface impact; coordinates are the pre-respawn position.
    #[serde(rename_all = "camelCase")]
    PlayerCrashed { id: PlayerId, x: f32, y: f32 },

    #[serde(rename_all = "camelCase")]
    PlayerLanded {
        id: PlayerId,
        planet_id: PlanetId,
        /// True when the landing changed the planet's owner.
        claimed: bool,
        previous_owner: PlayerId,
        /// True when the pre-landing owner was not the planet's creator.
        was_claimed: bool,
    },

    #[serde(rename_all = "camelCase")]
    PlayerTakeoff { id: PlayerId, planet_id: PlanetId },

    #[serde(rename_all = "camelCase")]
    PlanetSeverelyDamaged { planet_id: PlanetId },

    #[serde(rename_all = "camelCase")]
    PlanetClaimed {
        planet_id: PlanetId,
        new_owner_id: PlayerId,
        previous_owner_id: PlayerId,
        player_color: u32,
    },

    /// A bullet struck a player; coordinates are the pre-respawn position.
    #[serde(rename_all = "camelCase")]
    PlayerHit { id: PlayerId, by: PlayerId, x: f32, y: f32 },
}

/// Per-player snapshot state.
///
/// Velocity is included so reconciliation can hard-reset the predicted body
/// to the authoritative values. `last_processed_input` is absent in degraded
/// snapshots, which switches clients to soft correction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub velocity_x: f32,
    pub velocity_y: f32,
    pub name: String,
    pub color: u32,
    pub invulnerable: bool,
    #[serde(default)]
    pub last_processed_input: Option<u32>,
    #[serde(default)]
    pub landed_on_planet: Option<PlanetId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BulletSnapshot {
    pub x: f32,
    pub y: f32,
    pub velocity_x: f32,
    pub velocity_y: f32,
    pub owner_id: PlayerId,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlanetSnapshot {
    pub owner_id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub color: u32,
    pub craters: Vec<Crater>,
    pub planet_type: u8,
}

/// Full world snapshot. A degraded snapshot carries players with positions
/// only (no input ack) and empty bullet/planet collections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorldSnapshot {
    pub players: HashMap<PlayerId, PlayerSnapshot>,
    pub bullets: Vec<BulletSnapshot>,
    pub planets: HashMap<PlanetId, PlanetSnapshot>,
}

/// Reading half of a framed connection.
#[derive(Debug)]
pub struct FrameReader {
    half: OwnedReadHalf,
}

/// Writing half of a framed connection.
#[derive(Debug)]
pub struct FrameWriter {
    half: OwnedWriteHalf,
}

/// Splits a TCP stream into framed halves so reads and writes can run on
/// independent tasks.
pub fn split_stream(stream: TcpStream) -> (FrameReader, FrameWriter) {
    let (read, write) = stream.into_split();
    (FrameReader { half: read }, FrameWriter { half: write })
}

impl FrameWriter {
    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(msg).context("serialize msg")?;
        self.send_bytes(&payload).await
    }

    /// Sends an already-serialized frame (snapshots are encoded once and
    /// fanned out to every client).
    pub async fn send_bytes(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        let mut buf = BytesMut::with_capacity(4 + payload.len());
        buf.put_u32(payload.len() as u32);
        buf.extend_from_slice(payload);
        self.half.write_all(&buf).await.context("tcp write")?;
        Ok(())
    }
}

impl FrameReader {
    pub async fn recv<T: DeserializeOwned>(&mut self) -> anyhow::Result<T> {
        let payload = self.recv_bytes().await?;
        let msg = serde_json::from_slice(&payload).context("deserialize msg")?;
        Ok(msg)
    }

    /// Reads one raw frame. Callers that tolerate malformed payloads decode
    /// separately so a bad frame is skipped, not fatal.
    pub async fn recv_bytes(&mut self) -> anyhow::Result<Bytes> {
        let mut len_buf = [0u8; 4];
        self.half
            .read_exact(&mut len_buf)
            .await
            .context("tcp read len")?;
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        self.half
            .read_exact(&mut payload)
            .await
            .context("tcp read payload")?;
        Ok(Bytes::from(payload))
    }
}

/// TCP server listener yielding framed connections.
pub struct FrameListener {
    listener: TcpListener,
}

impl FrameListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(FrameReader, FrameWriter, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        let (reader, writer) = split_stream(stream);
        Ok((reader, writer, addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Connects to a server and returns framed halves.
pub async fn connect(addr: SocketAddr) -> anyhow::Result<(FrameReader, FrameWriter)> {
    let stream = TcpStream::connect(addr).await.context("tcp connect")?;
    Ok(split_stream(stream))
}

/// Convenience codec helpers.
pub fn encode_to_bytes<T: Serialize>(msg: &T) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize")?;
    Ok(Bytes::from(payload))
}

pub fn decode_from_bytes<T: DeserializeOwned>(b: &[u8]) -> anyhow::Result<T> {
    serde_json::from_slice(b).context("deserialize")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_msg_roundtrip_bytes() {
        let msg = ClientMsg::PlayerInput {
            is_thrusting: true,
            angle: 123.5,
            is_shooting: false,
            sequence_number: 42,
        };
        let bytes = encode_to_bytes(&msg).unwrap();
        let back: ClientMsg = decode_from_bytes(&bytes).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn input_uses_camel_case_wire_names() {
        let msg = ClientMsg::PlayerInput {
            is_thrusting: true,
            angle: 0.0,
            is_shooting: true,
            sequence_number: 7,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "playerInput");
        assert_eq!(value["isThrusting"], true);
        assert_eq!(value["sequenceNumber"], 7);
    }

    #[test]
    fn server_events_tagged_by_name() {
        let msg = ServerMsg::PlanetClaimed {
            planet_id: PlayerId(3),
            new_owner_id: PlayerId(9),
            previous_owner_id: PlayerId(3),
            player_color: 0x00ff00,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "planetClaimed");
        assert_eq!(value["newOwnerId"], 9);
        assert_eq!(value["previousOwnerId"], 3);
    }

    #[test]
    fn snapshot_player_map_roundtrip() {
        let mut players = HashMap::new();
        players.insert(
            PlayerId(5),
            PlayerSnapshot {
                x: 1.0,
                y: -2.0,
                angle: 90.0,
                velocity_x: 0.5,
                velocity_y: 0.0,
                name: "pilot".to_string(),
                color: 0xaabbcc,
                invulnerable: false,
                last_processed_input: Some(11),
                landed_on_planet: None,
            },
        );
        let snap = WorldSnapshot {
            players,
            bullets: vec![],
            planets: HashMap::new(),
        };
        let msg = ServerMsg::GameStateUpdate { state: snap };
        let bytes = encode_to_bytes(&msg).unwrap();
        let back: ServerMsg = decode_from_bytes(&bytes).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn update_player_info_fields_optional() {
        let json = r#"{"type":"updatePlayerInfo","name":"ace"}"#;
        let msg: ClientMsg = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ClientMsg::UpdatePlayerInfo {
                name: Some("ace".to_string()),
                color: None,
            }
        );
    }
}
