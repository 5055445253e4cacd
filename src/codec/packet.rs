//! # Packet Module
//!
//! Every packet travels as a JSON envelope
//! `{"type": <u8>, "data": {...}, "timestamp": <ms since epoch>}`.
//!
//! The `type` discriminant is wire-stable and grouped by direction:
//!
//! | Range          | Direction        |
//! |----------------|------------------|
//! | `0x00..=0x3F`  | client to server |
//! | `0x40..=0x7F`  | server to client |
//! | `0x80..=0xFF`  | bidirectional    |
//!
//! Decoding first parses the envelope, then matches exhaustively on the
//! discriminant to deserialize `data` into the typed payload. An unknown
//! discriminant or a payload of the wrong shape is a [`CodecError`], which
//! the server treats as a protocol error rather than a crash.

use std::time::{SystemTime, UNIX_EPOCH};

use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::rle::{self, Run};
use super::CodecError;
use crate::server_state::voxels::block::BlockId;
use crate::server_state::voxels::chunk::{Chunk, CHUNK_VOLUME};

/// Who may send a packet type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Client to server.
    Serverbound,
    /// Server to client.
    Clientbound,
    /// Either way.
    Bidirectional,
}

/// The outer frame of every packet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Wire id of the payload, see [`PacketType`].
    #[serde(rename = "type")]
    pub packet_type: u8,
    /// The payload object.
    #[serde(default)]
    pub data: Value,
    /// Send time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: u64,
}

/// Declares the packet set: the `PacketType` discriminants, their direction,
/// the `Packet` sum type and the exhaustive payload (de)serialization.
macro_rules! packets {
    ($($name:ident = $id:literal, $direction:ident;)*) => {
        /// Wire identifier of a packet.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive)]
        #[repr(u8)]
        pub enum PacketType {
            $(
                #[doc = concat!("Id of [`", stringify!($name), "`].")]
                $name = $id,
            )*
        }

        impl PacketType {
            /// Who may send this packet type.
            pub fn direction(self) -> Direction {
                match self {
                    $(PacketType::$name => Direction::$direction,)*
                }
            }
        }

        /// A decoded packet with its typed payload.
        #[derive(Clone, Debug, PartialEq)]
        pub enum Packet {
            $(
                #[doc = concat!("See [`", stringify!($name), "`].")]
                $name($name),
            )*
        }

        impl Packet {
            /// Wire type of this packet.
            pub fn packet_type(&self) -> PacketType {
                match self {
                    $(Packet::$name(_) => PacketType::$name,)*
                }
            }

            fn payload(&self) -> Result<Value, serde_json::Error> {
                match self {
                    $(Packet::$name(payload) => serde_json::to_value(payload),)*
                }
            }

            fn from_payload(packet_type: PacketType, data: Value) -> Result<Packet, serde_json::Error> {
                match packet_type {
                    $(PacketType::$name => serde_json::from_value(data).map(Packet::$name),)*
                }
            }
        }

        $(
            impl From<$name> for Packet {
                fn from(payload: $name) -> Self {
                    Packet::$name(payload)
                }
            }
        )*
    };
}

packets! {
    Handshake = 0x00, Serverbound;
    Login = 0x01, Serverbound;
    PlayerPosition = 0x02, Serverbound;
    PlayerLook = 0x03, Serverbound;
    PlayerPositionAndLook = 0x04, Serverbound;
    PlayerDigging = 0x05, Serverbound;
    PlayerBlockPlacement = 0x06, Serverbound;
    ChatMessage = 0x07, Serverbound;
    ClientSettings = 0x08, Serverbound;
    KeepAlive = 0x09, Serverbound;

    Disconnect = 0x40, Clientbound;
    ChunkData = 0x41, Clientbound;
    BlockChange = 0x42, Clientbound;
    MultiBlockChange = 0x43, Clientbound;
    SpawnPlayer = 0x44, Clientbound;
    DestroyEntities = 0x45, Clientbound;
    EntityPosition = 0x46, Clientbound;
    EntityLook = 0x47, Clientbound;
    EntityPositionAndLook = 0x48, Clientbound;
    PlayerInfo = 0x49, Clientbound;
    ChatMessageServer = 0x4A, Clientbound;
    TimeUpdate = 0x4B, Clientbound;
    WorldInfo = 0x4C, Clientbound;
    ServerKeepAlive = 0x4D, Clientbound;

    PluginMessage = 0x80, Bidirectional;
}

impl PacketType {
    /// The wire id.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Looks up a wire id; `None` for ids no packet uses.
    pub fn from_id(id: u8) -> Option<Self> {
        num::FromPrimitive::from_u8(id)
    }
}

/// Milliseconds since the Unix epoch, the envelope timestamp.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

impl Packet {
    /// Wraps the packet in an envelope stamped with `timestamp`.
    ///
    /// # Errors
    /// [`CodecError::Encode`] when the payload cannot be represented as JSON.
    pub fn to_envelope(&self, timestamp: u64) -> Result<Envelope, CodecError> {
        let packet_type = self.packet_type();
        let data = self
            .payload()
            .map_err(|source| CodecError::Encode { packet_type, source })?;
        Ok(Envelope {
            packet_type: packet_type.id(),
            data,
            timestamp,
        })
    }

    /// Serialises the packet into one JSON frame.
    ///
    /// # Errors
    /// [`CodecError::Encode`] when the packet cannot be serialised. Nothing
    /// should be written to the socket in that case.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let envelope = self.to_envelope(now_millis())?;
        serde_json::to_vec(&envelope).map_err(|source| CodecError::Encode {
            packet_type: self.packet_type(),
            source,
        })
    }

    /// Decodes one frame into a typed packet, whatever its direction.
    pub fn decode(frame: &[u8]) -> Result<Packet, CodecError> {
        let envelope: Envelope = serde_json::from_slice(frame).map_err(CodecError::Envelope)?;
        Self::from_envelope(envelope)
    }

    /// Decodes one frame received from a client, rejecting client-bound types.
    pub fn decode_serverbound(frame: &[u8]) -> Result<Packet, CodecError> {
        let packet = Self::decode(frame)?;
        match packet.packet_type().direction() {
            Direction::Clientbound => Err(CodecError::WrongDirection(packet.packet_type())),
            Direction::Serverbound | Direction::Bidirectional => Ok(packet),
        }
    }

    /// Deserializes the payload of an already parsed envelope.
    pub fn from_envelope(envelope: Envelope) -> Result<Packet, CodecError> {
        let packet_type = PacketType::from_id(envelope.packet_type)
            .ok_or(CodecError::UnknownPacketType(envelope.packet_type))?;
        Packet::from_payload(packet_type, envelope.data)
            .map_err(|source| CodecError::Payload { packet_type, source })
    }
}

/// Game rules applied to a player.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// Default mode.
    #[default]
    Survival,
    /// Unlimited blocks, no damage.
    Creative,
    /// No block edits.
    Adventure,
    /// Fly through the world without interacting.
    Spectator,
}

// Client to server

/// First packet of every connection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Must equal the server's protocol version exactly.
    pub protocol_version: String,
}

/// Requests a player session after a successful handshake.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Login {
    /// Display name.
    pub username: String,
    /// Resent by returning clients to keep their identity.
    #[serde(default)]
    pub uuid: Option<String>,
}

/// The player moved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPosition {
    /// World X.
    pub x: f64,
    /// World Y.
    pub y: f64,
    /// World Z.
    pub z: f64,
    /// Reported by the client; the server does not use it.
    #[serde(default)]
    pub on_ground: bool,
}

/// The player turned, angles in degrees.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerLook {
    /// Yaw in degrees.
    pub yaw: f32,
    /// Pitch in degrees.
    pub pitch: f32,
}

/// The player moved and turned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPositionAndLook {
    /// World X.
    pub x: f64,
    /// World Y.
    pub y: f64,
    /// World Z.
    pub z: f64,
    /// Yaw in degrees.
    pub yaw: f32,
    /// Pitch in degrees.
    pub pitch: f32,
    /// Reported by the client; the server does not use it.
    #[serde(default)]
    pub on_ground: bool,
}

/// The player broke the block at a world position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDigging {
    /// World X.
    pub x: i32,
    /// World Y.
    pub y: i32,
    /// World Z.
    pub z: i32,
}

/// The player placed a block at a world position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerBlockPlacement {
    /// World X.
    pub x: i32,
    /// World Y.
    pub y: i32,
    /// World Z.
    pub z: i32,
    /// Placed block. Any id is accepted.
    pub block_id: BlockId,
}

/// A chat line typed by the player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// The text, relayed unchanged.
    pub message: String,
}

/// Client preferences.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSettings {
    /// Requested render distance, capped by the server's.
    pub view_distance: u32,
    /// Client language. Unused by the server.
    #[serde(default)]
    pub locale: Option<String>,
}

/// Answer to a [`ServerKeepAlive`] challenge, echoing its id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeepAlive {
    /// Id of the challenge being answered.
    pub id: u64,
}

// Server to client

/// Sent right before the server closes a connection. Clients display
/// `reason` verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disconnect {
    /// Human-readable reason.
    pub reason: String,
}

/// A whole chunk column with its blocks run-length encoded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkData {
    /// Chunk index along X.
    pub chunk_x: i32,
    /// Chunk index along Z.
    pub chunk_z: i32,
    /// Block ids in layer-major order, run-length encoded.
    pub blocks: Vec<Run>,
    /// One biome id per column.
    pub biomes: Vec<u8>,
}

impl ChunkData {
    /// Encodes a chunk for the wire.
    pub fn from_chunk(chunk: &Chunk) -> Self {
        let coord = chunk.coord();
        ChunkData {
            chunk_x: coord.x,
            chunk_z: coord.z,
            blocks: rle::compress(chunk.blocks()),
            biomes: chunk.biomes().to_vec(),
        }
    }

    /// Expands the block runs into the full `16 * 256 * 16` array.
    pub fn decode_blocks(&self) -> Result<Vec<BlockId>, CodecError> {
        rle::decompress(&self.blocks, CHUNK_VOLUME)
    }
}

/// A single block edit, in world coordinates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockChange {
    /// World X.
    pub x: i32,
    /// World Y.
    pub y: i32,
    /// World Z.
    pub z: i32,
    /// New block id.
    pub block_id: BlockId,
}

/// Several block edits applied together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiBlockChange {
    /// The edits, in application order.
    pub changes: Vec<BlockChange>,
}

/// Makes another player visible to the receiver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnPlayer {
    /// Entity the update is about.
    pub entity_id: u32,
    /// Player identity.
    pub uuid: Uuid,
    /// Display name.
    pub username: String,
    /// World X.
    pub x: f64,
    /// World Y.
    pub y: f64,
    /// World Z.
    pub z: f64,
    /// Yaw in degrees.
    pub yaw: f32,
    /// Pitch in degrees.
    pub pitch: f32,
}

/// Removes entities from the receiver's view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyEntities {
    /// Entities to remove.
    pub entity_ids: Vec<u32>,
}

/// Another entity moved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPosition {
    /// Entity the update is about.
    pub entity_id: u32,
    /// World X.
    pub x: f64,
    /// World Y.
    pub y: f64,
    /// World Z.
    pub z: f64,
}

/// Another entity turned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityLook {
    /// Entity the update is about.
    pub entity_id: u32,
    /// Yaw in degrees.
    pub yaw: f32,
    /// Pitch in degrees.
    pub pitch: f32,
}

/// An entity moved and turned. Also tells a new player where it spawned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPositionAndLook {
    /// Entity the update is about.
    pub entity_id: u32,
    /// World X.
    pub x: f64,
    /// World Y.
    pub y: f64,
    /// World Z.
    pub z: f64,
    /// Yaw in degrees.
    pub yaw: f32,
    /// Pitch in degrees.
    pub pitch: f32,
}

/// Whether a [`PlayerInfo`] adds or removes a player list entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerInfoAction {
    /// Adds the player to the list.
    Add,
    /// Removes the player from the list.
    Remove,
}

/// Player list maintenance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    /// Add or remove.
    pub action: PlayerInfoAction,
    /// Player identity.
    pub uuid: Uuid,
    /// Display name.
    pub username: String,
    /// Entity the update is about.
    pub entity_id: u32,
}

/// A chat line delivered to the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageServer {
    /// `None` for server or plugin announcements.
    pub sender: Option<String>,
    /// The text.
    pub message: String,
}

/// The world clock.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeUpdate {
    /// Ticks since the world was created.
    pub world_age: u64,
    /// Ticks into the current day.
    pub time_of_day: u64,
}

/// World metadata sent once, right after a successful login.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldInfo {
    /// Name of the world.
    pub world_name: String,
    /// Generation seed.
    pub seed: u32,
    /// Ticks since the world was created.
    pub world_age: u64,
    /// Ticks into the current day.
    pub time_of_day: u64,
    /// The entity id assigned to the receiving player.
    pub entity_id: u32,
    /// Rules for the receiving player.
    pub game_mode: GameMode,
    /// Player limit of the server.
    pub max_players: usize,
    /// Server render distance, in chunks.
    pub render_distance: u32,
    /// Chunk size along X.
    pub chunk_width: usize,
    /// Chunk size along Y.
    pub chunk_height: usize,
    /// Chunk size along Z.
    pub chunk_depth: usize,
}

/// Liveness challenge. Clients answer with a [`KeepAlive`] carrying `id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerKeepAlive {
    /// Challenge id.
    pub id: u64,
}

// Bidirectional

/// Opaque plugin traffic. The core never looks inside `payload`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMessage {
    /// Namespaced channel, e.g. `myplugin:ping`.
    pub channel: String,
    /// Raw bytes.
    pub payload: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_state::voxels::generation::generate;
    use serde_json::json;
    use test_case::test_case;

    fn frame(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn handshake_decodes_from_wire_json() {
        let bytes = frame(json!({"type": 0, "data": {"protocolVersion": "1.0.0"}, "timestamp": 17}));
        let packet = Packet::decode_serverbound(&bytes).unwrap();
        assert_eq!(
            packet,
            Packet::Handshake(Handshake {
                protocol_version: "1.0.0".into()
            })
        );
    }

    #[test]
    fn encoded_envelope_carries_type_and_camel_case_payload() {
        let packet = Packet::from(BlockChange {
            x: 10,
            y: 64,
            z: 10,
            block_id: 0,
        });
        let value: Value = serde_json::from_slice(&packet.encode().unwrap()).unwrap();
        assert_eq!(value["type"], json!(0x42));
        assert_eq!(value["data"], json!({"x": 10, "y": 64, "z": 10, "blockId": 0}));
        assert!(value["timestamp"].as_u64().unwrap() > 0);
    }

    #[test]
    fn envelope_keeps_the_given_timestamp() {
        let packet = Packet::from(ServerKeepAlive { id: 3 });
        let envelope = packet.to_envelope(42).unwrap();
        assert_eq!(envelope.packet_type, 0x4D);
        assert_eq!(envelope.timestamp, 42);
        assert_eq!(Packet::from_envelope(envelope).unwrap(), packet);
    }

    #[test]
    fn encode_failures_name_the_packet() {
        let source = serde_json::from_str::<Value>("{").unwrap_err();
        let error = CodecError::Encode {
            packet_type: PacketType::ChunkData,
            source,
        };
        assert!(error.to_string().starts_with("cannot encode ChunkData"));
    }

    #[test]
    fn login_uuid_is_optional() {
        let bytes = frame(json!({"type": 1, "data": {"username": "Steve"}}));
        match Packet::decode(&bytes).unwrap() {
            Packet::Login(login) => {
                assert_eq!(login.username, "Steve");
                assert_eq!(login.uuid, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test_case(json!({"type": 0x3F, "data": {}}) ; "unknown serverbound id")]
    #[test_case(json!({"type": 0xFF, "data": {}}) ; "unknown bidirectional id")]
    fn unknown_type_is_an_error(value: Value) {
        assert!(matches!(
            Packet::decode(&frame(value)),
            Err(CodecError::UnknownPacketType(_))
        ));
    }

    #[test]
    fn malformed_payload_names_the_packet() {
        let bytes = frame(json!({"type": 5, "data": {"x": "ten"}}));
        match Packet::decode(&bytes) {
            Err(CodecError::Payload { packet_type, .. }) => {
                assert_eq!(packet_type, PacketType::PlayerDigging)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn garbage_is_an_envelope_error() {
        assert!(matches!(Packet::decode(b"not json"), Err(CodecError::Envelope(_))));
        assert!(matches!(Packet::decode(b"{\"data\": {}}"), Err(CodecError::Envelope(_))));
    }

    #[test]
    fn clients_cannot_send_clientbound_packets() {
        let bytes = Packet::from(Disconnect { reason: "x".into() }).encode().unwrap();
        assert!(matches!(
            Packet::decode_serverbound(&bytes),
            Err(CodecError::WrongDirection(PacketType::Disconnect))
        ));
        let plugin = Packet::from(PluginMessage {
            channel: "mod:chan".into(),
            payload: vec![1, 2, 3],
        });
        assert_eq!(Packet::decode_serverbound(&plugin.encode().unwrap()).unwrap(), plugin);
    }

    #[test_case(PacketType::Handshake, Direction::Serverbound)]
    #[test_case(PacketType::KeepAlive, Direction::Serverbound)]
    #[test_case(PacketType::ChunkData, Direction::Clientbound)]
    #[test_case(PacketType::ServerKeepAlive, Direction::Clientbound)]
    #[test_case(PacketType::PluginMessage, Direction::Bidirectional)]
    fn id_ranges_match_direction(packet_type: PacketType, direction: Direction) {
        assert_eq!(packet_type.direction(), direction);
        let id = packet_type.id();
        let expected = match id {
            0x00..=0x3F => Direction::Serverbound,
            0x40..=0x7F => Direction::Clientbound,
            _ => Direction::Bidirectional,
        };
        assert_eq!(expected, direction);
        assert_eq!(PacketType::from_id(id), Some(packet_type));
    }

    #[test]
    fn chunk_data_expands_to_the_full_array() {
        let chunk = generate(12345, 0, 0);
        let packet = Packet::from(ChunkData::from_chunk(&chunk));
        let decoded = Packet::decode(&packet.encode().unwrap()).unwrap();
        let Packet::ChunkData(data) = decoded else {
            panic!("expected chunk data");
        };
        let blocks = data.decode_blocks().unwrap();
        assert_eq!(blocks.len(), CHUNK_VOLUME);
        assert_eq!(blocks, chunk.blocks());
        assert_eq!(data.biomes, chunk.biomes());
    }
}
