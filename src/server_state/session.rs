//! # Sessions
//!
//! Per-connection bookkeeping for the game server.
//!
//! Every accepted socket is a [`Connection`] moving through
//! `Unauthenticated -> HandshakeOk -> LoggedIn -> Disconnected`. A connection
//! that completed login also carries a [`PlayerSession`] with the player's
//! identity, kinematics and the set of chunks its client has been sent.

use std::collections::HashSet;
use std::net::SocketAddr;

use cgmath::Point3;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use crate::codec::packet::{Disconnect, Packet, PacketType};
use crate::codec::CodecError;
use crate::net::{ConnectionId, Outbound, OutboundSender};
use crate::server_state::voxels::chunk::{ChunkCoord, CHUNK_HEIGHT, WORLD_BORDER};

/// Reasons the server ends a connection. `Display` is the text clients show.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The handshake named a different protocol version.
    #[error("Outdated protocol: server runs {server}, client sent {client}")]
    VersionMismatch {
        /// Version this server speaks.
        server: String,
        /// Version the client sent.
        client: String,
    },

    /// A play packet arrived before login completed.
    #[error("Protocol violation: {0:?} is not allowed before login")]
    NotLoggedIn(PacketType),

    /// The player limit is reached.
    #[error("Server full")]
    ServerFull,

    /// A frame could not be decoded before login.
    #[error("Malformed packet: {0}")]
    Malformed(#[from] CodecError),

    /// A movement packet placed the player outside the world.
    #[error("Protocol violation: position outside the world")]
    InvalidPosition,

    /// No keep-alive answer within the timeout.
    #[error("Timed out")]
    TimedOut,

    /// The server is shutting down.
    #[error("Server closed")]
    ServerClosed,
}

/// Where a connection is in the login sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, waiting for the handshake.
    Unauthenticated,
    /// Handshake accepted, waiting for login.
    HandshakeOk,
    /// Playing.
    LoggedIn,
    /// Closed or closing. No further packets are processed.
    Disconnected,
}

/// Whether a client-reported position lies inside the world: finite, within
/// [`WORLD_BORDER`] on X and Z, and within a chunk height of the column.
pub fn position_in_world(x: f64, y: f64, z: f64) -> bool {
    let vertical = CHUNK_HEIGHT as f64;
    x.is_finite()
        && y.is_finite()
        && z.is_finite()
        && x.abs() <= WORLD_BORDER
        && z.abs() <= WORLD_BORDER
        && (-vertical..=2.0 * vertical).contains(&y)
}

/// Stable offline identity derived from the username.
pub fn offline_uuid(username: &str) -> Uuid {
    Uuid::new_v3(&Uuid::NAMESPACE_URL, format!("OfflinePlayer:{username}").as_bytes())
}

/// A logged-in player.
#[derive(Clone, Debug)]
pub struct PlayerSession {
    /// Entity id shared with other clients.
    pub entity_id: u32,
    /// Player identity, from login or derived offline.
    pub uuid: Uuid,
    /// Display name.
    pub username: String,
    /// Last reported position.
    pub position: Point3<f64>,
    /// Last reported yaw in degrees.
    pub yaw: f32,
    /// Last reported pitch in degrees.
    pub pitch: f32,
    /// Effective render distance: the smaller of the server's and the
    /// client's requested view distance.
    pub view_distance: u32,
    /// Chunks this client has been sent and not yet dropped.
    pub loaded_chunks: HashSet<ChunkCoord>,
}

impl PlayerSession {
    /// Creates a session facing straight ahead with nothing streamed yet.
    pub fn new(entity_id: u32, uuid: Uuid, username: String, position: Point3<f64>, view_distance: u32) -> Self {
        PlayerSession {
            entity_id,
            uuid,
            username,
            position,
            yaw: 0.0,
            pitch: 0.0,
            view_distance,
            loaded_chunks: HashSet::new(),
        }
    }

    /// Chunk column the player stands in.
    pub fn chunk(&self) -> ChunkCoord {
        ChunkCoord::containing(self.position)
    }
}

/// One accepted socket, from the game loop's point of view.
pub struct Connection {
    /// Id assigned by the accept loop.
    pub id: ConnectionId,
    /// Peer address, absent for connections driven from tests.
    pub addr: Option<SocketAddr>,
    /// Login progress.
    pub state: ConnectionState,
    sender: OutboundSender,
    /// Last keep-alive answer, or the connect time before the first one.
    pub last_keep_alive: Instant,
    /// Set once login completes.
    pub player: Option<PlayerSession>,
}

impl Connection {
    /// Registers a freshly accepted socket.
    pub fn new(id: ConnectionId, addr: Option<SocketAddr>, sender: OutboundSender, now: Instant) -> Self {
        Connection {
            id,
            addr,
            state: ConnectionState::Unauthenticated,
            sender,
            last_keep_alive: now,
            player: None,
        }
    }

    /// Whether login completed and the connection is still open.
    pub fn is_logged_in(&self) -> bool {
        self.state == ConnectionState::LoggedIn
    }

    /// Queues a packet for the socket task. A closed socket is not an error
    /// here; its close event removes the connection shortly after.
    pub fn send(&self, packet: impl Into<Packet>) {
        let _ = self.sender.send(Outbound::Packet(packet.into()));
    }

    /// Sends the disconnect reason, then asks the socket task to close.
    pub fn close(&mut self, reason: &str) {
        self.send(Disconnect {
            reason: reason.to_string(),
        });
        let _ = self.sender.send(Outbound::Close);
        self.state = ConnectionState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn offline_uuid_is_stable_per_name() {
        assert_eq!(offline_uuid("Steve"), offline_uuid("Steve"));
        assert_ne!(offline_uuid("Steve"), offline_uuid("Alex"));
        assert_eq!(offline_uuid("Steve").get_version_num(), 3);
    }

    #[test]
    fn server_full_reason_is_verbatim() {
        assert_eq!(ProtocolError::ServerFull.to_string(), "Server full");
    }

    #[test_case(8.5, 70.0, 8.5 => true; "spawn")]
    #[test_case(-29_999_999.0, 0.0, 29_999_999.0 => true; "near the border")]
    #[test_case(1e12, 70.0, 0.0 => false; "far beyond x")]
    #[test_case(0.0, 70.0, -3.1e7 => false; "beyond z")]
    #[test_case(f64::NAN, 70.0, 0.0 => false; "nan")]
    #[test_case(0.0, f64::INFINITY, 0.0 => false; "infinite y")]
    #[test_case(0.0, 1e9, 0.0 => false; "far above")]
    fn positions_outside_the_world_are_rejected(x: f64, y: f64, z: f64) -> bool {
        position_in_world(x, y, z)
    }

    #[test]
    fn close_sends_reason_then_close() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut connection = Connection::new(1, None, tx, Instant::now());
        connection.close("bye");
        assert_eq!(connection.state, ConnectionState::Disconnected);
        match rx.try_recv().unwrap() {
            Outbound::Packet(Packet::Disconnect(disconnect)) => assert_eq!(disconnect.reason, "bye"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(rx.try_recv().unwrap(), Outbound::Close));
    }
}
