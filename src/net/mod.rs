//! # Networking
//!
//! TCP plumbing between sockets and the game loop.
//!
//! Each accepted socket gets its own task (see [`connection`]) that frames
//! bytes into packets. The tasks never touch game state: they forward what
//! they read to the game loop as [`ConnectionEvent`]s over one shared
//! channel, and write whatever the game loop queues on their private
//! [`Outbound`] channel.

use std::net::SocketAddr;

use log::{info, warn};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::codec::packet::Packet;
use crate::codec::CodecError;

pub mod connection;

/// Process-unique id of an accepted socket.
pub type ConnectionId = u64;

/// Work queued by the game loop for one socket.
#[derive(Debug)]
pub enum Outbound {
    /// Encode and write one packet.
    Packet(Packet),
    /// Flush what was queued before, then close the socket.
    Close,
}

/// Queue the game loop writes a socket's outbound work to.
pub type OutboundSender = mpsc::UnboundedSender<Outbound>;

/// What socket tasks report to the game loop, in receipt order per socket.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// A socket was accepted.
    Connected {
        /// Id of the new connection.
        id: ConnectionId,
        /// Peer address.
        addr: SocketAddr,
        /// Where to queue packets for this socket.
        sender: OutboundSender,
    },
    /// A frame decoded into a packet.
    Packet {
        /// Sending connection.
        id: ConnectionId,
        /// The decoded packet.
        packet: Packet,
    },
    /// A frame failed to decode.
    Malformed {
        /// Sending connection.
        id: ConnectionId,
        /// Why decoding failed.
        error: CodecError,
    },
    /// The socket is gone. Always the last event for `id`.
    Closed {
        /// The closed connection.
        id: ConnectionId,
    },
}

/// Accepts sockets until the event channel closes, spawning one
/// connection task per socket.
pub async fn accept_loop(listener: TcpListener, events: mpsc::UnboundedSender<ConnectionEvent>) {
    let mut next_id: ConnectionId = 1;

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!("Failed to accept connection: {}", err);
                continue;
            }
        };
        if events.is_closed() {
            break;
        }

        let id = next_id;
        next_id += 1;
        info!("Accepted connection {} from {}", id, peer);

        if let Err(err) = socket.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {}: {}", peer, err);
        }
        tokio::spawn(connection::handle_connection(id, socket, peer, events.clone()));
    }
}
