//! Per-socket task: length-prefixed framing in both directions.
//!
//! Wire frame: a 4-byte big-endian length followed by that many bytes of
//! JSON envelope.

use std::net::SocketAddr;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use super::{ConnectionEvent, ConnectionId, Outbound};
use crate::codec::packet::Packet;

/// Largest frame accepted from or sent to a client.
pub const MAX_FRAME_LENGTH: usize = 4 * 1024 * 1024;

/// Codec for the wire framing: 4-byte big-endian length prefix.
pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

/// Runs one connection until either side closes it.
///
/// Decoded packets go to the game loop in receipt order; frames that fail
/// to decode are reported as [`ConnectionEvent::Malformed`] and the loop
/// decides what to do. A `Closed` event is always the last one sent.
pub async fn handle_connection<S>(
    id: ConnectionId,
    stream: S,
    peer: SocketAddr,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (sender, mut outbound) = mpsc::unbounded_channel();
    if events
        .send(ConnectionEvent::Connected {
            id,
            addr: peer,
            sender,
        })
        .is_err()
    {
        return;
    }

    let mut framed = Framed::new(stream, frame_codec());

    loop {
        tokio::select! {
            frame = framed.next() => match frame {
                Some(Ok(bytes)) => {
                    let event = match Packet::decode_serverbound(&bytes) {
                        Ok(packet) => ConnectionEvent::Packet { id, packet },
                        Err(error) => ConnectionEvent::Malformed { id, error },
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
                Some(Err(err)) => {
                    debug!("Connection {} ({}) read error: {}", id, peer, err);
                    break;
                }
                None => break,
            },
            message = outbound.recv() => match message {
                Some(Outbound::Packet(packet)) => {
                    let bytes = match packet.encode() {
                        Ok(bytes) => bytes,
                        Err(err) => {
                            warn!("Connection {} ({}) closing, {}", id, peer, err);
                            let _ = SinkExt::<Bytes>::close(&mut framed).await;
                            break;
                        }
                    };
                    if let Err(err) = framed.send(Bytes::from(bytes)).await {
                        debug!("Connection {} ({}) write error: {}", id, peer, err);
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = SinkExt::<Bytes>::close(&mut framed).await;
                    break;
                }
            },
        }
    }

    debug!("Connection {} ({}) closed", id, peer);
    let _ = events.send(ConnectionEvent::Closed { id });
}
