//! # Codec Module
//!
//! Encodings shared by storage and the network:
//!
//! * `rle` - run-length compression of chunk block arrays
//! * `packet` - the typed packet set and its JSON envelope
//!
//! Both directions of every encoding fail with [`CodecError`], never panic:
//! anything a client sends is untrusted.

use thiserror::Error;

pub mod packet;
pub mod rle;

use packet::PacketType;

/// Failures while encoding or decoding chunk data or packets.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Decoded runs do not add up to the expected block count.
    #[error("run lengths describe {actual} blocks, expected {expected}")]
    RunLength {
        /// Blocks the array must hold.
        expected: usize,
        /// Blocks the runs describe.
        actual: u64,
    },

    /// The frame is not a JSON envelope.
    #[error("malformed packet envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    /// The envelope names no known packet.
    #[error("unknown packet type {0:#04x}")]
    UnknownPacketType(u8),

    /// The payload does not match its packet type.
    #[error("malformed {packet_type:?} payload: {source}")]
    Payload {
        /// Type named by the envelope.
        packet_type: PacketType,
        /// What serde rejected.
        #[source]
        source: serde_json::Error,
    },

    /// A client sent a server-to-client packet.
    #[error("{0:?} packets are not accepted from clients")]
    WrongDirection(PacketType),

    /// An outgoing packet could not be serialised.
    #[error("cannot encode {packet_type:?}: {source}")]
    Encode {
        /// Type of the packet being sent.
        packet_type: PacketType,
        /// What serde rejected.
        #[source]
        source: serde_json::Error,
    },
}
