//! Bit-level wire format spoken between the hub and the board.
//!
//! Packets are not byte-aligned internally. Every packet is laid out as:
//! - A 2-bit packet kind
//! - A 4-bit subject (events and requests only; responses borrow the
//!   subject of the pending request)
//! - Payload fields of per-message widths, MSB first
//! - Filler bits up to the next byte boundary
//!
//! There is no sentinel between packets, so the decoder infers every
//! boundary from the consumed bit count alone.

pub mod bits;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod message;
pub mod schema;

pub use bits::{bits_to_bytes, bits_to_uint, bytes_to_bits, parse_bit_string, uint_to_bits, BitReader};
pub use decoder::{decode_stream, Decoded, DecoderState, FrameDecoder, PacketSink};
pub use encoder::{decode_request, encode_named, encode_request};
pub use error::{EncodeError, ProtocolError, Result};
pub use message::{
    EventSubject, PacketKind, Reply, Request, RequestArgs, RequestSubject, Response, Telemetry,
    SUBJECT_WIDTH,
};
pub use schema::{Field, MessageSchema, Transform, Value};
