use crate::message::{PacketKind, RequestSubject};

/// Errors raised while decoding the inbound bit stream.
///
/// None of these stop the decoder: the offending packet is dropped and the
/// decoder goes back to waiting for a packet header.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A response arrived while no request was pending.
    #[error("didn't expect {kind} (no request pending)")]
    UnexpectedResponse { kind: PacketKind },

    /// The board sent a request packet.
    #[error("requests from the board are not supported (subject {subject})")]
    RequestFromBoardUnsupported { subject: RequestSubject },

    /// The subject code is not defined for the packet kind.
    #[error("unknown {kind} subject {code:#06b}")]
    UnknownSubject { kind: PacketKind, code: u32 },

    /// Decoded field values do not match the typed message shape.
    #[error("{kind} payload does not match its schema (subject {subject})")]
    SchemaMismatch { kind: PacketKind, subject: u32 },

    /// A standalone packet ended before all of its fields were read.
    #[error("truncated {kind} packet ({have} of {need} bits)")]
    Truncated {
        kind: PacketKind,
        have: usize,
        need: usize,
    },

    /// A standalone packet was expected to be a request.
    #[error("expected a request packet, found {0}")]
    NotARequest(PacketKind),

    /// A textual bit literal contained something other than `0`, `1` or whitespace.
    #[error("invalid character {0:?} in bit literal")]
    InvalidBitLiteral(char),
}

/// Caller misuse detected before anything is put on the wire.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// The subject name is not one of the outbound requests.
    #[error("invalid request subject: {0:?}")]
    InvalidSubject(String),

    /// An argument does not fit in its declared bit width.
    #[error("{field} value {value} does not fit in {width} bits")]
    OutOfRange {
        field: &'static str,
        value: String,
        width: usize,
    },

    /// An argument has the wrong type for its field.
    #[error("{field} cannot hold value {value}")]
    WrongType { field: &'static str, value: String },

    /// A required argument was not supplied.
    #[error("{subject} requires argument {field}")]
    MissingArgument {
        subject: RequestSubject,
        field: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
