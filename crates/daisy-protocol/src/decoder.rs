//! Incremental, bit-at-a-time packet decoder.
//!
//! Bytes may arrive in arbitrary chunks; the decoder keeps its position
//! across calls and hands completed packets to a [`PacketSink`].

use tracing::{debug, error};

use crate::bits::bytes_to_bits;
use crate::error::ProtocolError;
use crate::message::{
    EventSubject, PacketKind, Reply, Request, RequestSubject, Response, Telemetry, SUBJECT_WIDTH,
};
use crate::schema::{self, MessageSchema};

/// Receiver of decoder output.
///
/// The sink also answers which request is pending, since responses carry no
/// subject of their own.
pub trait PacketSink {
    /// Subject of the request currently awaiting a response, if any.
    fn pending_subject(&self) -> Option<RequestSubject>;

    /// A telemetry event was decoded.
    fn on_telemetry(&mut self, telemetry: Telemetry);

    /// A response to the pending request was decoded. The sink is expected
    /// to clear its pending request.
    fn on_response(&mut self, response: Response);

    /// A packet was dropped because of a protocol violation.
    fn on_protocol_error(&mut self, error: ProtocolError);
}

/// Externally visible decoder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Idle,
    ReadingPacketKind,
    ReadingSubject,
    ReadingEventPayload,
    ReadingRequestPayload,
    ReadingSuccessPayload,
    ReadingFailurePayload,
    /// Skipping the rest of the current byte after a dropped packet.
    Discarding,
}

#[derive(Debug)]
enum Stage {
    Idle,
    Kind { acc: u32, read: usize },
    Subject { kind: PacketKind, acc: u32, read: usize },
    Payload(PayloadReader),
    Discarding,
}

#[derive(Debug)]
struct PayloadReader {
    schema: &'static MessageSchema,
    raw: Vec<u32>,
    consumed: usize,
}

impl PayloadReader {
    fn new(schema: &'static MessageSchema) -> Self {
        Self {
            schema,
            raw: vec![0; schema.fields.len()],
            consumed: 0,
        }
    }

    fn push(&mut self, bit: bool) {
        // Bits past the last field are filler.
        if let Some(index) = self.schema.field_at(self.consumed) {
            self.raw[index] = (self.raw[index] << 1) | u32::from(bit);
        }
        self.consumed += 1;
    }

    fn is_complete(&self) -> bool {
        self.consumed == self.schema.payload_bits() + self.schema.filler_bits
    }
}

/// Stateful decoder for the inbound bit stream.
#[derive(Debug)]
pub struct FrameDecoder {
    stage: Stage,
    /// Bit position within the current byte (0..8).
    bit_in_byte: u8,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            stage: Stage::Idle,
            bit_in_byte: 0,
        }
    }

    pub fn state(&self) -> DecoderState {
        match &self.stage {
            Stage::Idle => DecoderState::Idle,
            Stage::Kind { .. } => DecoderState::ReadingPacketKind,
            Stage::Subject { .. } => DecoderState::ReadingSubject,
            Stage::Payload(reader) => match reader.schema.kind {
                PacketKind::Event => DecoderState::ReadingEventPayload,
                PacketKind::Request => DecoderState::ReadingRequestPayload,
                PacketKind::SuccessResponse => DecoderState::ReadingSuccessPayload,
                PacketKind::FailureResponse => DecoderState::ReadingFailurePayload,
            },
            Stage::Discarding => DecoderState::Discarding,
        }
    }

    /// Drop any partially read packet and realign on the next byte.
    pub fn reset(&mut self) {
        self.stage = Stage::Idle;
        self.bit_in_byte = 0;
    }

    /// Feed a chunk of bytes from the link.
    pub fn feed<S: PacketSink + ?Sized>(&mut self, bytes: &[u8], sink: &mut S) {
        for bit in bytes_to_bits(bytes) {
            self.push_bit(bit, sink);
        }
    }

    /// Feed a single bit.
    pub fn push_bit<S: PacketSink + ?Sized>(&mut self, bit: bool, sink: &mut S) {
        self.bit_in_byte = (self.bit_in_byte + 1) % 8;
        let stage = std::mem::replace(&mut self.stage, Stage::Idle);
        self.stage = match stage {
            Stage::Idle => Stage::Kind {
                acc: u32::from(bit),
                read: 1,
            },
            Stage::Kind { acc, read } => {
                let acc = (acc << 1) | u32::from(bit);
                if read + 1 < PacketKind::WIDTH {
                    Stage::Kind { acc, read: read + 1 }
                } else {
                    self.on_kind(PacketKind::from_code(acc), sink)
                }
            }
            Stage::Subject { kind, acc, read } => {
                let acc = (acc << 1) | u32::from(bit);
                if read + 1 < SUBJECT_WIDTH {
                    Stage::Subject {
                        kind,
                        acc,
                        read: read + 1,
                    }
                } else {
                    self.on_subject(kind, acc, sink)
                }
            }
            Stage::Payload(mut reader) => {
                reader.push(bit);
                if reader.is_complete() {
                    finish(reader, sink);
                    Stage::Idle
                } else {
                    Stage::Payload(reader)
                }
            }
            Stage::Discarding => self.discard(),
        };
    }

    fn on_kind<S: PacketSink + ?Sized>(&mut self, kind: PacketKind, sink: &mut S) -> Stage {
        if kind.carries_subject() {
            return Stage::Subject {
                kind,
                acc: 0,
                read: 0,
            };
        }

        let Some(pending) = sink.pending_subject() else {
            report(ProtocolError::UnexpectedResponse { kind }, sink);
            return self.discard();
        };
        let schema = if kind == PacketKind::SuccessResponse {
            schema::success_schema(pending)
        } else {
            schema::failure_schema(pending)
        };
        start_payload(schema, sink)
    }

    fn on_subject<S: PacketSink + ?Sized>(
        &mut self,
        kind: PacketKind,
        code: u32,
        sink: &mut S,
    ) -> Stage {
        match schema::lookup(kind, code) {
            Some(schema) => start_payload(schema, sink),
            None => {
                report(ProtocolError::UnknownSubject { kind, code }, sink);
                self.discard()
            }
        }
    }

    /// Next stage while skipping to the byte boundary.
    fn discard(&self) -> Stage {
        if self.bit_in_byte == 0 {
            Stage::Idle
        } else {
            Stage::Discarding
        }
    }
}

fn start_payload<S: PacketSink + ?Sized>(schema: &'static MessageSchema, sink: &mut S) -> Stage {
    let reader = PayloadReader::new(schema);
    if reader.is_complete() {
        finish(reader, sink);
        Stage::Idle
    } else {
        Stage::Payload(reader)
    }
}

fn finish<S: PacketSink + ?Sized>(reader: PayloadReader, sink: &mut S) {
    let schema = reader.schema;
    let values: Vec<_> = schema
        .fields
        .iter()
        .zip(&reader.raw)
        .map(|(field, raw)| field.decode(*raw))
        .collect();
    let mismatch = ProtocolError::SchemaMismatch {
        kind: schema.kind,
        subject: schema.subject,
    };

    match schema.kind {
        PacketKind::Event => {
            let telemetry = EventSubject::from_code(schema.subject)
                .and_then(|subject| Telemetry::from_values(subject, &values));
            match telemetry {
                Some(telemetry) => {
                    debug!(?telemetry, "decoded event");
                    sink.on_telemetry(telemetry);
                }
                None => report(mismatch, sink),
            }
        }
        PacketKind::Request => match RequestSubject::from_code(schema.subject) {
            Some(subject) => {
                let request = Request::from_values(subject, &values);
                debug!(?request, "board sent a request");
                report(ProtocolError::RequestFromBoardUnsupported { subject }, sink);
            }
            None => report(mismatch, sink),
        },
        PacketKind::SuccessResponse => {
            let response = RequestSubject::from_code(schema.subject).and_then(|subject| {
                Reply::from_values(subject, &values).map(|reply| Response::Success { subject, reply })
            });
            match response {
                Some(response) => {
                    debug!(?response, "decoded response");
                    sink.on_response(response);
                }
                None => report(mismatch, sink),
            }
        }
        PacketKind::FailureResponse => {
            let response = RequestSubject::from_code(schema.subject).and_then(|subject| {
                values
                    .first()
                    .and_then(|v| v.as_uint())
                    .map(|code| Response::Failure { subject, code })
            });
            match response {
                Some(response) => {
                    debug!(?response, "decoded response");
                    sink.on_response(response);
                }
                None => report(mismatch, sink),
            }
        }
    }
}

fn report<S: PacketSink + ?Sized>(err: ProtocolError, sink: &mut S) {
    error!(error = %err, "dropping packet");
    sink.on_protocol_error(err);
}

/// One outcome of [`decode_stream`].
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Telemetry(Telemetry),
    Response(Response),
    Error(ProtocolError),
}

struct CollectingSink {
    pending: Option<RequestSubject>,
    out: Vec<Decoded>,
}

impl PacketSink for CollectingSink {
    fn pending_subject(&self) -> Option<RequestSubject> {
        self.pending
    }

    fn on_telemetry(&mut self, telemetry: Telemetry) {
        self.out.push(Decoded::Telemetry(telemetry));
    }

    fn on_response(&mut self, response: Response) {
        self.pending = None;
        self.out.push(Decoded::Response(response));
    }

    fn on_protocol_error(&mut self, error: ProtocolError) {
        self.out.push(Decoded::Error(error));
    }
}

/// Decode a complete byte stream with a fresh decoder.
///
/// `pending` plays the role of the outstanding request; it is cleared by
/// the first response, like a live correlator would.
pub fn decode_stream(bytes: &[u8], pending: Option<RequestSubject>) -> Vec<Decoded> {
    let mut sink = CollectingSink {
        pending,
        out: Vec::new(),
    };
    FrameDecoder::new().feed(bytes, &mut sink);
    sink.out
}
