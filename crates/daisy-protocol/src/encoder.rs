use bytes::Bytes;

use crate::bits::{bits_to_bytes, bytes_to_bits, uint_to_bits, BitReader};
use crate::error::{EncodeError, ProtocolError, Result};
use crate::message::{PacketKind, Request, RequestArgs, RequestSubject, SUBJECT_WIDTH};
use crate::schema;

/// Encode an outbound request.
///
/// Wire format:
/// ```text
/// ┌───────────┬──────────────┬─────────────────────┬──────────────┐
/// │ Kind (2b) │ Subject (4b) │ Fields (schema, MSB │ Zero padding │
/// │ 0b01      │              │ first per field)    │ to a byte    │
/// └───────────┴──────────────┴─────────────────────┴──────────────┘
/// ```
///
/// Every argument is range-checked against its field width first; nothing
/// out of range is ever truncated onto the wire.
pub fn encode_request(request: &Request) -> std::result::Result<Bytes, EncodeError> {
    let subject = request.subject();
    let schema = schema::request_schema(subject);

    let mut bits = Vec::with_capacity(schema.total_bits());
    bits.extend(uint_to_bits(PacketKind::Request.code(), PacketKind::WIDTH));
    bits.extend(uint_to_bits(subject.code(), SUBJECT_WIDTH));
    for (field, value) in schema.fields.iter().zip(request.field_values()) {
        let raw = field.encode(value)?;
        bits.extend(uint_to_bits(raw, field.width));
    }

    Ok(bits_to_bytes(&bits))
}

/// Encode a request given by caller-facing subject name and loose arguments.
pub fn encode_named(name: &str, args: RequestArgs) -> std::result::Result<Bytes, EncodeError> {
    let subject = RequestSubject::from_name(name)?;
    encode_request(&Request::from_args(subject, args)?)
}

/// Decode a standalone request packet; the inverse of [`encode_request`].
pub fn decode_request(bytes: &[u8]) -> Result<Request> {
    let bits = bytes_to_bits(bytes);
    let mut reader = BitReader::new(&bits);
    let truncated = |have: usize, need: usize| ProtocolError::Truncated {
        kind: PacketKind::Request,
        have,
        need,
    };

    let kind = reader
        .read_uint(PacketKind::WIDTH)
        .map(PacketKind::from_code)
        .ok_or_else(|| truncated(bits.len(), PacketKind::WIDTH))?;
    if kind != PacketKind::Request {
        return Err(ProtocolError::NotARequest(kind));
    }

    let code = reader
        .read_uint(SUBJECT_WIDTH)
        .ok_or_else(|| truncated(bits.len(), PacketKind::Request.header_bits()))?;
    let subject = RequestSubject::from_code(code).ok_or(ProtocolError::UnknownSubject {
        kind: PacketKind::Request,
        code,
    })?;

    let schema = schema::request_schema(subject);
    let need = PacketKind::Request.header_bits() + schema.payload_bits();
    let mut values = Vec::with_capacity(schema.fields.len());
    for field in schema.fields {
        let raw = reader
            .read_uint(field.width)
            .ok_or_else(|| truncated(bits.len(), need))?;
        values.push(field.decode(raw));
    }

    Request::from_values(subject, &values).ok_or(ProtocolError::SchemaMismatch {
        kind: PacketKind::Request,
        subject: code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_requests() -> Vec<Request> {
        let mut all = Vec::new();
        for relay_id in 0..8 {
            for state in [false, true] {
                all.push(Request::SetRelay { relay_id, state });
            }
            all.push(Request::GetRelay { relay_id });
            all.push(Request::ToggleRelay { relay_id });
            all.push(Request::GetDht {
                sensor_id: relay_id,
            });
            all.push(Request::GetDs18b20 {
                sensor_id: relay_id,
            });
        }
        for sensor_id in 0..16 {
            all.push(Request::GetSoilMoisture { sensor_id });
        }
        all
    }

    #[test]
    fn encodes_known_packets() {
        let cases = [
            (
                Request::SetRelay {
                    relay_id: 3,
                    state: true,
                },
                [0b0100_0001, 0b1100_0000],
            ),
            (Request::GetRelay { relay_id: 5 }, [0b0100_0110, 0b1000_0000]),
            (Request::ToggleRelay { relay_id: 3 }, [0b0100_1001, 0b1000_0000]),
            (
                Request::GetSoilMoisture { sensor_id: 13 },
                [0b0100_1111, 0b0100_0000],
            ),
            (Request::GetDht { sensor_id: 1 }, [0b0101_0000, 0b1000_0000]),
            (Request::GetDs18b20 { sensor_id: 6 }, [0b0101_0111, 0b0000_0000]),
        ];

        for (request, expected) in cases {
            assert_eq!(encode_request(&request).unwrap().as_ref(), &expected, "{request:?}");
        }
    }

    #[test]
    fn every_request_decodes_back() {
        for request in all_requests() {
            let bytes = encode_request(&request).unwrap();
            let schema = schema::request_schema(request.subject());
            let bits = PacketKind::Request.header_bits() + schema.payload_bits();
            assert_eq!(bytes.len(), bits.div_ceil(8));
            assert_eq!(decode_request(&bytes).unwrap(), request);
        }
    }

    #[test]
    fn out_of_range_arguments_are_rejected() {
        let err = encode_request(&Request::SetRelay {
            relay_id: 8,
            state: false,
        })
        .unwrap_err();
        assert_eq!(
            err,
            EncodeError::OutOfRange {
                field: "relayId",
                value: "8".to_string(),
                width: 3
            }
        );
        assert!(encode_request(&Request::GetSoilMoisture { sensor_id: 16 }).is_err());
        assert!(encode_request(&Request::GetSoilMoisture { sensor_id: 15 }).is_ok());
    }

    #[test]
    fn encode_named_resolves_subjects() {
        let bytes = encode_named(
            "setRelay",
            RequestArgs {
                id: Some(3),
                state: Some(true),
            },
        )
        .unwrap();
        assert_eq!(bytes.as_ref(), &[0b0100_0001, 0b1100_0000]);

        assert_eq!(
            encode_named("openValve", RequestArgs::default()).unwrap_err(),
            EncodeError::InvalidSubject("openValve".to_string())
        );
    }

    #[test]
    fn decode_request_rejects_other_packets() {
        assert_eq!(
            decode_request(&[0b0000_0000, 0b0000_0000]).unwrap_err(),
            ProtocolError::NotARequest(PacketKind::Event)
        );
        assert_eq!(
            decode_request(&[0b0111_1100]).unwrap_err(),
            ProtocolError::UnknownSubject {
                kind: PacketKind::Request,
                code: 0b1111
            }
        );
        assert!(matches!(
            decode_request(&[0b0100_0000]),
            Err(ProtocolError::Truncated { .. })
        ));
        assert!(matches!(
            decode_request(&[]),
            Err(ProtocolError::Truncated { .. })
        ));
    }
}
