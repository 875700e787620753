//! Packet kinds, subjects and the typed messages carried by them.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::EncodeError;
use crate::schema::Value;

/// Width of the subject field in event and request headers.
pub const SUBJECT_WIDTH: usize = 4;

/// The 2-bit field that opens every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketKind {
    Event,
    Request,
    SuccessResponse,
    FailureResponse,
}

impl PacketKind {
    /// Width of the kind field.
    pub const WIDTH: usize = 2;

    /// Every 2-bit value names a kind; higher bits are ignored.
    pub fn from_code(code: u32) -> Self {
        match code & 0b11 {
            0b00 => Self::Event,
            0b01 => Self::Request,
            0b10 => Self::SuccessResponse,
            _ => Self::FailureResponse,
        }
    }

    pub const fn code(self) -> u32 {
        match self {
            Self::Event => 0b00,
            Self::Request => 0b01,
            Self::SuccessResponse => 0b10,
            Self::FailureResponse => 0b11,
        }
    }

    /// Whether a subject field follows the kind on the wire.
    pub const fn carries_subject(self) -> bool {
        matches!(self, Self::Event | Self::Request)
    }

    /// Header width in bits (kind plus optional subject).
    pub const fn header_bits(self) -> usize {
        if self.carries_subject() {
            Self::WIDTH + SUBJECT_WIDTH
        } else {
            Self::WIDTH
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Event => "event",
            Self::Request => "request",
            Self::SuccessResponse => "success response",
            Self::FailureResponse => "failure response",
        })
    }
}

/// Subjects of unsolicited telemetry sent by the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventSubject {
    #[serde(rename = "soil-moisture")]
    SoilMoisture,
    #[serde(rename = "dht")]
    Dht,
    #[serde(rename = "ds18b20")]
    Ds18b20,
}

impl EventSubject {
    pub const ALL: [Self; 3] = [Self::SoilMoisture, Self::Dht, Self::Ds18b20];

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    pub const fn code(self) -> u32 {
        match self {
            Self::SoilMoisture => 0b0000,
            Self::Dht => 0b0001,
            Self::Ds18b20 => 0b0010,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::SoilMoisture => "soil-moisture",
            Self::Dht => "dht",
            Self::Ds18b20 => "ds18b20",
        }
    }
}

impl fmt::Display for EventSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Subjects of requests the hub sends to the board.
///
/// Responses carry no subject; they are interpreted against whichever
/// request subject is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RequestSubject {
    #[serde(rename = "setRelay")]
    SetRelay,
    #[serde(rename = "getRelay")]
    GetRelay,
    #[serde(rename = "toggleRelay")]
    ToggleRelay,
    #[serde(rename = "getSoilMoisture")]
    GetSoilMoisture,
    #[serde(rename = "getDHT")]
    GetDht,
    #[serde(rename = "getDS18B20")]
    GetDs18b20,
}

impl RequestSubject {
    pub const ALL: [Self; 6] = [
        Self::SetRelay,
        Self::GetRelay,
        Self::ToggleRelay,
        Self::GetSoilMoisture,
        Self::GetDht,
        Self::GetDs18b20,
    ];

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// Resolve a caller-facing name such as `getDHT`.
    pub fn from_name(name: &str) -> Result<Self, EncodeError> {
        Self::ALL
            .into_iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| EncodeError::InvalidSubject(name.to_string()))
    }

    pub const fn code(self) -> u32 {
        match self {
            Self::SetRelay => 0b0000,
            Self::GetRelay => 0b0001,
            Self::ToggleRelay => 0b0010,
            Self::GetSoilMoisture => 0b0011,
            Self::GetDht => 0b0100,
            Self::GetDs18b20 => 0b0101,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::SetRelay => "setRelay",
            Self::GetRelay => "getRelay",
            Self::ToggleRelay => "toggleRelay",
            Self::GetSoilMoisture => "getSoilMoisture",
            Self::GetDht => "getDHT",
            Self::GetDs18b20 => "getDS18B20",
        }
    }

    const fn targets_relay(self) -> bool {
        matches!(self, Self::SetRelay | Self::GetRelay | Self::ToggleRelay)
    }

    /// Human-readable message for a failure response error code.
    pub fn failure_message(self, code: u32) -> String {
        match (code, self.targets_relay()) {
            (0, true) => "Invalid relay ID.".to_string(),
            (0, false) => "Invalid sensor ID.".to_string(),
            (other, _) => format!("Unknown error code {other}."),
        }
    }
}

impl fmt::Display for RequestSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RequestSubject {
    type Err = EncodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

/// An outbound request with typed arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "subject", rename_all = "camelCase")]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    SetRelay { relay_id: u8, state: bool },
    #[serde(rename_all = "camelCase")]
    GetRelay { relay_id: u8 },
    #[serde(rename_all = "camelCase")]
    ToggleRelay { relay_id: u8 },
    #[serde(rename_all = "camelCase")]
    GetSoilMoisture { sensor_id: u8 },
    #[serde(rename = "getDHT", rename_all = "camelCase")]
    GetDht { sensor_id: u8 },
    #[serde(rename = "getDS18B20", rename_all = "camelCase")]
    GetDs18b20 { sensor_id: u8 },
}

impl Request {
    pub fn subject(&self) -> RequestSubject {
        match self {
            Self::SetRelay { .. } => RequestSubject::SetRelay,
            Self::GetRelay { .. } => RequestSubject::GetRelay,
            Self::ToggleRelay { .. } => RequestSubject::ToggleRelay,
            Self::GetSoilMoisture { .. } => RequestSubject::GetSoilMoisture,
            Self::GetDht { .. } => RequestSubject::GetDht,
            Self::GetDs18b20 { .. } => RequestSubject::GetDs18b20,
        }
    }

    /// Argument values in the field order of the request schema.
    pub fn field_values(&self) -> Vec<Value> {
        match *self {
            Self::SetRelay { relay_id, state } => {
                vec![Value::Uint(relay_id.into()), Value::Flag(state)]
            }
            Self::GetRelay { relay_id } | Self::ToggleRelay { relay_id } => {
                vec![Value::Uint(relay_id.into())]
            }
            Self::GetSoilMoisture { sensor_id }
            | Self::GetDht { sensor_id }
            | Self::GetDs18b20 { sensor_id } => vec![Value::Uint(sensor_id.into())],
        }
    }

    /// Rebuild a request from schema-ordered field values.
    pub fn from_values(subject: RequestSubject, values: &[Value]) -> Option<Self> {
        let id = small_uint(values, 0)?;
        Some(match subject {
            RequestSubject::SetRelay => Self::SetRelay {
                relay_id: id,
                state: values.get(1)?.as_flag()?,
            },
            RequestSubject::GetRelay => Self::GetRelay { relay_id: id },
            RequestSubject::ToggleRelay => Self::ToggleRelay { relay_id: id },
            RequestSubject::GetSoilMoisture => Self::GetSoilMoisture { sensor_id: id },
            RequestSubject::GetDht => Self::GetDht { sensor_id: id },
            RequestSubject::GetDs18b20 => Self::GetDs18b20 { sensor_id: id },
        })
    }

    /// Build a request from loosely typed arguments (relay or sensor id, relay state).
    pub fn from_args(subject: RequestSubject, args: RequestArgs) -> Result<Self, EncodeError> {
        let field = if subject.targets_relay() {
            "relayId"
        } else {
            "sensorId"
        };
        let id = args
            .id
            .ok_or(EncodeError::MissingArgument { subject, field })?;
        Ok(match subject {
            RequestSubject::SetRelay => Self::SetRelay {
                relay_id: id,
                state: args.state.ok_or(EncodeError::MissingArgument {
                    subject,
                    field: "state",
                })?,
            },
            RequestSubject::GetRelay => Self::GetRelay { relay_id: id },
            RequestSubject::ToggleRelay => Self::ToggleRelay { relay_id: id },
            RequestSubject::GetSoilMoisture => Self::GetSoilMoisture { sensor_id: id },
            RequestSubject::GetDht => Self::GetDht { sensor_id: id },
            RequestSubject::GetDs18b20 => Self::GetDs18b20 { sensor_id: id },
        })
    }
}

/// Loosely typed request arguments, as received from drivers or the CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestArgs {
    /// Relay or sensor id.
    pub id: Option<u8>,
    /// Desired relay state (`setRelay` only).
    pub state: Option<bool>,
}

/// Decoded payload of a success response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    /// `setRelay` and `toggleRelay` carry no payload.
    Done,
    RelayState { on: bool },
    Moisture { moisture: u8 },
    Dht { humidity: u8, temperature: f64 },
    Temperature { temperature: f64 },
}

impl Reply {
    pub fn from_values(subject: RequestSubject, values: &[Value]) -> Option<Self> {
        Some(match subject {
            RequestSubject::SetRelay | RequestSubject::ToggleRelay => Self::Done,
            RequestSubject::GetRelay => Self::RelayState {
                on: values.first()?.as_flag()?,
            },
            RequestSubject::GetSoilMoisture => Self::Moisture {
                moisture: small_uint(values, 0)?,
            },
            RequestSubject::GetDht => Self::Dht {
                humidity: small_uint(values, 0)?,
                temperature: values.get(1)?.as_float()?,
            },
            RequestSubject::GetDs18b20 => Self::Temperature {
                temperature: values.first()?.as_float()?,
            },
        })
    }
}

/// A settled response, paired with the request subject it answers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Success { subject: RequestSubject, reply: Reply },
    Failure { subject: RequestSubject, code: u32 },
}

impl Response {
    pub fn subject(&self) -> RequestSubject {
        match self {
            Self::Success { subject, .. } | Self::Failure { subject, .. } => *subject,
        }
    }
}

/// Decoded unsolicited event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Telemetry {
    #[serde(rename_all = "camelCase")]
    SoilMoisture { sensor_id: u8, moisture: u8 },
    #[serde(rename_all = "camelCase")]
    Dht {
        sensor_id: u8,
        humidity: u8,
        temperature: f64,
    },
    #[serde(rename_all = "camelCase")]
    Ds18b20 { sensor_id: u8, temperature: f64 },
}

impl Telemetry {
    pub fn subject(&self) -> EventSubject {
        match self {
            Self::SoilMoisture { .. } => EventSubject::SoilMoisture,
            Self::Dht { .. } => EventSubject::Dht,
            Self::Ds18b20 { .. } => EventSubject::Ds18b20,
        }
    }

    pub fn sensor_id(&self) -> u8 {
        match self {
            Self::SoilMoisture { sensor_id, .. }
            | Self::Dht { sensor_id, .. }
            | Self::Ds18b20 { sensor_id, .. } => *sensor_id,
        }
    }

    pub fn from_values(subject: EventSubject, values: &[Value]) -> Option<Self> {
        let sensor_id = small_uint(values, 0)?;
        Some(match subject {
            EventSubject::SoilMoisture => Self::SoilMoisture {
                sensor_id,
                moisture: small_uint(values, 1)?,
            },
            EventSubject::Dht => Self::Dht {
                sensor_id,
                humidity: small_uint(values, 1)?,
                temperature: values.get(2)?.as_float()?,
            },
            EventSubject::Ds18b20 => Self::Ds18b20 {
                sensor_id,
                temperature: values.get(1)?.as_float()?,
            },
        })
    }
}

fn small_uint(values: &[Value], index: usize) -> Option<u8> {
    values.get(index)?.as_uint()?.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_two_bit_code_is_a_kind() {
        for code in 0..4 {
            assert_eq!(PacketKind::from_code(code).code(), code);
        }
        assert_eq!(PacketKind::Event.header_bits(), 6);
        assert_eq!(PacketKind::SuccessResponse.header_bits(), 2);
    }

    #[test]
    fn subject_codes_match_firmware_numbering() {
        assert_eq!(EventSubject::from_code(1), Some(EventSubject::Dht));
        assert_eq!(EventSubject::from_code(3), None);
        assert_eq!(RequestSubject::from_code(5), Some(RequestSubject::GetDs18b20));
        assert_eq!(RequestSubject::from_code(6), None);
    }

    #[test]
    fn request_names_resolve() {
        for subject in RequestSubject::ALL {
            assert_eq!(RequestSubject::from_name(subject.name()).unwrap(), subject);
        }
        assert_eq!(
            "getDht".parse::<RequestSubject>().unwrap_err(),
            EncodeError::InvalidSubject("getDht".to_string())
        );
    }

    #[test]
    fn failure_messages_per_subject() {
        assert_eq!(RequestSubject::SetRelay.failure_message(0), "Invalid relay ID.");
        assert_eq!(RequestSubject::ToggleRelay.failure_message(0), "Invalid relay ID.");
        assert_eq!(RequestSubject::GetDht.failure_message(0), "Invalid sensor ID.");
        assert_eq!(RequestSubject::GetDht.failure_message(1), "Unknown error code 1.");
    }

    #[test]
    fn from_args_requires_state_for_set_relay() {
        let err = Request::from_args(
            RequestSubject::SetRelay,
            RequestArgs {
                id: Some(3),
                state: None,
            },
        )
        .unwrap_err();
        assert_eq!(
            err,
            EncodeError::MissingArgument {
                subject: RequestSubject::SetRelay,
                field: "state"
            }
        );

        let req = Request::from_args(
            RequestSubject::GetDs18b20,
            RequestArgs {
                id: Some(6),
                state: None,
            },
        )
        .unwrap();
        assert_eq!(req, Request::GetDs18b20 { sensor_id: 6 });
    }

    #[test]
    fn telemetry_serializes_with_wire_names() {
        let event = Telemetry::Dht {
            sensor_id: 5,
            humidity: 72,
            temperature: -40.0,
        };
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["event"], "dht");
        assert_eq!(json["sensorId"], 5);
        assert_eq!(json["temperature"], -40.0);
    }

    #[test]
    fn request_serializes_with_caller_names() {
        let json = serde_json::to_value(Request::SetRelay {
            relay_id: 3,
            state: true,
        })
        .unwrap();
        assert_eq!(json["subject"], "setRelay");
        assert_eq!(json["relayId"], 3);
        assert_eq!(json["state"], true);

        let json = serde_json::to_value(Request::GetDht { sensor_id: 1 }).unwrap();
        assert_eq!(json["subject"], "getDHT");
    }
}
