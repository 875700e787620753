//! Static field layouts for every message.
//!
//! A schema lists the payload fields of one `(kind, subject)` pair in wire
//! order, each with its bit width and numeric transform. Filler width is
//! derived so that header, payload and filler together end on a byte
//! boundary.

use std::fmt;

use serde::Serialize;

use crate::error::EncodeError;
use crate::message::{EventSubject, PacketKind, RequestSubject};

/// A decoded field value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Uint(u32),
    Flag(bool),
    Float(f64),
}

impl Value {
    pub fn as_uint(&self) -> Option<u32> {
        match self {
            Self::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint(v) => write!(f, "{v}"),
            Self::Flag(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Mapping between a raw field integer and its physical value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    /// The raw integer is the value.
    Raw,
    /// A single bit read as a boolean.
    Flag,
    /// Half-unit steps shifted down: `raw / 2 - offset`.
    HalfStep { offset: f64 },
}

impl Transform {
    pub fn decode(self, raw: u32) -> Value {
        match self {
            Self::Raw => Value::Uint(raw),
            Self::Flag => Value::Flag(raw != 0),
            Self::HalfStep { offset } => Value::Float(f64::from(raw) / 2.0 - offset),
        }
    }

    /// Inverse of [`Transform::decode`]; `None` if the value has the wrong
    /// type or does not land on a representable step.
    pub fn encode(self, value: Value) -> Option<u32> {
        match (self, value) {
            (Self::Raw, Value::Uint(v)) => Some(v),
            (Self::Flag, Value::Flag(v)) => Some(u32::from(v)),
            (Self::HalfStep { offset }, Value::Float(v)) => {
                let steps = (v + offset) * 2.0;
                if steps < 0.0 || steps.fract() != 0.0 || steps > f64::from(u32::MAX) {
                    return None;
                }
                Some(steps as u32)
            }
            _ => None,
        }
    }
}

/// One payload field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub width: usize,
    pub transform: Transform,
}

impl Field {
    pub const fn new(name: &'static str, width: usize, transform: Transform) -> Self {
        Self {
            name,
            width,
            transform,
        }
    }

    pub fn decode(&self, raw: u32) -> Value {
        self.transform.decode(raw)
    }

    /// Encode a value, rejecting anything that does not fit the field width.
    pub fn encode(&self, value: Value) -> Result<u32, EncodeError> {
        let raw = self
            .transform
            .encode(value)
            .ok_or_else(|| EncodeError::WrongType {
                field: self.name,
                value: value.to_string(),
            })?;
        if self.width < u32::BITS as usize && raw >> self.width != 0 {
            return Err(EncodeError::OutOfRange {
                field: self.name,
                value: value.to_string(),
                width: self.width,
            });
        }
        Ok(raw)
    }
}

/// Layout of one message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MessageSchema {
    pub kind: PacketKind,
    /// Subject code: the packet's own subject for events and requests, the
    /// pending request's subject for responses.
    pub subject: u32,
    pub fields: &'static [Field],
    pub filler_bits: usize,
}

impl MessageSchema {
    pub const fn new(kind: PacketKind, subject: u32, fields: &'static [Field]) -> Self {
        let mut total = kind.header_bits();
        let mut i = 0;
        while i < fields.len() {
            total += fields[i].width;
            i += 1;
        }
        Self {
            kind,
            subject,
            fields,
            filler_bits: (8 - total % 8) % 8,
        }
    }

    /// Sum of all payload field widths.
    pub fn payload_bits(&self) -> usize {
        self.fields.iter().map(|f| f.width).sum()
    }

    /// Header, payload and filler bits together; always a multiple of 8.
    pub fn total_bits(&self) -> usize {
        self.kind.header_bits() + self.payload_bits() + self.filler_bits
    }

    /// Index of the field holding payload bit `offset`, if any.
    pub fn field_at(&self, offset: usize) -> Option<usize> {
        let mut end = 0;
        for (index, field) in self.fields.iter().enumerate() {
            end += field.width;
            if offset < end {
                return Some(index);
            }
        }
        None
    }
}

const TEMPERATURE_DHT: Field = Field::new("temperature", 8, Transform::HalfStep { offset: 40.0 });
const TEMPERATURE_DS18B20: Field =
    Field::new("temperature", 9, Transform::HalfStep { offset: 55.0 });
const HUMIDITY: Field = Field::new("humidity", 7, Transform::Raw);
const MOISTURE: Field = Field::new("moisture", 7, Transform::Raw);
const RELAY_ID: Field = Field::new("relayId", 3, Transform::Raw);
const SENSOR_ID_3: Field = Field::new("sensorId", 3, Transform::Raw);
const SENSOR_ID_4: Field = Field::new("sensorId", 4, Transform::Raw);
const ERROR: Field = Field::new("error", 1, Transform::Raw);
const RELAY_STATE: Field = Field::new("state", 1, Transform::Flag);
const RELAY_STATE_REPLY: Field = Field::new("relayState", 1, Transform::Flag);

pub static EVENT_SOIL_MOISTURE: MessageSchema = MessageSchema::new(
    PacketKind::Event,
    EventSubject::SoilMoisture.code(),
    &[SENSOR_ID_4, MOISTURE],
);
pub static EVENT_DHT: MessageSchema = MessageSchema::new(
    PacketKind::Event,
    EventSubject::Dht.code(),
    &[SENSOR_ID_3, HUMIDITY, TEMPERATURE_DHT],
);
pub static EVENT_DS18B20: MessageSchema = MessageSchema::new(
    PacketKind::Event,
    EventSubject::Ds18b20.code(),
    &[SENSOR_ID_3, TEMPERATURE_DS18B20],
);

pub static REQUEST_SET_RELAY: MessageSchema = MessageSchema::new(
    PacketKind::Request,
    RequestSubject::SetRelay.code(),
    &[RELAY_ID, RELAY_STATE],
);
pub static REQUEST_GET_RELAY: MessageSchema =
    MessageSchema::new(PacketKind::Request, RequestSubject::GetRelay.code(), &[RELAY_ID]);
pub static REQUEST_TOGGLE_RELAY: MessageSchema =
    MessageSchema::new(PacketKind::Request, RequestSubject::ToggleRelay.code(), &[RELAY_ID]);
pub static REQUEST_GET_SOIL_MOISTURE: MessageSchema = MessageSchema::new(
    PacketKind::Request,
    RequestSubject::GetSoilMoisture.code(),
    &[SENSOR_ID_4],
);
pub static REQUEST_GET_DHT: MessageSchema =
    MessageSchema::new(PacketKind::Request, RequestSubject::GetDht.code(), &[SENSOR_ID_3]);
pub static REQUEST_GET_DS18B20: MessageSchema =
    MessageSchema::new(PacketKind::Request, RequestSubject::GetDs18b20.code(), &[SENSOR_ID_3]);

pub static SUCCESS_SET_RELAY: MessageSchema =
    MessageSchema::new(PacketKind::SuccessResponse, RequestSubject::SetRelay.code(), &[]);
pub static SUCCESS_GET_RELAY: MessageSchema = MessageSchema::new(
    PacketKind::SuccessResponse,
    RequestSubject::GetRelay.code(),
    &[RELAY_STATE_REPLY],
);
pub static SUCCESS_TOGGLE_RELAY: MessageSchema =
    MessageSchema::new(PacketKind::SuccessResponse, RequestSubject::ToggleRelay.code(), &[]);
pub static SUCCESS_GET_SOIL_MOISTURE: MessageSchema = MessageSchema::new(
    PacketKind::SuccessResponse,
    RequestSubject::GetSoilMoisture.code(),
    &[MOISTURE],
);
pub static SUCCESS_GET_DHT: MessageSchema = MessageSchema::new(
    PacketKind::SuccessResponse,
    RequestSubject::GetDht.code(),
    &[HUMIDITY, TEMPERATURE_DHT],
);
pub static SUCCESS_GET_DS18B20: MessageSchema = MessageSchema::new(
    PacketKind::SuccessResponse,
    RequestSubject::GetDs18b20.code(),
    &[TEMPERATURE_DS18B20],
);

pub static FAILURE_SET_RELAY: MessageSchema =
    MessageSchema::new(PacketKind::FailureResponse, RequestSubject::SetRelay.code(), &[ERROR]);
pub static FAILURE_GET_RELAY: MessageSchema =
    MessageSchema::new(PacketKind::FailureResponse, RequestSubject::GetRelay.code(), &[ERROR]);
pub static FAILURE_TOGGLE_RELAY: MessageSchema = MessageSchema::new(
    PacketKind::FailureResponse,
    RequestSubject::ToggleRelay.code(),
    &[ERROR],
);
pub static FAILURE_GET_SOIL_MOISTURE: MessageSchema = MessageSchema::new(
    PacketKind::FailureResponse,
    RequestSubject::GetSoilMoisture.code(),
    &[ERROR],
);
pub static FAILURE_GET_DHT: MessageSchema =
    MessageSchema::new(PacketKind::FailureResponse, RequestSubject::GetDht.code(), &[ERROR]);
pub static FAILURE_GET_DS18B20: MessageSchema = MessageSchema::new(
    PacketKind::FailureResponse,
    RequestSubject::GetDs18b20.code(),
    &[ERROR],
);

pub fn event_schema(subject: EventSubject) -> &'static MessageSchema {
    match subject {
        EventSubject::SoilMoisture => &EVENT_SOIL_MOISTURE,
        EventSubject::Dht => &EVENT_DHT,
        EventSubject::Ds18b20 => &EVENT_DS18B20,
    }
}

pub fn request_schema(subject: RequestSubject) -> &'static MessageSchema {
    match subject {
        RequestSubject::SetRelay => &REQUEST_SET_RELAY,
        RequestSubject::GetRelay => &REQUEST_GET_RELAY,
        RequestSubject::ToggleRelay => &REQUEST_TOGGLE_RELAY,
        RequestSubject::GetSoilMoisture => &REQUEST_GET_SOIL_MOISTURE,
        RequestSubject::GetDht => &REQUEST_GET_DHT,
        RequestSubject::GetDs18b20 => &REQUEST_GET_DS18B20,
    }
}

pub fn success_schema(subject: RequestSubject) -> &'static MessageSchema {
    match subject {
        RequestSubject::SetRelay => &SUCCESS_SET_RELAY,
        RequestSubject::GetRelay => &SUCCESS_GET_RELAY,
        RequestSubject::ToggleRelay => &SUCCESS_TOGGLE_RELAY,
        RequestSubject::GetSoilMoisture => &SUCCESS_GET_SOIL_MOISTURE,
        RequestSubject::GetDht => &SUCCESS_GET_DHT,
        RequestSubject::GetDs18b20 => &SUCCESS_GET_DS18B20,
    }
}

pub fn failure_schema(subject: RequestSubject) -> &'static MessageSchema {
    match subject {
        RequestSubject::SetRelay => &FAILURE_SET_RELAY,
        RequestSubject::GetRelay => &FAILURE_GET_RELAY,
        RequestSubject::ToggleRelay => &FAILURE_TOGGLE_RELAY,
        RequestSubject::GetSoilMoisture => &FAILURE_GET_SOIL_MOISTURE,
        RequestSubject::GetDht => &FAILURE_GET_DHT,
        RequestSubject::GetDs18b20 => &FAILURE_GET_DS18B20,
    }
}

/// Look up the schema for `(kind, subject)`.
///
/// For responses `subject` is the code of the pending request.
pub fn lookup(kind: PacketKind, subject: u32) -> Option<&'static MessageSchema> {
    match kind {
        PacketKind::Event => EventSubject::from_code(subject).map(event_schema),
        PacketKind::Request => RequestSubject::from_code(subject).map(request_schema),
        PacketKind::SuccessResponse => RequestSubject::from_code(subject).map(success_schema),
        PacketKind::FailureResponse => RequestSubject::from_code(subject).map(failure_schema),
    }
}
