//! Device channel wire format.
//!
//! Every frame on the MQTT topics is a JSON object `{"f": <code>, "p": <param>}`.
//! Outbound frames carry command codes from [`outbound`]; inbound frames carry
//! status codes from [`inbound`] and are decoded into [`InboundEvent`]s.
//!
//! Decoding is lenient in the same places the device firmware is sloppy:
//! a missing or mistyped field falls back to a default rather than failing
//! the whole frame. Frames that are not JSON objects, or have no integer
//! `f`, come back as a [`DecodeError`] which callers are expected to drop.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Command codes sent to `device/{id}/robot`.
pub mod outbound {
    pub const CMD_ACTION: i64 = 24;
    pub const GET_SWEEP_MODE: i64 = 25;
    pub const GET_STATUS: i64 = 26;
    pub const SPOT_CLEAN: i64 = 27;
    pub const GET_BATTERY: i64 = 34;
    pub const STOP: i64 = 35;
    pub const DOCK: i64 = 36;
    pub const START_UPDATE: i64 = 40;
    pub const STOP_UPDATE: i64 = 41;
    pub const SET_SWEEP_MODE: i64 = 59;
    pub const GET_NETWORK: i64 = 77;

    /// `p` values for [`CMD_ACTION`].
    pub const ACTION_START: i64 = 1;
    pub const ACTION_PAUSE: i64 = 2;
}

/// Status codes received on `device/{id}/app`.
pub mod inbound {
    pub const POSE: i64 = 1;
    pub const CURRENT_ACTION: i64 = 2;
    pub const BATTERY: i64 = 3;
    pub const CHARGING: i64 = 4;
    pub const DC_CONNECTED: i64 = 5;
    pub const TEMPERATURE: i64 = 6;
    pub const SWEEP_TIME: i64 = 12;
    pub const DOCK_POSE: i64 = 22;
    pub const NETWORK_INFO: i64 = 24;
    pub const SWEEP_MODE: i64 = 25;
    pub const SWEEP_MOP_MODE: i64 = 32;
    pub const SYSTEM_EVENT: i64 = 50;
}

// ── Envelope ─────────────────────────────────────────────────────────

/// The `{f, p}` frame shared by both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "f")]
    pub function: i64,
    #[serde(rename = "p", default, skip_serializing_if = "Option::is_none")]
    pub param: Option<Value>,
}

impl Envelope {
    /// A frame with no parameter.
    pub fn new(function: i64) -> Self {
        Self {
            function,
            param: None,
        }
    }

    /// A frame carrying `param`.
    pub fn with_param(function: i64, param: Value) -> Self {
        Self {
            function,
            param: Some(param),
        }
    }

    /// "Start real-time updates" with the fields the bridge consumes.
    ///
    /// Map-type streams are switched off; they are large and unused here.
    pub fn start_updates() -> Self {
        Self::with_param(
            outbound::START_UPDATE,
            json!({
                "pose": true,
                "currentAction": true,
                "batteryPercentage": true,
                "batteryCharging": true,
                "dcConnected": true,
                "boardTemperature": true,
                "sweepTime": true,
                "sweepArea": true,
                "dockPose": true,
                "exploreMap": false,
                "sweepMap": false,
                "virtualWall": false,
                "sweepingRegion": false,
            }),
        )
    }

    /// "Stop real-time updates".
    pub fn stop_updates() -> Self {
        Self::new(outbound::STOP_UPDATE)
    }

    /// The one-shot queries re-issued after connect and on every poll tick.
    ///
    /// Battery, status, sweep mode and network info are not pushed reliably.
    pub fn state_queries() -> [Self; 4] {
        [
            Self::new(outbound::GET_BATTERY),
            Self::new(outbound::GET_STATUS),
            Self::new(outbound::GET_SWEEP_MODE),
            Self::new(outbound::GET_NETWORK),
        ]
    }

    /// Serialize for publishing.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse a raw payload into an envelope.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(payload).map_err(|_| DecodeError::InvalidUtf8)?;
        let value: Value = serde_json::from_str(text).map_err(|e| DecodeError::Json(e.to_string()))?;
        let Value::Object(mut object) = value else {
            return Err(DecodeError::NotAnObject);
        };
        let function = object
            .get("f")
            .and_then(Value::as_i64)
            .ok_or(DecodeError::MissingFunction)?;
        Ok(Self {
            function,
            param: object.remove("p"),
        })
    }
}

/// Why an inbound payload could not be turned into an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("payload is not valid JSON: {0}")]
    Json(String),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("payload has no integer function code")]
    MissingFunction,
}

// ── Inbound events ───────────────────────────────────────────────────

/// A decoded inbound frame, one variant per status code the bridge tracks.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Pose { x: f64, y: f64, yaw: f64 },
    /// `an`/`actionName`; a non-object payload means the robot went idle.
    Action { code: i64, name: Option<String> },
    Battery(Option<i64>),
    Charging(bool),
    DcConnected(bool),
    Temperature(Option<f64>),
    SweepTime(i64),
    DockPose { x: f64, y: f64 },
    Network { ssid: Option<String>, ip: Option<String> },
    SweepMode(i64),
    DeviceMode(i64),
    SystemEvent(Value),
    /// A known code whose parameter had the wrong shape.
    Ignored { code: i64 },
    /// A code the bridge does not track.
    Unknown { code: i64, param: Option<Value> },
}

impl InboundEvent {
    /// Decode a raw payload straight into an event.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        Envelope::decode(payload).map(Self::from)
    }

    /// Whether applying this event can change device state.
    pub fn is_state_bearing(&self) -> bool {
        !matches!(
            self,
            Self::SystemEvent(_) | Self::Ignored { .. } | Self::Unknown { .. }
        )
    }
}

impl From<Envelope> for InboundEvent {
    fn from(envelope: Envelope) -> Self {
        let code = envelope.function;
        let param = envelope.param.unwrap_or(Value::Null);

        match code {
            inbound::POSE => match param.as_object() {
                Some(p) => Self::Pose {
                    x: float_field(p, "x"),
                    y: float_field(p, "y"),
                    yaw: float_field(p, "yaw"),
                },
                None => Self::Ignored { code },
            },
            inbound::CURRENT_ACTION => match param.as_object() {
                Some(p) => Self::Action {
                    code: p.get("an").and_then(Value::as_i64).unwrap_or(0),
                    name: p
                        .get("actionName")
                        .and_then(Value::as_str)
                        .map(str::to_owned),
                },
                None => Self::Action {
                    code: 0,
                    name: None,
                },
            },
            inbound::BATTERY => Self::Battery(param.as_i64()),
            inbound::CHARGING => Self::Charging(truthy(&param)),
            inbound::DC_CONNECTED => Self::DcConnected(truthy(&param)),
            inbound::TEMPERATURE => Self::Temperature(param.as_f64()),
            inbound::SWEEP_TIME => Self::SweepTime(param.as_i64().unwrap_or(0)),
            inbound::DOCK_POSE => match param.as_object() {
                Some(p) => Self::DockPose {
                    x: float_field(p, "x"),
                    y: float_field(p, "y"),
                },
                None => Self::Ignored { code },
            },
            inbound::NETWORK_INFO => match param.as_object() {
                Some(p) => Self::Network {
                    ssid: p.get("ssid").and_then(Value::as_str).map(str::to_owned),
                    ip: p.get("ip").and_then(Value::as_str).map(str::to_owned),
                },
                None => Self::Ignored { code },
            },
            inbound::SWEEP_MODE => Self::SweepMode(param.as_i64().unwrap_or(0)),
            inbound::SWEEP_MOP_MODE => match param.as_object() {
                Some(p) => Self::DeviceMode(p.get("device_mode").and_then(Value::as_i64).unwrap_or(0)),
                None => Self::Ignored { code },
            },
            inbound::SYSTEM_EVENT => Self::SystemEvent(param),
            _ => Self::Unknown {
                code,
                param: (!param.is_null()).then_some(param),
            },
        }
    }
}

fn float_field(object: &Map<String, Value>, key: &str) -> f64 {
    object.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

/// Loose truthiness: the firmware sends flags as bools, ints or strings.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────
