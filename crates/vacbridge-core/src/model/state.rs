// ── Device state ──
//
// Last-known values reported by the robot. Each inbound frame touches only
// the fields tied to its function code; everything else keeps its value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator, IntoStaticStr};
use tracing::debug;
use vacbridge_api::InboundEvent;

/// Robot position on the current map, in metres and degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

/// Charging dock position on the current map.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DockPose {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct NetworkInfo {
    pub ssid: Option<String>,
    pub ip: Option<String>,
}

// ── SweepMode ───────────────────────────────────────────────────────

/// Suction power, used as the fan speed.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
pub enum SweepMode {
    #[default]
    Normal,
    Silence,
    High,
    Full,
}

impl SweepMode {
    /// Wire value (0..=3).
    pub fn code(self) -> i64 {
        match self {
            Self::Normal => 0,
            Self::Silence => 1,
            Self::High => 2,
            Self::Full => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::iter().find(|mode| mode.code() == code)
    }
}

/// Error returned when a fan speed name or code is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sweep mode '{0}' (expected normal, silence, high, full or 0-3)")]
pub struct ParseSweepModeError(String);

impl FromStr for SweepMode {
    type Err = ParseSweepModeError;

    /// Accepts a case-insensitive name or the numeric code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<i64>() {
            return Self::from_code(code).ok_or_else(|| ParseSweepModeError(s.to_owned()));
        }
        Self::iter()
            .find(|mode| <&'static str>::from(*mode).eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseSweepModeError(s.to_owned()))
    }
}

// ── ActionCode ──────────────────────────────────────────────────────

/// What the robot reports it is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(into = "i64")]
pub enum ActionCode {
    #[default]
    Idle,
    Sweeping,
    GoingHome,
    Charging,
    Exploring,
    Stuck,
    Paused,
    /// A code newer firmware sends that this crate does not know.
    Other(i64),
}

impl ActionCode {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Idle,
            1 => Self::Sweeping,
            2 => Self::GoingHome,
            3 => Self::Charging,
            4 => Self::Exploring,
            5 => Self::Stuck,
            6 => Self::Paused,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Idle => 0,
            Self::Sweeping => 1,
            Self::GoingHome => 2,
            Self::Charging => 3,
            Self::Exploring => 4,
            Self::Stuck => 5,
            Self::Paused => 6,
            Self::Other(code) => code,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Sweeping => "Sweeping",
            Self::GoingHome => "Going home",
            Self::Charging => "Charging",
            Self::Exploring => "Exploring",
            Self::Stuck => "Stuck",
            Self::Paused => "Paused",
            Self::Other(_) => "Unknown",
        }
    }
}

impl From<ActionCode> for i64 {
    fn from(action: ActionCode) -> Self {
        action.code()
    }
}

impl fmt::Display for ActionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(code) => write!(f, "Unknown ({code})"),
            known => f.write_str(known.name()),
        }
    }
}

// ── DeviceMode / VacuumStatus ───────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
pub enum DeviceMode {
    #[default]
    Sweep,
    Mop,
}

impl DeviceMode {
    pub fn from_code(code: i64) -> Self {
        if code == 1 { Self::Mop } else { Self::Sweep }
    }
}

/// Normalized activity, the way a home-automation vacuum entity reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VacuumStatus {
    Idle,
    Cleaning,
    Returning,
    Docked,
    Error,
    Paused,
}

// ── DeviceState ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DeviceState {
    /// Battery percentage, `None` until reported.
    pub battery: Option<u8>,
    pub charging: bool,
    pub dc_connected: bool,
    /// Board temperature in degrees Celsius.
    pub temperature: Option<f64>,
    pub action: ActionCode,
    pub action_name: Option<String>,
    pub pose: Pose,
    pub dock_pose: DockPose,
    pub sweep_mode: SweepMode,
    /// Cleaning time of the current session.
    pub sweep_time_secs: u64,
    pub device_mode: DeviceMode,
    pub network: NetworkInfo,
}

impl DeviceState {
    /// Merge one decoded frame into the state.
    ///
    /// Returns `false` for frames that carry no state (system events,
    /// unknown codes, malformed parameters); those leave `self` untouched.
    pub fn apply(&mut self, event: &InboundEvent) -> bool {
        match event {
            InboundEvent::Pose { x, y, yaw } => {
                self.pose = Pose {
                    x: *x,
                    y: *y,
                    yaw: *yaw,
                };
            }
            InboundEvent::Action { code, name } => {
                self.action = ActionCode::from_code(*code);
                self.action_name.clone_from(name);
            }
            InboundEvent::Battery(level) => {
                self.battery = level.and_then(|v| u8::try_from(v).ok());
            }
            InboundEvent::Charging(charging) => self.charging = *charging,
            InboundEvent::DcConnected(connected) => self.dc_connected = *connected,
            InboundEvent::Temperature(celsius) => self.temperature = *celsius,
            InboundEvent::SweepTime(secs) => {
                self.sweep_time_secs = u64::try_from(*secs).unwrap_or(0);
            }
            InboundEvent::DockPose { x, y } => self.dock_pose = DockPose { x: *x, y: *y },
            InboundEvent::Network { ssid, ip } => {
                self.network = NetworkInfo {
                    ssid: ssid.clone(),
                    ip: ip.clone(),
                };
            }
            InboundEvent::SweepMode(code) => {
                self.sweep_mode = SweepMode::from_code(*code).unwrap_or_else(|| {
                    debug!(code, "unknown sweep mode, treating as normal");
                    SweepMode::Normal
                });
            }
            InboundEvent::DeviceMode(code) => self.device_mode = DeviceMode::from_code(*code),
            InboundEvent::SystemEvent(_) | InboundEvent::Ignored { .. } | InboundEvent::Unknown { .. } => {
                return false;
            }
        }
        true
    }

    /// Activity summary: charging always reads as docked.
    pub fn status(&self) -> VacuumStatus {
        if self.charging {
            return VacuumStatus::Docked;
        }
        match self.action {
            ActionCode::Sweeping => VacuumStatus::Cleaning,
            ActionCode::GoingHome => VacuumStatus::Returning,
            ActionCode::Charging => VacuumStatus::Docked,
            ActionCode::Stuck => VacuumStatus::Error,
            ActionCode::Paused => VacuumStatus::Paused,
            ActionCode::Idle | ActionCode::Exploring | ActionCode::Other(_) => VacuumStatus::Idle,
        }
    }
}
