// ── Command dispatch ──
//
// Fire-and-forget commands to the robot. A command is encoded into an
// envelope and queued on the live session; without one it is refused and
// logged, never returned as an error to the caller.

use serde_json::json;
use tracing::{debug, warn};
use vacbridge_api::Envelope;
use vacbridge_api::protocol::outbound;

use crate::model::SweepMode;
use crate::supervisor::ConnectionSupervisor;

/// A command the robot understands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Start,
    Pause,
    Stop,
    ReturnToBase,
    SetFanSpeed(SweepMode),
    /// Clean a small area around a map coordinate.
    SpotClean { x: f64, y: f64 },
}

impl Command {
    pub fn envelope(self) -> Envelope {
        match self {
            Self::Start => Envelope::with_param(outbound::CMD_ACTION, json!(outbound::ACTION_START)),
            Self::Pause => Envelope::with_param(outbound::CMD_ACTION, json!(outbound::ACTION_PAUSE)),
            Self::Stop => Envelope::new(outbound::STOP),
            Self::ReturnToBase => Envelope::new(outbound::DOCK),
            Self::SetFanSpeed(mode) => Envelope::with_param(outbound::SET_SWEEP_MODE, json!(mode.code())),
            Self::SpotClean { x, y } => {
                Envelope::with_param(outbound::SPOT_CLEAN, json!({ "x": x, "y": y }))
            }
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::ReturnToBase => "return_to_base",
            Self::SetFanSpeed(_) => "set_fan_speed",
            Self::SpotClean { .. } => "spot_clean",
        }
    }
}

impl ConnectionSupervisor {
    /// Queue a command. Returns whether it reached the transport queue.
    pub fn send(&self, command: Command) -> bool {
        match self.transmit(&command.envelope()) {
            Ok(()) => {
                debug!(command = command.label(), "command queued");
                true
            }
            Err(e) => {
                warn!(command = command.label(), error = %e, "command not sent");
                false
            }
        }
    }

    pub fn start(&self) -> bool {
        self.send(Command::Start)
    }

    pub fn pause(&self) -> bool {
        self.send(Command::Pause)
    }

    pub fn stop(&self) -> bool {
        self.send(Command::Stop)
    }

    pub fn return_to_base(&self) -> bool {
        self.send(Command::ReturnToBase)
    }

    pub fn set_fan_speed(&self, mode: SweepMode) -> bool {
        self.send(Command::SetFanSpeed(mode))
    }

    pub fn spot_clean(&self, x: f64, y: f64) -> bool {
        self.send(Command::SpotClean { x, y })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use strum::IntoEnumIterator;
    use vacbridge_api::InboundEvent;

    use super::*;
    use crate::model::DeviceState;
    use crate::supervisor::tests::offline_supervisor;

    #[test]
    fn action_commands_encode_to_wire_frames() {
        let frame = |c: Command| String::from_utf8(c.envelope().encode().unwrap()).unwrap();

        assert_eq!(frame(Command::Start), r#"{"f":24,"p":1}"#);
        assert_eq!(frame(Command::Pause), r#"{"f":24,"p":2}"#);
        assert_eq!(frame(Command::Stop), r#"{"f":35}"#);
        assert_eq!(frame(Command::ReturnToBase), r#"{"f":36}"#);
        assert_eq!(frame(Command::SetFanSpeed(SweepMode::High)), r#"{"f":59,"p":2}"#);
    }

    #[test]
    fn spot_clean_carries_coordinates() {
        let envelope = Command::SpotClean { x: 1.5, y: -0.25 }.envelope();
        assert_eq!(envelope.function, 27);
        assert_eq!(envelope.param, Some(json!({ "x": 1.5, "y": -0.25 })));
    }

    #[test]
    fn fan_speed_frames_round_trip_through_state() {
        for mode in SweepMode::iter() {
            let sent = Command::SetFanSpeed(mode).envelope();
            let echoed = Envelope {
                function: vacbridge_api::protocol::inbound::SWEEP_MODE,
                param: sent.param,
            };

            let mut state = DeviceState::default();
            state.apply(&InboundEvent::from(echoed));
            assert_eq!(state.sweep_mode, mode);
        }
    }

    #[tokio::test]
    async fn commands_are_refused_while_disconnected() {
        let sup = offline_supervisor();
        let before = sup.snapshot();

        assert!(!sup.set_fan_speed(SweepMode::Full));
        assert!(!sup.start());
        assert!(!sup.return_to_base());
        assert!(!sup.spot_clean(0.0, 0.0));
        assert_eq!(sup.snapshot(), before);
    }
}
