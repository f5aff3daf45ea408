//! One-shot device commands: connect, send, disconnect.

use vacbridge_core::Command as DeviceCommand;

use crate::cli::{Command, FanArgs, GlobalOpts, SpotArgs};
use crate::error::CliError;

use super::open_session;

/// Translate a CLI command into the device command it stands for.
fn device_command(cmd: &Command) -> Option<DeviceCommand> {
    Some(match cmd {
        Command::Start => DeviceCommand::Start,
        Command::Pause => DeviceCommand::Pause,
        Command::Stop => DeviceCommand::Stop,
        Command::Dock => DeviceCommand::ReturnToBase,
        Command::Fan(FanArgs { mode }) => DeviceCommand::SetFanSpeed(*mode),
        Command::Spot(SpotArgs { x, y }) => DeviceCommand::SpotClean { x: *x, y: *y },
        _ => return None,
    })
}

fn describe(command: DeviceCommand) -> String {
    match command {
        DeviceCommand::Start => "start".into(),
        DeviceCommand::Pause => "pause".into(),
        DeviceCommand::Stop => "stop".into(),
        DeviceCommand::ReturnToBase => "dock".into(),
        DeviceCommand::SetFanSpeed(mode) => format!("fan {mode}"),
        DeviceCommand::SpotClean { x, y } => format!("spot clean at ({x:.2}, {y:.2})"),
    }
}

pub async fn handle(cmd: &Command, global: &GlobalOpts) -> Result<(), CliError> {
    let command = device_command(cmd).ok_or_else(|| CliError::Validation {
        field: "command".into(),
        reason: "not a device command".into(),
    })?;

    let supervisor = open_session(global).await?;
    let sent = supervisor.send(command);
    supervisor.disconnect().await;

    if !sent {
        return Err(CliError::CommandRejected {
            command: describe(command),
            reason: "device is not connected".into(),
        });
    }

    if !global.quiet {
        eprintln!("✓ Sent {}", describe(command));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use vacbridge_core::SweepMode;

    use super::*;

    #[test]
    fn cli_commands_map_to_device_commands() {
        assert_eq!(device_command(&Command::Dock), Some(DeviceCommand::ReturnToBase));
        assert_eq!(
            device_command(&Command::Fan(FanArgs {
                mode: SweepMode::Silence
            })),
            Some(DeviceCommand::SetFanSpeed(SweepMode::Silence))
        );
        assert_eq!(device_command(&Command::Watch), None);
    }

    #[test]
    fn descriptions_are_human_readable() {
        assert_eq!(describe(DeviceCommand::SetFanSpeed(SweepMode::Full)), "fan Full");
        assert_eq!(
            describe(DeviceCommand::SpotClean { x: 1.0, y: -2.5 }),
            "spot clean at (1.00, -2.50)"
        );
    }
}
