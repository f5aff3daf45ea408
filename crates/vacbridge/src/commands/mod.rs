//! Command handlers, one module per command family.

pub mod config_cmd;
pub mod control;
pub mod devices;
pub mod login;
pub mod status;

use vacbridge_core::ConnectionSupervisor;

use crate::cli::{Command, GlobalOpts};
use crate::config;
use crate::error::CliError;

/// Route a network command to its handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Login(args) => login::handle(&args, global).await,
        Command::Devices => devices::handle(global).await,
        Command::Status(args) => status::status(&args, global).await,
        Command::Watch => status::watch(global).await,
        Command::Start
        | Command::Pause
        | Command::Stop
        | Command::Dock
        | Command::Fan(_)
        | Command::Spot(_) => control::handle(&cmd, global).await,
        Command::Config(_) | Command::Completions(_) => Err(CliError::Validation {
            field: "command".into(),
            reason: "handled before dispatch".into(),
        }),
    }
}

/// Build a supervisor from config + flags and open the device session.
pub async fn open_session(global: &GlobalOpts) -> Result<ConnectionSupervisor, CliError> {
    let cfg = config::load_config_or_default();
    let session = config::resolve_session(global, &cfg)?;
    let supervisor = ConnectionSupervisor::new(session)?;
    supervisor.connect().await?;
    Ok(supervisor)
}
