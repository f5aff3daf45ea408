//! Clap derive structures for the `vacbridge` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};
use vacbridge_core::SweepMode;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// vacbridge -- talk to a cloud-connected robot vacuum
#[derive(Debug, Parser)]
#[command(
    name = "vacbridge",
    version,
    about = "Control and monitor a cloud-connected robot vacuum",
    long_about = "Signs in to the vendor cloud, opens the device's MQTT channel and\n\
        exposes its live state and a small command surface.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Profile to use
    #[arg(long, short = 'p', env = "VACBRIDGE_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Account e-mail (overrides profile)
    #[arg(long, env = "VACBRIDGE_EMAIL", global = true)]
    pub email: Option<String>,

    /// Account password
    #[arg(long, env = "VACBRIDGE_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Device id (overrides profile)
    #[arg(long, short = 'd', env = "VACBRIDGE_DEVICE", global = true)]
    pub device: Option<String>,

    /// Cloud base URL (overrides profile)
    #[arg(long, env = "VACBRIDGE_CLOUD_URL", global = true, hide = true)]
    pub cloud_url: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "VACBRIDGE_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip HTTP certificate checks
    #[arg(long, short = 'k', env = "VACBRIDGE_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "VACBRIDGE_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in and pick a device
    Login(LoginArgs),

    /// List devices on the account
    #[command(alias = "dev")]
    Devices,

    /// Print the device state once
    #[command(alias = "st")]
    Status(StatusArgs),

    /// Print the device state on every change until Ctrl-C
    Watch,

    /// Start cleaning
    Start,

    /// Pause cleaning
    Pause,

    /// Stop the current action
    Stop,

    /// Return to the charging dock
    #[command(alias = "home")]
    Dock,

    /// Set the suction power
    Fan(FanArgs),

    /// Clean around a map coordinate
    Spot(SpotArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Write the selected device to the active profile
    #[arg(long)]
    pub save: bool,

    /// Store the password in the config file instead of the keyring
    #[arg(long, requires = "save")]
    pub plaintext_password: bool,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Seconds to wait for the device to report
    #[arg(long, short = 'w', default_value = "10")]
    pub wait: u64,
}

#[derive(Debug, Args)]
pub struct FanArgs {
    /// normal, silence, high, full, or 0-3
    pub mode: SweepMode,
}

#[derive(Debug, Args)]
pub struct SpotArgs {
    /// Map x coordinate (metres)
    #[arg(long, allow_negative_numbers = true)]
    pub x: f64,

    /// Map y coordinate (metres)
    #[arg(long, allow_negative_numbers = true)]
    pub y: f64,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create a config file with guided setup
    Init,

    /// Display the current configuration (secrets masked)
    Show,

    /// Print the config file location
    Path,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn fan_accepts_names_and_codes() {
        let cli = Cli::try_parse_from(["vacbridge", "fan", "HIGH"]).unwrap();
        assert!(matches!(cli.command, Command::Fan(FanArgs { mode: SweepMode::High })));

        let cli = Cli::try_parse_from(["vacbridge", "fan", "3"]).unwrap();
        assert!(matches!(cli.command, Command::Fan(FanArgs { mode: SweepMode::Full })));

        assert!(Cli::try_parse_from(["vacbridge", "fan", "turbo"]).is_err());
    }

    #[test]
    fn spot_accepts_negative_coordinates() {
        let cli = Cli::try_parse_from(["vacbridge", "spot", "--x", "-1.5", "--y", "2"]).unwrap();
        let Command::Spot(args) = cli.command else {
            panic!("expected spot");
        };
        assert!((args.x + 1.5).abs() < f64::EPSILON);
        assert!((args.y - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn plaintext_password_requires_save() {
        assert!(Cli::try_parse_from(["vacbridge", "login", "--plaintext-password"]).is_err());
    }
}
