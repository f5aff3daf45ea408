//! Config subcommand handlers.

use dialoguer::{Input, Select};
use secrecy::SecretString;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

const MASK: &str = "****";

/// Copy of the config with plaintext passwords masked.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for profile in cfg.profiles.values_mut() {
        if profile.password.is_some() {
            profile.password = Some(MASK.into());
        }
    }
    cfg
}

/// TOML-like view for the table format.
fn format_config(cfg: &Config) -> String {
    use std::fmt::Write;
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);
    let _ = writeln!(out, "debounce_ms = {}", cfg.defaults.debounce_ms);
    let _ = write!(out, "poll_interval = {}", cfg.defaults.poll_interval);

    for (name, p) in &cfg.profiles {
        let _ = writeln!(out, "\n");
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = write!(out, "email = \"{}\"", p.email);
        let optional = [
            ("password", p.password.clone()),
            ("password_env", p.password_env.clone()),
            ("device_id", p.device_id.clone()),
            ("user_id", p.user_id.clone()),
            ("cloud_url", p.cloud_url.clone()),
            ("broker_host", p.broker_host.clone()),
            ("broker_port", p.broker_port.map(|v| v.to_string())),
            ("ca_cert", p.ca_cert.as_ref().map(|c| c.display().to_string())),
            ("insecure", p.insecure.map(|v| v.to_string())),
            ("timeout", p.timeout.map(|v| v.to_string())),
        ];
        for (key, value) in optional.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))) {
            let _ = write!(out, "\n{key} = \"{value}\"");
        }
    }

    out
}

/// Map a dialoguer / interactive I/O failure into CliError.
pub(crate) fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(),

        ConfigCommand::Show => {
            let cfg = redacted(&config::load_config_or_default());
            let out = output::render_single(&global.output, &cfg, format_config, |c| {
                c.profiles.keys().cloned().collect::<Vec<_>>().join("\n")
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }
    }
}

/// Interactive wizard: one profile, password in keyring, env or file.
fn init() -> Result<(), CliError> {
    let config_path = config::config_path();
    eprintln!("vacbridge configuration wizard");
    eprintln!("   Config path: {}\n", config_path.display());

    let profile_name: String = Input::new()
        .with_prompt("Profile name")
        .default("default".into())
        .interact_text()
        .map_err(prompt_err)?;

    let email: String = Input::new()
        .with_prompt("Account e-mail")
        .interact_text()
        .map_err(prompt_err)?;

    let choices = &[
        "Store in system keyring (recommended)",
        "Read from an environment variable",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt("Where should the password come from?")
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    let mut profile = Profile {
        email,
        ..Profile::default()
    };

    match selection {
        0 => {
            let pass = read_password()?;
            vacbridge_config::store_password(&profile_name, &SecretString::from(pass))?;
            eprintln!("   ✓ Password stored in system keyring");
        }
        1 => {
            let var: String = Input::new()
                .with_prompt("Variable name")
                .default("VACBRIDGE_PASSWORD".into())
                .interact_text()
                .map_err(prompt_err)?;
            profile.password_env = Some(var);
        }
        _ => profile.password = Some(read_password()?),
    }

    let device: String = Input::new()
        .with_prompt("Device id (leave empty to pick one with `vacbridge login --save`)")
        .allow_empty(true)
        .interact_text()
        .map_err(prompt_err)?;
    if !device.trim().is_empty() {
        profile.device_id = Some(device.trim().to_owned());
    }

    let mut cfg = config::load_config_or_default();
    cfg.profiles.insert(profile_name.clone(), profile);
    cfg.default_profile = Some(profile_name.clone());
    let path = config::save_config(&cfg)?;

    eprintln!("\n✓ Configuration written to {}", path.display());
    eprintln!("  Active profile: {profile_name}");
    eprintln!("\n  Test it: vacbridge devices");
    Ok(())
}

fn read_password() -> Result<String, CliError> {
    let pass = rpassword::prompt_password("Password: ").map_err(prompt_err)?;
    if pass.is_empty() {
        return Err(CliError::Validation {
            field: "password".into(),
            reason: "password cannot be empty".into(),
        });
    }
    Ok(pass)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "home".into(),
            Profile {
                email: "a@example.com".into(),
                password: Some("secret".into()),
                device_id: Some("d-1".into()),
                ..Profile::default()
            },
        );
        cfg
    }

    #[test]
    fn redaction_masks_passwords_only() {
        let cfg = redacted(&sample());
        let home = &cfg.profiles["home"];
        assert_eq!(home.password.as_deref(), Some(MASK));
        assert_eq!(home.device_id.as_deref(), Some("d-1"));
    }

    #[test]
    fn formatted_config_never_shows_secret() {
        let text = format_config(&redacted(&sample()));
        assert!(text.contains("[profiles.home]"));
        assert!(text.contains("device_id = \"d-1\""));
        assert!(!text.contains("secret"));
    }
}
