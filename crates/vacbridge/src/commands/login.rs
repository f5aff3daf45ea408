//! `vacbridge login`: authenticate, pick a device, optionally save it.

use dialoguer::Input;
use secrecy::{ExposeSecret, SecretString};
use vacbridge_core::setup::{self, Discovery};

use crate::cli::{GlobalOpts, LoginArgs};
use crate::config::{self, Profile};
use crate::error::CliError;
use crate::output;

use super::config_cmd::prompt_err;
use super::devices;

pub async fn handle(args: &LoginArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut cfg = config::load_config_or_default();

    let (name, mut profile) = match config::effective_profile(global, &cfg) {
        Ok(found) => found,
        Err(CliError::NoConfig { .. }) => (config::active_profile_name(global, &cfg), prompt_profile()?),
        Err(e) => return Err(e),
    };

    let password = match config::resolve_password(global, &profile, &name) {
        Ok(pw) => pw,
        Err(CliError::NoCredentials { .. }) => prompt_password()?,
        Err(e) => return Err(e),
    };

    let account = vacbridge_config::build_account_config(&profile, &cfg.defaults, password.clone())?;
    let preferred = choose_device_hint(global, &profile);
    let Discovery {
        identity,
        device,
        devices,
    } = setup::discover(&account, preferred.as_deref()).await?;

    output::print_output(&devices::render(&devices, global), global.quiet);
    if !global.quiet {
        eprintln!("✓ Signed in as {} (user {})", profile.email, identity.user_id);
        eprintln!("  Selected device: {} ({})", device.name, device.device_id);
    }

    if !args.save {
        return Ok(());
    }

    profile.device_id = Some(identity.device_id);
    profile.user_id = Some(identity.user_id);
    if args.plaintext_password {
        profile.password = Some(password.expose_secret().to_owned());
    } else {
        vacbridge_config::store_password(&name, &password)?;
        profile.password = None;
    }

    cfg.profiles.insert(name.clone(), profile);
    let default_exists = cfg
        .default_profile
        .as_ref()
        .is_some_and(|d| cfg.profiles.contains_key(d));
    if !default_exists {
        cfg.default_profile = Some(name.clone());
    }
    let path = config::save_config(&cfg)?;

    if !global.quiet {
        eprintln!("✓ Profile '{name}' written to {}", path.display());
    }
    Ok(())
}

/// An explicit `--device` wins; otherwise keep the profile's device when it
/// still exists on the account.
fn choose_device_hint(global: &GlobalOpts, profile: &Profile) -> Option<String> {
    global.device.clone().or_else(|| profile.device_id.clone())
}

fn prompt_profile() -> Result<Profile, CliError> {
    let email: String = Input::new()
        .with_prompt("Account e-mail")
        .interact_text()
        .map_err(prompt_err)?;
    Ok(Profile {
        email,
        ..Profile::default()
    })
}

fn prompt_password() -> Result<SecretString, CliError> {
    let pass = rpassword::prompt_password("Password: ").map_err(prompt_err)?;
    if pass.is_empty() {
        return Err(CliError::Validation {
            field: "password".into(),
            reason: "password cannot be empty".into(),
        });
    }
    Ok(SecretString::from(pass))
}
