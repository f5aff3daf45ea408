//! CLI configuration: thin wrapper around `vacbridge_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--email, --password, --device, ...). Flags beat the profile.

use secrecy::SecretString;

use vacbridge_core::{AccountConfig, SessionConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use vacbridge_config::{Config, Profile, config_path, load_config_or_default, save_config};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// The active profile with flag overrides applied.
///
/// Without a stored profile, `--email` alone is enough to build one.
pub fn effective_profile(global: &GlobalOpts, config: &Config) -> Result<(String, Profile), CliError> {
    let name = active_profile_name(global, config);

    let mut profile = match config.profiles.get(&name) {
        Some(profile) => profile.clone(),
        None if global.email.is_some() => Profile::default(),
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                available: available_profiles(config),
                name,
            });
        }
        None => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };

    if let Some(ref email) = global.email {
        profile.email.clone_from(email);
    }
    if let Some(ref device) = global.device {
        profile.device_id = Some(device.clone());
    }
    if let Some(ref url) = global.cloud_url {
        profile.cloud_url = Some(url.clone());
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }

    Ok((name, profile))
}

/// `--password` first, then the profile's credential chain.
pub fn resolve_password(
    global: &GlobalOpts,
    profile: &Profile,
    profile_name: &str,
) -> Result<SecretString, CliError> {
    if let Some(ref pw) = global.password {
        return Ok(SecretString::from(pw.clone()));
    }
    Ok(vacbridge_config::resolve_password(profile, profile_name)?)
}

/// Account settings for commands that only talk to the cloud.
pub fn resolve_account(global: &GlobalOpts, config: &Config) -> Result<AccountConfig, CliError> {
    let (name, profile) = effective_profile(global, config)?;
    let password = resolve_password(global, &profile, &name)?;
    Ok(vacbridge_config::build_account_config(
        &profile,
        &config.defaults,
        password,
    )?)
}

/// Full session settings for commands that open the device channel.
pub fn resolve_session(global: &GlobalOpts, config: &Config) -> Result<SessionConfig, CliError> {
    let (name, profile) = effective_profile(global, config)?;
    let password = resolve_password(global, &profile, &name)?;
    let account = vacbridge_config::build_account_config(&profile, &config.defaults, password)?;
    Ok(vacbridge_config::build_session_config(
        &profile,
        &name,
        &config.defaults,
        account,
    )?)
}

pub fn available_profiles(config: &Config) -> String {
    if config.profiles.is_empty() {
        "(none)".into()
    } else {
        config.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;
    use secrecy::ExposeSecret;

    use super::*;
    use crate::cli::Cli;

    fn global(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["vacbridge"];
        argv.extend_from_slice(args);
        argv.push("devices");
        Cli::try_parse_from(argv).unwrap().global
    }

    fn config_with_home() -> Config {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "default".into(),
            Profile {
                email: "home@example.com".into(),
                password: Some("stored".into()),
                device_id: Some("d-home".into()),
                ..Profile::default()
            },
        );
        cfg
    }

    #[test]
    fn flags_override_profile() {
        let g = global(&["--email", "other@example.com", "-d", "d-2", "--password", "flag-pw"]);
        let session = resolve_session(&g, &config_with_home()).unwrap();
        assert_eq!(session.account.email, "other@example.com");
        assert_eq!(session.device_id, "d-2");
        assert_eq!(session.account.password.expose_secret(), "flag-pw");
    }

    #[test]
    fn email_flag_works_without_profile() {
        let g = global(&["--email", "a@example.com", "--password", "pw", "-d", "d-1"]);
        let session = resolve_session(&g, &Config::default()).unwrap();
        assert_eq!(session.device_id, "d-1");
    }

    #[test]
    fn nothing_configured_is_no_config() {
        let g = global(&[]);
        let err = resolve_account(&g, &Config::default()).unwrap_err();
        assert!(matches!(err, CliError::NoConfig { .. }));
    }

    #[test]
    fn named_missing_profile_is_reported() {
        let g = global(&["-p", "ghost"]);
        let err = resolve_account(&g, &config_with_home()).unwrap_err();
        assert!(matches!(err, CliError::ProfileNotFound { ref name, .. } if name == "ghost"));
    }

    #[test]
    fn session_without_device_is_usage_error() {
        let g = global(&["--email", "a@example.com", "--password", "pw"]);
        let err = resolve_session(&g, &Config::default()).unwrap_err();
        assert!(matches!(err, CliError::NoDevice { .. }));
    }
}
