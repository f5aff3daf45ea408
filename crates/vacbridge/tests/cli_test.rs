//! Integration tests for the `vacbridge` CLI binary.
//!
//! Argument parsing, help output, completions and error handling, plus
//! cloud commands against a wiremock server. No device broker needed.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

const ISOLATED_HOME: &str = "/tmp/vacbridge-cli-test-nonexistent";

/// Build a command for the `vacbridge` binary with env isolation.
///
/// Clears every `VACBRIDGE_*` variable the CLI reads and points config
/// directories at a nonexistent path so tests never touch real settings.
fn vacbridge_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("vacbridge");
    cmd.env("HOME", ISOLATED_HOME)
        .env("XDG_CONFIG_HOME", ISOLATED_HOME)
        .env_remove("VACBRIDGE_PROFILE")
        .env_remove("VACBRIDGE_EMAIL")
        .env_remove("VACBRIDGE_PASSWORD")
        .env_remove("VACBRIDGE_DEVICE")
        .env_remove("VACBRIDGE_CLOUD_URL")
        .env_remove("VACBRIDGE_OUTPUT")
        .env_remove("VACBRIDGE_INSECURE")
        .env_remove("VACBRIDGE_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

async fn mock_cloud() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-1",
            "refresh_token": "ref-1",
            "expires_in": 1800
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user_id": "u-7"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                {"device_id": "d-1", "device_name": "Upstairs", "software_version": "3.1"},
                {"device_id": "d-2", "device_name": "Kitchen"}
            ]
        })))
        .mount(&server)
        .await;
    server
}

/// Run a blocking command without stalling the mock server's runtime.
async fn run(mut cmd: assert_cmd::Command) -> std::process::Output {
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = vacbridge_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_lists_commands() {
    vacbridge_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("robot vacuum")
            .and(predicate::str::contains("status"))
            .and(predicate::str::contains("dock"))
            .and(predicate::str::contains("login")),
    );
}

#[test]
fn test_version_flag() {
    vacbridge_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("vacbridge"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    vacbridge_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    vacbridge_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Config commands ─────────────────────────────────────────────────

#[test]
fn test_config_path_points_into_config_dir() {
    vacbridge_cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vacbridge").and(predicate::str::contains("config.toml")));
}

#[test]
fn test_config_show_json_without_file() {
    let output = vacbridge_cmd()
        .args(["config", "show", "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["default_profile"], "default");
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let output = vacbridge_cmd().arg("foobar").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("foobar"));
}

#[test]
fn test_fan_rejects_unknown_mode() {
    let output = vacbridge_cmd().args(["fan", "turbo"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("turbo"));
}

#[test]
fn test_status_without_config_explains_setup() {
    let output = vacbridge_cmd().arg("status").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("config init"));
}

#[test]
fn test_start_without_device_is_usage_error() {
    let output = vacbridge_cmd()
        .args(["start", "--email", "a@example.com", "--password", "pw"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("device"));
}

// ── Cloud commands (wiremock) ───────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_devices_lists_account_devices_as_json() {
    let server = mock_cloud().await;

    let mut cmd = vacbridge_cmd();
    cmd.args(["devices", "-o", "json", "--email", "a@example.com", "--password", "pw"])
        .args(["--cloud-url", &server.uri()]);
    let output = run(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value[0]["device_id"], "d-1");
    assert_eq!(value[0]["name"], "Upstairs");
    assert_eq!(value[0]["software_version"], "3.1");
    assert_eq!(value[1]["name"], "Kitchen");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_login_selects_requested_device() {
    let server = mock_cloud().await;

    let mut cmd = vacbridge_cmd();
    cmd.args(["login", "-o", "plain", "--email", "a@example.com", "--password", "pw"])
        .args(["-d", "d-2", "--cloud-url", &server.uri()]);
    let output = run(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "d-1\nd-2");
    assert!(String::from_utf8_lossy(&output.stderr).contains("Kitchen (d-2)"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_login_with_bad_password_exits_with_auth_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let mut cmd = vacbridge_cmd();
    cmd.args(["login", "--email", "a@example.com", "--password", "wrong"])
        .args(["--cloud-url", &server.uri()]);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(3), "{}", combined_output(&output));
}
