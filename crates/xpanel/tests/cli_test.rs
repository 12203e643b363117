//! Integration tests for the `xpanel` CLI binary.
//!
//! Argument parsing, completions, mapping checks, and one-shot simulator
//! commands against a wiremock simulator. No serial hardware needed.
#![allow(clippy::unwrap_used)]

use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `xpanel` binary with env isolation.
fn xpanel_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("xpanel");
    cmd.env("HOME", "/tmp/xpanel-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/xpanel-cli-test-nonexistent")
        .env_remove("XPANEL_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../demos")
        .join(name)
}

/// Settings file pointing the REST API at `server`.
fn settings_for(server: &MockServer) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        format!(
            "[simulator]\nrest_url = \"{uri}/api/v2\"\nws_url = \"ws://127.0.0.1:1/api/v2\"\n",
            uri = server.uri()
        ),
    )
    .unwrap();
    (dir, path)
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = xpanel_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_lists_commands() {
    xpanel_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("run")
            .and(predicate::str::contains("check"))
            .and(predicate::str::contains("resolve")),
    );
}

#[test]
fn test_completions_zsh() {
    xpanel_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_config_path_honors_flag() {
    xpanel_cmd()
        .args(["config", "path", "--config", "/etc/xpanel/panel.toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/etc/xpanel/panel.toml"));
}

#[test]
fn test_config_show_prints_defaults() {
    xpanel_cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rest_url = \"http://localhost:8086/api/v2\""));
}

// ── Mapping checks ──────────────────────────────────────────────────

#[test]
fn test_check_demo_mapping() {
    xpanel_cmd()
        .args(["--color", "never", "--config"])
        .arg(demo("config.toml"))
        .arg("check")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("APU_MASTER")
                .and(predicate::str::contains("OK:"))
                .and(predicate::str::contains("1 combined groups")),
        );
}

#[test]
fn test_check_rejects_small_frame() {
    xpanel_cmd()
        .arg("check")
        .arg(demo("a107.toml"))
        .args(["--frame-bytes", "1"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("input bit"));
}

#[test]
fn test_check_without_mapping() {
    xpanel_cmd()
        .arg("check")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("No mapping table configured"));
}

#[test]
fn test_run_without_port() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        format!("[hardware]\nmapping = \"{}\"\nframe_bytes = 2\n", demo("a107.toml").display()),
    )
    .unwrap();

    xpanel_cmd()
        .arg("--config")
        .arg(&path)
        .arg("run")
        .assert()
        .code(5)
        .stderr(predicate::str::contains("No serial port configured"));
}

// ── Simulator one-shots ─────────────────────────────────────────────

#[tokio::test]
async fn test_resolve_prints_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/datarefs"))
        .and(query_param("filter[name]", "AirbusFBW/APUMaster"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": 4242, "name": "AirbusFBW/APUMaster" }]
        })))
        .mount(&server)
        .await;
    let (_dir, config) = settings_for(&server);

    let assert = tokio::task::spawn_blocking(move || {
        xpanel_cmd()
            .arg("--config")
            .arg(&config)
            .args(["resolve", "AirbusFBW/APUMaster"])
            .assert()
    })
    .await
    .unwrap();
    assert.success().stdout(predicate::str::contains("4242"));
}

#[tokio::test]
async fn test_set_writes_value() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/datarefs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": 7 }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/v2/datarefs/7/value"))
        .and(query_param("index", "3"))
        .and(body_json(json!({ "data": 0.5 })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let (_dir, config) = settings_for(&server);

    let assert = tokio::task::spawn_blocking(move || {
        xpanel_cmd()
            .arg("--config")
            .arg(&config)
            .args(["set", "AirbusFBW/GPWSSwitchArray", "0.5", "--index", "3"])
            .assert()
    })
    .await
    .unwrap();
    assert.success();
}

#[tokio::test]
async fn test_fire_unknown_command() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/commands"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;
    let (_dir, config) = settings_for(&server);

    let assert = tokio::task::spawn_blocking(move || {
        xpanel_cmd()
            .arg("--config")
            .arg(&config)
            .args(["fire", "does/not/exist"])
            .assert()
    })
    .await
    .unwrap();
    assert
        .code(4)
        .stderr(predicate::str::contains("does/not/exist"));
}

#[test]
fn test_set_unreachable_simulator() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[simulator]\nrest_url = \"http://127.0.0.1:1/api/v2\"\ntimeout_secs = 2\n",
    )
    .unwrap();

    xpanel_cmd()
        .arg("--config")
        .arg(&path)
        .args(["set", "sim/x", "1"])
        .assert()
        .code(7)
        .stderr(predicate::str::contains("Could not reach the simulator"));
}
