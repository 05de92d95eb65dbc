//! CLI integration tests
//!
//! End-to-end tests for CLI commands using assert_cmd.

use aerolink::mock::{MockConfig, MockServer, MockState};
use std::sync::Arc;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Get the aerolink binary for testing
fn aerolink_cmd() -> Command {
    let mut cmd = Command::cargo_bin("aerolink").unwrap();
    for var in [
        "AEROLINK_BASE_URL",
        "AEROLINK_TEAM",
        "AEROLINK_SESSION_ID",
        "AEROLINK_MAX_FRAMES",
        "AEROLINK_LOG_LEVEL",
        "AEROLINK_LOG_FORMAT",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// Fast-retry config for runs against local servers
fn write_fast_config(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("aerolink.toml");
    std::fs::write(
        &path,
        r#"
[retry]
backoff_base_seconds = 0.01
backoff_max_seconds = 0.05

[logging]
level = "warn"
"#,
    )
    .unwrap();
    path
}

#[test]
fn test_version_output() {
    aerolink_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("aerolink"));
}

#[test]
fn test_help_shows_all_commands() {
    aerolink_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("mock-server"))
        .stdout(predicate::str::contains("config"))
        .stdout(predicate::str::contains("completions"));
}

#[test]
fn test_run_help() {
    aerolink_cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--base-url"))
        .stdout(predicate::str::contains("--max-frames"));
}

#[test]
fn test_config_init_creates_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("aerolink.toml");

    aerolink_cmd()
        .args(["config", "init", "-o", config_path.to_str().unwrap()])
        .assert()
        .success();

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[server]"));
    assert!(content.contains("[breaker]"));
}

#[test]
fn test_config_init_no_overwrite() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("aerolink.toml");
    std::fs::write(&config_path, "existing content").unwrap();

    aerolink_cmd()
        .args(["config", "init", "-o", config_path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert_eq!(content, "existing content");
}

#[test]
fn test_completions_bash() {
    aerolink_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("aerolink"));
}

#[test]
fn test_run_rejects_invalid_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("aerolink.toml");
    std::fs::write(&config_path, "[retry]\nbackoff_jitter_ratio = 2.0\n").unwrap();

    aerolink_cmd()
        .args(["run", "-c", config_path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("backoff_jitter_ratio"));
}

#[test]
fn test_run_unreachable_server_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_fast_config(&temp_dir);
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    aerolink_cmd()
        .args(["run", "-c", config_path.to_str().unwrap()])
        .args(["--base-url", &format!("http://{}", addr)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unreachable"));
}

/// Serve `frames` synthetic frames from an in-process mock on `runtime`
fn spawn_mock(
    runtime: &tokio::runtime::Runtime,
    frames: usize,
) -> (String, Arc<MockState>, CancellationToken) {
    let server = runtime
        .block_on(MockServer::bind(&MockConfig {
            port: 0,
            synthetic_frames: frames,
            ..Default::default()
        }))
        .unwrap();
    let base_url = format!("http://{}", server.local_addr().unwrap());
    let state = server.state();
    let cancel = CancellationToken::new();
    runtime.spawn(server.serve(cancel.clone()));
    (base_url, state, cancel)
}

#[test]
fn test_run_against_mock_prints_json_report() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (base_url, state, cancel) = spawn_mock(&runtime, 4);

    let temp_dir = TempDir::new().unwrap();
    let config_path = write_fast_config(&temp_dir);

    let output = aerolink_cmd()
        .args(["run", "-c", config_path.to_str().unwrap()])
        .args(["--base-url", &base_url, "--json"])
        .output()
        .unwrap();
    cancel.cancel();

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["stop_reason"]["kind"], "end_of_stream");
    assert_eq!(report["kpi"]["send_ok"], 4);
    assert_eq!(state.results_received(), 4);
}

#[test]
fn test_run_logs_session_summary_once() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (base_url, _state, cancel) = spawn_mock(&runtime, 2);

    let temp_dir = TempDir::new().unwrap();
    let config_path = write_fast_config(&temp_dir);

    let output = aerolink_cmd()
        .args(["run", "-c", config_path.to_str().unwrap()])
        .args(["--base-url", &base_url, "--json", "-l", "info"])
        .output()
        .unwrap();
    cancel.cancel();

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("Session finished").count(), 1, "{stderr}");
}
