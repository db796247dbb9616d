//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run against the dev data directory
//! and verify outputs.

use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-p", "emapulse-cli", "--"])
        .args(args)
        .env("EMAPULSE_ENV", "dev")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

#[test]
fn test_label_add_and_list() {
    let (stdout, stderr, code) = run_cli(&[
        "label",
        "add",
        "cli-anxious",
        "--form",
        "cli-form",
        "--kind",
        "ema",
        "--interval-secs",
        "300",
    ]);
    assert_eq!(code, 0, "label add failed: {stderr}");
    assert!(stdout.contains("cli-anxious"));

    let (stdout, stderr, code) = run_cli(&["label", "list"]);
    assert_eq!(code, 0, "label list failed: {stderr}");
    assert!(stdout.contains("cli-anxious"));
}

#[test]
fn test_label_add_rejects_bad_kind() {
    let (_stdout, stderr, code) = run_cli(&[
        "label", "add", "cli-bad", "--form", "cli-form", "--kind", "bogus",
    ]);
    assert_ne!(code, 0);
    assert!(stderr.contains("unknown label kind"));
}

#[test]
fn test_log_starts_episode_and_status_shows_it() {
    let (_stdout, stderr, code) = run_cli(&[
        "label",
        "add",
        "cli-tense",
        "--form",
        "cli-form",
        "--kind",
        "ema",
        "--interval-secs",
        "600",
    ]);
    assert_eq!(code, 0, "label add failed: {stderr}");

    let (stdout, stderr, code) = run_cli(&["log", "cli-tense", "--user", "cli-user-1"]);
    assert_eq!(code, 0, "log failed: {stderr}");
    assert!(stdout.contains("\"outcome\""));

    let (stdout, stderr, code) = run_cli(&["status", "--user", "cli-user-1"]);
    assert_eq!(code, 0, "status failed: {stderr}");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("status prints JSON");
    assert_eq!(parsed["user_id"], "cli-user-1");
}

#[test]
fn test_respond_on_unknown_state_settles_quietly() {
    let (stdout, stderr, code) = run_cli(&["respond", "no-such-state", "yes"]);
    assert_eq!(code, 0, "respond failed: {stderr}");
    assert!(stdout.contains("already_settled"));
}

#[test]
fn test_respond_rejects_bad_answer() {
    let (_stdout, stderr, code) = run_cli(&["respond", "some-state", "maybe"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("unknown answer"));
}

#[test]
fn test_subscribe_set_and_show() {
    let (stdout, stderr, code) = run_cli(&[
        "subscribe",
        "set",
        "https://push.example/cli-user-2",
        "--user",
        "cli-user-2",
    ]);
    assert_eq!(code, 0, "subscribe set failed: {stderr}");
    assert!(stdout.contains("push.example"));

    let (stdout, stderr, code) = run_cli(&["subscribe", "show", "--user", "cli-user-2"]);
    assert_eq!(code, 0, "subscribe show failed: {stderr}");
    assert!(stdout.contains("https://push.example/cli-user-2"));
}

#[test]
fn test_sweep_once_prints_report() {
    let (stdout, stderr, code) = run_cli(&["sweep", "once"]);
    assert_eq!(code, 0, "sweep once failed: {stderr}");
    assert!(stdout.contains("\"due\""));
    assert!(stdout.contains("\"delivered\""));
}

#[test]
fn test_config_list_and_get() {
    let (stdout, stderr, code) = run_cli(&["config", "list"]);
    assert_eq!(code, 0, "config list failed: {stderr}");
    assert!(stdout.contains("interval_secs"));

    let (stdout, stderr, code) = run_cli(&["config", "get", "push.default_title"]);
    assert_eq!(code, 0, "config get failed: {stderr}");
    assert!(stdout.contains("Behavior Check"));
}

#[test]
fn test_config_get_unknown_key_fails() {
    let (_stdout, _stderr, code) = run_cli(&["config", "get", "not.a.key"]);
    assert_ne!(code, 0);
}
