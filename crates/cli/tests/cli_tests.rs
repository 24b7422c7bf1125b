//! CLI integration tests

use std::process::Command;

fn anomctl() -> Command {
    Command::new(env!("CARGO_BIN_EXE_anomctl"))
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = anomctl()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("anomaly detector"), "Should show app description");
    assert!(stdout.contains("anomalies"), "Should show anomalies command");
    assert!(stdout.contains("health"), "Should show health command");
    assert!(stdout.contains("--api-url"), "Should show api-url option");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = anomctl()
        .arg("--version")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("anomctl"), "Should show binary name");
}

/// Test anomalies subcommand help
#[test]
fn test_anomalies_help() {
    let output = anomctl()
        .args(["anomalies", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Anomalies help should succeed");
    assert!(stdout.contains("--limit"), "Should show limit option");
    assert!(stdout.contains("--format"), "Should show format option");
}

/// Test that an unknown subcommand fails
#[test]
fn test_unknown_command_fails() {
    let output = anomctl()
        .arg("recommendations")
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
}

/// Test that an unreachable API is reported as an error
#[test]
fn test_unreachable_api_fails() {
    let output = anomctl()
        .args(["--api-url", "http://127.0.0.1:1", "health"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to send request"));
}

/// Test that global options are accepted after the subcommand
#[test]
fn test_api_url_after_subcommand() {
    let output = anomctl()
        .args(["health", "--api-url", "http://127.0.0.1:1", "--format", "json"])
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(
        stderr.contains("Failed to send request"),
        "Should reach the request, not fail argument parsing"
    );
}
