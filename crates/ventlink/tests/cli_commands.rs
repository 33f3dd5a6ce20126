#![cfg(feature = "cli")]

use std::process::{Command, Output};

fn ventlink(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ventlink"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .output()
        .expect("ventlink should run")
}

fn json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

#[test]
fn encode_get_state_frame() {
    let output = ventlink(&["--format", "json", "encode", "get-state", "--password", "1234"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let value = json(&output);
    assert_eq!(value["command"], "GET_STATE");
    assert_eq!(
        value["frame"],
        format!("0531323334{}cf", "00".repeat(14))
    );
    assert_eq!(value["checksum"], 0xCF);
    assert_eq!(value["truncated"], false);
}

#[test]
fn encode_reports_truncated_args() {
    let mut args = vec!["--format", "json", "encode", "set-timer"];
    for _ in 0..14 {
        args.extend(["--arg", "1"]);
    }
    let output = ventlink(&args);
    assert!(output.status.success());
    assert_eq!(json(&output)["truncated"], true);
}

#[test]
fn decode_auth_reply() {
    let output = ventlink(&["--format", "json", "decode", "55 aa 02 01 01 02"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let value = json(&output);
    assert_eq!(value["command"], "AUTH");
    assert_eq!(value["kind"], "auth");
    assert_eq!(value["auth"], "accepted");
}

#[test]
fn decode_bad_checksum_is_data_invalid() {
    let output = ventlink(&["decode", "55aa02010103"]);
    assert_eq!(output.status.code(), Some(60));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("checksum mismatch"), "stderr: {stderr}");
}

#[test]
fn decode_odd_hex_is_usage_error() {
    let output = ventlink(&["decode", "55a"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn simulate_poll_and_control() {
    let output = ventlink(&[
        "--format",
        "json",
        "simulate",
        "--cycles",
        "2",
        "--set-speed",
        "7",
        "--settle",
        "20ms",
        "--window",
        "50ms",
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let value = json(&output);
    assert_eq!(value["auth_status"], "authenticated");
    assert_eq!(value["cycles"].as_array().map(Vec::len), Some(3));
    assert_eq!(value["controls"][0]["command"], "SET_SPEED");
    assert_eq!(value["controls"][0]["ok"], true);
    assert_eq!(value["state"]["speed"], 7);
    assert_eq!(value["frames"][0], "AUTH");
}

#[test]
fn simulate_refused_connection_is_transport_error() {
    let output = ventlink(&["--format", "json", "simulate", "--refuse-connect"]);
    assert_eq!(output.status.code(), Some(3));

    let value = json(&output);
    assert_eq!(value["cycles"][0]["ok"], false);
    assert_eq!(value["cycles"][0]["failure"]["kind"], "connectivity");
}

#[test]
fn simulate_wrong_password_refuses_control() {
    let output = ventlink(&[
        "--format",
        "json",
        "simulate",
        "--device-password",
        "9999",
        "--set-speed",
        "4",
        "--settle",
        "20ms",
        "--window",
        "50ms",
    ]);
    assert_eq!(output.status.code(), Some(60));

    let value = json(&output);
    assert_eq!(value["auth_status"], "unauthenticated");
    assert_eq!(value["cycles"][0]["failure"]["kind"], "data");
    assert_eq!(value["controls"][0]["ok"], false);
}

#[test]
fn version_prints_name() {
    let output = ventlink(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("ventlink "), "stdout: {stdout}");
}
