#![cfg(all(unix, feature = "cli"))]

use std::process::{Command, Output};

fn daisy(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_daisy"))
        .args(["--log-level", "error"])
        .args(args)
        .env_remove("SERIAL_PORT")
        .env_remove("SERIAL_PORT_BAUD_RATE")
        .output()
        .expect("daisy should run")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn encode_set_relay_outputs_wire_bytes() {
    let output = daisy(&[
        "--format", "json", "encode", "setRelay", "--id", "3", "--state", "on",
    ]);

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    assert_eq!(json["hex"], "41c0");
    assert_eq!(json["bits"], "01000001 11000000");
    assert_eq!(json["request"]["subject"], "setRelay");
    assert_eq!(json["request"]["relayId"], 3);
}

#[test]
fn encode_out_of_range_id_is_usage_error() {
    let output = daisy(&["--format", "json", "encode", "getRelay", "--id", "8"]);
    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("relayId"));
}

#[test]
fn encode_unknown_subject_is_usage_error() {
    let output = daisy(&["encode", "openValve", "--id", "1"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn decode_soil_moisture_event() {
    let output = daisy(&["--format", "json", "decode", "00 0000 0010 1000000"]);

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    assert_eq!(json["outcome"], "telemetry");
    assert_eq!(json["event"], "soil-moisture");
    assert_eq!(json["sensorId"], 2);
    assert_eq!(json["moisture"], 64);
}

#[test]
fn decode_dht_response_for_pending_request() {
    let output = daisy(&[
        "--format",
        "json",
        "decode",
        "10 0101010 10101010",
        "--pending",
        "getDHT",
    ]);

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    assert_eq!(json["outcome"], "response");
    assert_eq!(json["status"], "success");
    assert_eq!(json["reply"]["humidity"], 42);
    assert_eq!(json["reply"]["temperature"], 45.0);
}

#[test]
fn decode_unexpected_response_exits_data_invalid() {
    let output = daisy(&["--format", "pretty", "decode", "0x80"]);
    assert_eq!(output.status.code(), Some(60));
    assert!(stdout(&output).contains("error:"));
}

#[test]
fn decode_request_packet() {
    let output = daisy(&["--format", "json", "decode", "0x4180", "--request"]);

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    assert_eq!(json["outcome"], "request");
    assert_eq!(json["subject"], "setRelay");
    assert_eq!(json["relayId"], 3);
    assert_eq!(json["state"], false);
}

#[test]
fn request_without_board_times_out_with_124() {
    let output = daisy(&[
        "request",
        "getRelay",
        "--id",
        "1",
        "--port",
        "/dev/daisy-missing-device",
        "--timeout",
        "300ms",
    ]);
    assert_eq!(output.status.code(), Some(124));
}

#[test]
fn version_prints_package_version() {
    let output = daisy(&["version"]);
    assert!(output.status.success());
    assert_eq!(
        stdout(&output).trim(),
        format!("daisy {}", env!("CARGO_PKG_VERSION"))
    );
}
