//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

/// Captured "read gross weight" response: +001234, kg, stable, 2 decimals.
const GROSS_RESPONSE: &str = "02 41 42 2B 30 30 31 32 33 34 6B 67 53 20 20 20 32 36 31 03";

fn cli_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("scalelink");
    cmd.env_remove("SCALELINK_PORT")
        .env_remove("SCALELINK_BAUD");
    cmd
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("scalelink"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("scalelink"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn completions_command_writes_to_stdout() {
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty())
        .stdout(predicate::str::contains("_scalelink()"));
}

// ============================================================================
// Offline Codec Tests
// ============================================================================

#[test]
fn encode_prints_canned_frame() {
    let mut cmd = cli_cmd();
    cmd.args(["encode", "--op", "B"])
        .assert()
        .success()
        .stdout(predicate::str::diff("02 41 42 30 33 03\n"));
}

#[test]
fn encode_accepts_numeric_code_and_address() {
    let mut cmd = cli_cmd();
    cmd.args(["--address", "C", "encode", "--op", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("02 43 41 30 32 03"));
}

#[test]
fn encode_unaddressed_layout() {
    let mut cmd = cli_cmd();
    cmd.args(["--layout", "unaddressed", "encode", "--op", "E"])
        .assert()
        .success()
        .stdout(predicate::str::contains("02 45 34 35 03"));
}

#[test]
fn encode_json_is_clean() {
    let mut cmd = cli_cmd();
    let output = cmd
        .args(["encode", "--op", "D", "--json"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty())
        .get_output()
        .clone();

    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(value["ok"], true);
    assert_eq!(value["data"]["command"], "D");
    assert_eq!(value["data"]["code"], 4);
    assert_eq!(value["data"]["frame"], "02 41 44 30 35 03");
}

#[test]
fn decode_prints_weight() {
    let mut cmd = cli_cmd();
    cmd.args(["decode", GROSS_RESPONSE])
        .assert()
        .success()
        .stdout(predicate::str::diff("12.34\n"));
}

#[test]
fn decode_json_includes_unit_and_status() {
    let mut cmd = cli_cmd();
    let output = cmd
        .args(["decode", "--json", GROSS_RESPONSE])
        .assert()
        .success()
        .get_output()
        .clone();

    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(value["data"]["reading"]["weight"], "12.34");
    assert_eq!(value["data"]["reading"]["unit"], "kg");
    assert_eq!(value["data"]["reading"]["status"], "stable");
    assert_eq!(value["data"]["checksum_ok"], true);
}

#[test]
fn decode_strict_checksum_rejects_corrupted_frame() {
    let corrupted = GROSS_RESPONSE.replace("32 36 31 03", "32 30 30 03");

    let mut cmd = cli_cmd();
    cmd.args(["decode", &corrupted])
        .assert()
        .success()
        .stdout(predicate::str::contains("12.34"));

    let mut cmd = cli_cmd();
    cmd.args(["--strict-checksum", "decode", &corrupted])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn decode_short_frame_fails() {
    let mut cmd = cli_cmd();
    cmd.args(["decode", "02 41 42 30 33 03"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("too short"));
}

// ============================================================================
// Exit Code Tests
// ============================================================================

/// Exit code 2: usage error (unknown command, invalid arguments)
#[test]
fn exit_code_two_for_usage_error_unknown_command() {
    let mut cmd = cli_cmd();
    cmd.arg("unknown-command-xyz")
        .assert()
        .failure()
        .code(2);
}

#[test]
fn exit_code_two_for_unknown_operation_code() {
    let mut cmd = cli_cmd();
    cmd.args(["encode", "--op", "Z"])
        .assert()
        .failure()
        .code(2)
        .stdout(predicate::str::is_empty());
}

#[test]
fn exit_code_two_for_invalid_hex() {
    let mut cmd = cli_cmd();
    cmd.args(["decode", "02 4G"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn exit_code_two_for_invalid_width_flag() {
    let mut cmd = cli_cmd();
    cmd.args(["--width", "9", "encode", "--op", "B"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn exit_code_two_when_no_port_is_configured() {
    let dir = tempdir().expect("tempdir should be created");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .env("HOME", dir.path())
        .arg("read")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("no serial port"));
}

/// Exit code 3: configuration error
#[test]
fn exit_code_three_for_invalid_config_value() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(
        dir.path()
            .join("scalelink.toml"),
        "[protocol]\nwidth = 9\n",
    )
    .expect("write config");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .args(["encode", "--op", "B"])
        .assert()
        .failure()
        .code(3);
}

#[test]
fn invalid_toml_warns_and_continues() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(
        dir.path()
            .join("scalelink.toml"),
        "invalid toml [[[",
    )
    .expect("write invalid config");

    let output = cli_cmd()
        .current_dir(dir.path())
        .args(["encode", "--op", "B"])
        .output()
        .expect("command should execute");

    assert!(
        output
            .status
            .success(),
        "command should succeed despite config warning"
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("TOML"), "should warn about invalid TOML");
}

#[test]
fn local_config_selects_protocol_variant() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(
        dir.path()
            .join("scalelink.toml"),
        "[protocol]\nlayout = \"unaddressed\"\nwidth = 8\n",
    )
    .expect("write config");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .args(["decode", "02 42 2D 30 31 32 33 34 35 31 35 46 03"])
        .assert()
        .success()
        .stdout(predicate::str::diff("-1234.5\n"));
}

/// Exit code 4: device not found
#[test]
fn missing_port_fails() {
    let output = cli_cmd()
        .args(["-p", "INVALID_PORT_NAME_XYZ", "read"])
        .output()
        .expect("command should execute");

    // 4 when the port list is readable, 1 when enumeration itself fails
    assert!(
        !output
            .status
            .success(),
        "device not found should not succeed"
    );
    assert!(matches!(output.status.code(), Some(1 | 4)));
}

// ============================================================================
// JSON Output Purity Tests
// ============================================================================

#[test]
fn list_ports_json_returns_envelope() {
    let output = cli_cmd()
        .args(["list-ports", "--json"])
        .assert()
        .success()
        .get_output()
        .clone();

    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(value["ok"], true);
    assert!(value["data"]["ports"].is_array());
}

#[test]
fn colors_disabled_when_not_tty() {
    let output = cli_cmd()
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .clone();

    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf-8");
    assert!(
        !stdout.contains("\x1b["),
        "Colors should be disabled in non-TTY mode"
    );
}
