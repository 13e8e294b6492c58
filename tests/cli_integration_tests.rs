/// Integration tests for the CLI interface
use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

/// Helper function to create a command for testing
fn emv_cmd() -> Command {
    Command::cargo_bin("emv-tester").expect("Failed to find emv-tester binary")
}

#[test]
fn test_help_command() {
    emv_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("EMV smart card explorer"))
        .stdout(predicate::str::contains("decode"))
        .stdout(predicate::str::contains("select"))
        .stdout(predicate::str::contains("get-data"));
}

#[test]
fn test_version_command() {
    emv_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("emv-tester"));
}

#[test]
fn test_list_command() {
    // Exit code depends on whether a PC/SC service is running
    emv_cmd()
        .arg("list")
        .arg("--detailed")
        .assert()
        .code(predicate::in_iter([0, 1]));
}

#[test]
fn test_invalid_command() {
    emv_cmd()
        .arg("invalid-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_decode_universal_sequence() {
    emv_cmd()
        .args(["decode", "300a02011e0202c350010100", "--universal"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SEQUENCE (0x30):"))
        .stdout(predicate::str::contains("INTEGER (0x2):"))
        .stdout(predicate::str::contains("50000"))
        .stdout(predicate::str::contains("false"));
}

#[test]
fn test_decode_emv_names() {
    emv_cmd()
        .args(["decode", "9F 17 01 03"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PIN_TRIES (0x9f17):"))
        .stdout(predicate::str::contains("3"));
}

#[test]
fn test_decode_empty_input() {
    emv_cmd()
        .args(["decode", ""])
        .assert()
        .success()
        .stdout(predicate::str::contains("(empty)"));
}

#[test]
fn test_decode_truncated() {
    emv_cmd()
        .args(["decode", "300a0201"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to decode TLV data"));
}

#[test]
fn test_decode_indefinite_length() {
    emv_cmd()
        .args(["decode", "30800000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("indefinite length"));
}

#[test]
fn test_decode_invalid_hex() {
    emv_cmd()
        .args(["decode", "30ZZ"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse TLV hex string"));
}

#[test]
fn test_transmit_without_args() {
    emv_cmd()
        .arg("transmit")
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_transmit_invalid_hex() {
    emv_cmd()
        .args(["transmit", "0", "invalid_hex"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse APDU hex string"));
}

#[test]
fn test_transmit_short_apdu() {
    emv_cmd()
        .args(["transmit", "0", "00A4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 4 header bytes"));
}

#[test]
fn test_select_invalid_reader() {
    emv_cmd()
        .args(["select", "999", "ppse"])
        .assert()
        .failure();
}

#[test]
fn test_invalid_mode() {
    emv_cmd()
        .args(["--mode", "invalid", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid share mode"));
}

#[test]
fn test_invalid_format() {
    emv_cmd()
        .args(["transmit", "0", "00A4040000", "--format", "binary"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid format"));
}

#[test]
fn test_records_sfi_must_be_number() {
    emv_cmd()
        .args(["records", "0", "visa", "one"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_card_rejects_bad_terminal_config() {
    let mut config = NamedTempFile::new().unwrap();
    writeln!(config, "{{ \"ttq\": \"not hex\" }}").unwrap();

    emv_cmd()
        .args(["card", "0", "--terminal-config"])
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid terminal config"));
}

#[test]
fn test_card_rejects_short_ttq() {
    emv_cmd()
        .args(["card", "0", "--ttq", "3600"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("TTQ must be 4 bytes"));
}

#[test]
fn test_terminal_flags_only_on_card() {
    emv_cmd()
        .args(["decode", "9F170103", "--currency", "0840"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unexpected argument"));
}

#[test]
fn test_card_with_valid_terminal_config() {
    let mut config = NamedTempFile::new().unwrap();
    writeln!(config, "{{ \"ttq\": \"36004000\", \"currency_code\": \"0840\" }}").unwrap();

    // Config loads; the rest depends on reader hardware
    emv_cmd()
        .args(["card", "999", "--terminal-config"])
        .arg(config.path())
        .assert()
        .code(predicate::in_iter([0, 1]))
        .stderr(predicate::str::contains("Invalid terminal config").not());
}

#[test]
#[ignore] // Requires a reader with an EMV card
fn test_card_flow_with_hardware() {
    let transcript = NamedTempFile::new().unwrap();
    emv_cmd()
        .args(["card", "0", "--transcript"])
        .arg(transcript.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("AFL"));

    let json = std::fs::read_to_string(transcript.path()).unwrap();
    assert!(json.contains("\"command\""));
}
