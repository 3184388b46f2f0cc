//! CLI options interaction tests
//!
//! Everything here runs offline: the location catalog is always served from
//! a cache file and probes only target closed loopback ports.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::net::TcpListener;
use std::process::Command;
use tempfile::TempDir;

fn create_test_cmd() -> Command {
    let mut cmd = Command::cargo_bin("aes").unwrap();
    cmd.env_remove("MAX_THREADS")
        .env_remove("ENABLE_TLS")
        .env_remove("PROBE_PROTOCOL")
        .env("NO_COLOR", "1");
    cmd
}

/// Working directory with a cached catalog and the given input file
fn workspace(input: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("locations.json"),
        r#"[{"iata":"SJC","lat":37.36,"lon":-121.93,"cca2":"US","region":"North America","city":"San Jose"}]"#,
    )
    .unwrap();
    fs::write(dir.path().join("ip.txt"), input).unwrap();
    dir
}

fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn test_help_lists_scan_options() {
    create_test_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--max-threads"))
        .stdout(predicate::str::contains("--speed-test-threads"))
        .stdout(predicate::str::contains("--iata"))
        .stdout(predicate::str::contains("--protocol"));
}

#[test]
fn test_version_flag() {
    create_test_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_print_env_example() {
    create_test_cmd()
        .arg("--print-env-example")
        .assert()
        .success()
        .stdout(predicate::str::contains("# MAX_THREADS=100"))
        .stdout(predicate::str::contains("# IATA_FILTER="));
}

#[test]
fn test_invalid_timeout_rejected_by_parser() {
    create_test_cmd()
        .args(["--sto", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Timeout must be greater than 0"));
}

#[test]
fn test_h3_without_tls_is_config_error() {
    let dir = workspace("");
    create_test_cmd()
        .current_dir(dir.path())
        .args(["--protocol", "h3", "--tls", "false"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("CONFIG").or(predicate::str::contains("Configuration")));
}

#[test]
fn test_env_file_layer_is_overridden_by_flags() {
    let dir = workspace("");
    fs::write(dir.path().join(".env"), "ENABLE_TLS=false\nPROBE_PROTOCOL=h3\n").unwrap();

    // .env alone is contradictory
    create_test_cmd().current_dir(dir.path()).assert().code(1);

    // a flag resolves it
    create_test_cmd()
        .current_dir(dir.path())
        .args(["--protocol", "h1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no valid IP found"));
}

#[test]
fn test_missing_input_file_exit_code() {
    let dir = workspace("");
    create_test_cmd()
        .current_dir(dir.path())
        .args(["-f", "does-not-exist.txt"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("does-not-exist.txt"));
}

#[test]
fn test_zero_survivors_exits_cleanly() {
    let port = closed_port();
    let dir = workspace(&format!("127.0.0.1:{}\n# comment\n\n", port));

    create_test_cmd()
        .current_dir(dir.path())
        .args(["--tls", "false", "--dt", "4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Using cached location catalog"))
        .stdout(predicate::str::contains("Loaded 1 endpoints"))
        .stdout(predicate::str::contains("no valid IP found"));

    assert!(!dir.path().join("ip.csv").exists());
}

#[test]
fn test_unparsable_lines_are_reported() {
    let port = closed_port();
    let dir = workspace(&format!("example.com\n127.0.0.1:{}\n", port));

    create_test_cmd()
        .current_dir(dir.path())
        .args(["--tls", "false"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Skipped line 1"));
}

#[test]
fn test_explicit_paths() {
    let port = closed_port();
    let dir = workspace("");
    let input = dir.path().join("candidates.txt");
    fs::write(&input, format!("127.0.0.1:{}\n", port)).unwrap();

    create_test_cmd()
        .current_dir(dir.path())
        .arg("-f")
        .arg(&input)
        .arg("--locations")
        .arg(dir.path().join("locations.json"))
        .args(["--tls", "false", "--st", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("candidates.txt"));
}
