#![allow(deprecated)] // cargo_bin deprecation - still works fine

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("pgixhealth").expect("binary should exist");
    for var in [
        "PG_HOST",
        "PG_PORT",
        "PG_DBNAME",
        "PG_UNAME",
        "PG_PASSWORD",
        "PG_SCHEMA",
        "PG_BLOAT_LIMIT",
        "PG_REMAINING_PERCENTAGE",
        "PG_ACQUIRE_TIMEOUT",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn list_prints_every_check_label() {
    cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("bloated_tables\n"))
        .stdout(predicate::str::contains("tables_without_primary_key\n"))
        .stdout(predicate::str::contains("primary_keys_with_varchar\n"));
}

#[test]
fn help_describes_subcommands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("config"))
        .stdout(predicate::str::contains("list"));
}

#[test]
fn run_requires_connection_parameters() {
    cmd()
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--database"));
}

#[test]
fn run_against_unreachable_host_fails() {
    cmd()
        .args([
            "run",
            "-H",
            "127.0.0.1",
            "--port",
            "1",
            "-d",
            "app",
            "-u",
            "checker",
            "-p",
            "secret",
            "--acquire-timeout",
            "1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to connect to database app"));
}

#[test]
fn config_reports_every_database_even_when_unreachable() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("databases.yaml");
    fs::write(
        &config,
        r#"
- host: 127.0.0.1
  port: 1
  database: first
  username: checker
  password: secret
  acquire_timeout_secs: 1
- host: 127.0.0.1
  port: 1
  database: second
  username: checker
  password: secret
  acquire_timeout_secs: 1
"#,
    )
    .unwrap();

    cmd()
        .arg("config")
        .arg("-c")
        .arg(&config)
        .assert()
        .failure()
        .stdout(predicate::str::contains("first / public"))
        .stdout(predicate::str::contains("second / public"))
        .stdout(predicate::str::contains(
            "ERROR AT bloated_tables: no open database connection",
        ));
}

#[test]
fn config_with_missing_file_fails() {
    cmd()
        .args(["config", "-c", "/definitely/not/here.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}
