//! End-to-end tests for the rtm binary
//!
//! These run the real binary against a scratch configuration and SQLite
//! database. External tools are pointed at names that do not exist, so no
//! grid service is ever contacted.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Write a configuration whose database lives in `dir`
fn write_config(dir: &Path, min_timeleft: u64) -> PathBuf {
    let path = dir.join("rtm.toml");
    let db = dir.join("rtm.db");
    std::fs::write(
        &path,
        format!(
            r#"
db_url = "sqlite://{}"
max_dasgoclient = 2
max_xrdadler32 = 2

[voms-proxy]
min_timeleft = {}
voms_proxy_args = []

[catalog]
command = "rtm-test-no-such-dasgoclient"

[verify]
command = "rtm-test-no-such-xrdadler32"
"#,
            db.display(),
            min_timeleft
        ),
    )
    .unwrap();
    path
}

fn rtm(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("rtm").unwrap();
    cmd.arg("--config").arg(config).env_remove("RTM_DB_URL");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("rtm").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("define"))
        .stdout(predicate::str::contains("subscribe"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("verify"))
        .stdout(predicate::str::contains("summary"))
        .stdout(predicate::str::contains("whoami"));
}

#[test]
fn test_missing_subcommand() {
    let mut cmd = Command::cargo_bin("rtm").unwrap();
    cmd.assert()
        .code(2)
        .stderr(predicate::str::contains("A subcommand is required"));
}

#[test]
fn test_delete_is_a_stub() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), 0);

    rtm(&config)
        .arg("delete")
        .assert()
        .success()
        .stderr(predicate::str::contains("Not implemented yet"));
}

#[test]
fn test_summary_on_empty_database() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), 0);

    rtm(&config)
        .args(["--no-proxy-check", "summary"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No datasets defined."));

    assert!(dir.path().join("rtm.db").exists());
}

#[test]
fn test_status_without_update_lists_total() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), 0);

    rtm(&config)
        .args(["--no-proxy-check", "status", "--no-update", "Run2016*"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0.00 B      0 Total"));
}

#[test]
fn test_define_requires_site() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), 0);

    rtm(&config)
        .args(["--no-proxy-check", "define", "/A/B/RAW"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--site is required"));
}

#[test]
fn test_define_reports_catalog_failure() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), 0);
    let list = dir.path().join("datasets.yaml");
    std::fs::write(&list, "site: T2_CH_CERN\ndatasets:\n  - /A/B/RAW\n").unwrap();

    rtm(&config)
        .args(["--no-proxy-check", "define", "--file"])
        .arg(&list)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 defined, 0 skipped, 1 failed"))
        .stderr(predicate::str::contains("/A/B/RAW"));

    // Nothing was stored for the failed dataset
    rtm(&config)
        .args(["--no-proxy-check", "summary"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No datasets defined."));
}

#[test]
fn test_no_valid_proxy() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), 1_000_000_000);

    rtm(&config)
        .env("PATH", dir.path())
        .arg("summary")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No valid proxy"));
}

#[test]
fn test_config_is_created_when_missing() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("nested").join("rtm.toml");

    Command::cargo_bin("rtm")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .env("RTM_DB_URL", format!("sqlite://{}", dir.path().join("rtm.db").display()))
        .args(["--no-proxy-check", "summary"])
        .assert()
        .success();

    let written = std::fs::read_to_string(&config).unwrap();
    assert!(written.contains("[voms-proxy]"));
}
