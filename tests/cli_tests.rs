//! Binary tests for commands that need no provider credentials

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const SUBSCRIPTION: &str = "
  - id: 00000000-0000-0000-0000-00000000000{n}
    channelId: 1
    sourceRepository: https://github.com/dotnet/arcade
    targetRepository: https://github.com/dotnet/runtime
    targetBranch: main
    policy:
      batchable: true
      updateFrequency: everyBuild
";

fn catalog(subscriptions: usize) -> String {
    let mut text = "channels:\n  - id: 1\n    name: .NET 9\nsubscriptions:".to_string();
    if subscriptions == 0 {
        text.push_str(" []\n");
    }
    for n in 1..=subscriptions {
        text.push_str(&SUBSCRIPTION.replace("{n}", &n.to_string()));
    }
    text
}

fn depflow(dir: &Path) -> Command {
    let config = dir.join("config.yaml");
    fs::write(
        &config,
        format!("state_dir: {}\n", dir.join("state").display()),
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("depflow").unwrap();
    cmd.arg("--config").arg(config).env_remove("DEPFLOW_CATALOG");
    cmd
}

#[test]
fn test_validate_accepts_catalog() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("catalog.yaml");
    fs::write(&path, catalog(1)).unwrap();

    depflow(temp.path())
        .arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid: 1 subscription(s)"))
        .stdout(predicate::str::contains("batchable"));
}

#[test]
fn test_validate_rejects_duplicate_subscription() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("catalog.yaml");
    fs::write(&path, catalog(2)).unwrap();

    depflow(temp.path())
        .arg("validate")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already performs the same update"));
}

#[test]
fn test_validate_uses_catalog_flag() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("flows.yaml");
    fs::write(&path, catalog(0)).unwrap();

    depflow(temp.path())
        .arg("--catalog")
        .arg(&path)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("0 subscription(s)"));
}

#[test]
fn test_status_without_state() {
    let temp = TempDir::new().unwrap();

    depflow(temp.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No active actors"));
}

#[test]
fn test_auth_setup_prints_instructions() {
    let temp = TempDir::new().unwrap();

    depflow(temp.path())
        .args(["auth", "gitlab", "setup"])
        .assert()
        .success()
        .stdout(predicate::str::contains("glab auth login"));
}
