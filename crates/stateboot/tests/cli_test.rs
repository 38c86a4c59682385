#![allow(deprecated)] // TODO: move from Command::cargo_bin to the cargo_bin_cmd! macro

use assert_cmd::Command;
use predicates::prelude::*;

fn stateboot(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("stateboot").unwrap();
    cmd.current_dir(dir)
        .env_remove("STATEBOOT_CONFIG")
        .env_remove("AZURE_SUBSCRIPTION_ID")
        .env("NO_COLOR", "1");
    cmd
}

/// Help lists every subcommand
#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("stateboot").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Terraform state backend"))
        .stdout(predicate::str::contains("bootstrap"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("scaffold"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("stateboot").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("stateboot"));
}

#[test]
fn test_bootstrap_help() {
    let mut cmd = Command::cargo_bin("stateboot").unwrap();
    cmd.arg("bootstrap")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--yes"))
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--no-encryption"));
}

#[test]
fn test_invalid_command() {
    let mut cmd = Command::cargo_bin("stateboot").unwrap();
    cmd.arg("invalid-command").assert().failure();
}

/// The plan is printed in dependency order without calling az
#[test]
fn test_plan_prints_steps() {
    let temp_dir = tempfile::tempdir().unwrap();
    stateboot(temp_dir.path())
        .args([
            "plan",
            "--storage-account",
            "tfstate12345",
            "--key-vault",
            "kv-tfstate-12345",
            "--principal-id",
            "0000-oid",
            "-e",
            "dev,prod",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("[resource-group]"))
        .stdout(predicate::str::contains(
            "az storage container create --name tfstate --account-name tfstate12345",
        ))
        .stdout(predicate::str::contains("--assignee-object-id 0000-oid"))
        .stdout(predicate::str::contains("<managed-identity.principal_id>"))
        .stdout(predicate::str::contains("dev/backend.conf"));
}

#[test]
fn test_plan_without_encryption() {
    let temp_dir = tempfile::tempdir().unwrap();
    stateboot(temp_dir.path())
        .args(["plan", "--storage-account", "tfstate12345", "--no-encryption"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[container]"))
        .stdout(predicate::str::contains("keyvault").not());
}

/// Name validation fails before anything runs
#[test]
fn test_plan_rejects_invalid_storage_account() {
    let temp_dir = tempfile::tempdir().unwrap();
    stateboot(temp_dir.path())
        .args(["plan", "--storage-account", "Invalid_Name"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid storage account name"));
}

#[test]
fn test_plan_uses_settings_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        temp_dir.path().join("stateboot.yaml"),
        "resource_group: rg-from-file\nencryption:\n  enabled: false\n",
    )
    .unwrap();

    stateboot(temp_dir.path())
        .args(["plan", "--storage-account", "tfstate12345"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rg-from-file"));
}

#[test]
fn test_broken_settings_file_is_reported() {
    let temp_dir = tempfile::tempdir().unwrap();
    std::fs::write(temp_dir.path().join("stateboot.yaml"), "parallelism: lots\n").unwrap();

    stateboot(temp_dir.path())
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("stateboot.yaml"));
}

#[test]
fn test_scaffold_creates_and_skips() {
    let temp_dir = tempfile::tempdir().unwrap();

    stateboot(temp_dir.path())
        .args(["scaffold", "-e", "test,prod"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"));

    assert!(temp_dir.path().join("terraform/prod/appservice.tf").exists());
    assert!(temp_dir.path().join(".github/workflows/ci-cd.yml").exists());

    stateboot(temp_dir.path())
        .args(["scaffold", "-e", "test,prod"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Skipped"))
        .stdout(predicate::str::contains("Created").not());
}
