// ABOUTME: Integration tests for the stevedore CLI commands.
// ABOUTME: Runs the binary against generic-strategy projects in temp directories.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

fn stevedore_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("stevedore"))
}

/// A generic project whose artifact already exists and whose health checks are skipped.
fn project(dir: &Path) {
    fs::create_dir_all(dir.join("dist")).unwrap();
    fs::write(dir.join("dist").join("index.html"), "hello").unwrap();
    fs::write(
        dir.join("stevedore.yml"),
        r#"
project: demo
strategy: generic
artifact:
  path: dist
environments:
  dev:
    skip_health_check: true
  staging:
    skip_health_check: true
  prod:
    skip_health_check: true
"#,
    )
    .unwrap();
}

#[test]
fn help_shows_commands() {
    stevedore_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("rollback"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn init_creates_config_file() {
    let temp_dir = tempfile::tempdir().unwrap();

    stevedore_cmd()
        .current_dir(temp_dir.path())
        .args(["init", "--project", "shop", "--strategy", "docker"])
        .assert()
        .success();

    let content = fs::read_to_string(temp_dir.path().join("stevedore.yml")).unwrap();
    assert!(content.contains("project: shop"));
    assert!(content.contains("docker:"));
}

#[test]
fn init_refuses_to_overwrite_existing_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(temp_dir.path().join("stevedore.yml"), "project: x\n").unwrap();

    stevedore_cmd()
        .current_dir(temp_dir.path())
        .arg("init")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn missing_config_is_a_config_error() {
    let temp_dir = tempfile::tempdir().unwrap();

    stevedore_cmd()
        .current_dir(temp_dir.path())
        .args(["deploy", "dev"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn prod_without_force_is_a_validation_error() {
    let temp_dir = tempfile::tempdir().unwrap();
    project(temp_dir.path());

    stevedore_cmd()
        .current_dir(temp_dir.path())
        .args(["deploy", "prod", "--tag", "1.0.0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--force"));

    assert!(!temp_dir.path().join(".stevedore/versions/prod").exists());
}

#[test]
fn forced_prod_deploy_reports_the_override_in_json() {
    let temp_dir = tempfile::tempdir().unwrap();
    project(temp_dir.path());

    stevedore_cmd()
        .current_dir(temp_dir.path())
        .args(["--json", "deploy", "prod", "--tag", "1.0.0", "--force", "--approve", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""warnings":[{"kind":"forced""#))
        .stdout(predicate::str::contains(r#""version_id":"1.0.0""#));
}

#[test]
fn unknown_environment_is_a_validation_error() {
    let temp_dir = tempfile::tempdir().unwrap();
    project(temp_dir.path());

    stevedore_cmd()
        .current_dir(temp_dir.path())
        .args(["deploy", "mars", "--tag", "1.0.0"])
        .assert()
        .code(2);
}

#[test]
fn dry_run_prints_plan_without_recording() {
    let temp_dir = tempfile::tempdir().unwrap();
    project(temp_dir.path());

    stevedore_cmd()
        .current_dir(temp_dir.path())
        .args(["deploy", "staging", "--tag", "1.0.0", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run"))
        .stdout(predicate::str::contains("health:   skipped"));

    assert!(!temp_dir.path().join(".stevedore/versions/staging").exists());
}

#[test]
fn deploy_status_and_rollback_round_trip() {
    let temp_dir = tempfile::tempdir().unwrap();
    project(temp_dir.path());

    for tag in ["1.0.0", "1.1.0"] {
        stevedore_cmd()
            .current_dir(temp_dir.path())
            .args(["deploy", "staging", "--tag", tag])
            .assert()
            .success();
    }
    assert!(
        temp_dir
            .path()
            .join(".stevedore/versions/staging/1.1.0/metadata.json")
            .is_file()
    );

    stevedore_cmd()
        .current_dir(temp_dir.path())
        .args(["status", "staging"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1.1.0"));

    stevedore_cmd()
        .current_dir(temp_dir.path())
        .args(["--json", "rollback", "staging", "--list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"version_id\":\"1.1.0\""))
        .stdout(predicate::str::contains("\"version_id\":\"1.0.0\""));

    stevedore_cmd()
        .current_dir(temp_dir.path())
        .args(["rollback", "staging"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1.0.0 restored on staging"));
}

#[test]
fn rollback_to_missing_version_is_a_storage_error() {
    let temp_dir = tempfile::tempdir().unwrap();
    project(temp_dir.path());

    stevedore_cmd()
        .current_dir(temp_dir.path())
        .args(["deploy", "staging", "--tag", "1.0.0"])
        .assert()
        .success();

    stevedore_cmd()
        .current_dir(temp_dir.path())
        .args(["rollback", "staging", "--version", "1.0.1"])
        .assert()
        .code(7)
        .stderr(predicate::str::contains("1.0.1"));
}

#[test]
fn failing_build_is_a_build_error() {
    let temp_dir = tempfile::tempdir().unwrap();
    project(temp_dir.path());
    let mut config = fs::read_to_string(temp_dir.path().join("stevedore.yml")).unwrap();
    config.push_str("build:\n  command: [\"sh\", \"-c\", \"exit 9\"]\n");
    fs::write(temp_dir.path().join("stevedore.yml"), config).unwrap();

    stevedore_cmd()
        .current_dir(temp_dir.path())
        .args(["deploy", "dev", "--tag", "1.0.0"])
        .assert()
        .code(3);

    stevedore_cmd()
        .current_dir(temp_dir.path())
        .args(["deploy", "dev", "--tag", "1.0.0", "--skip-build"])
        .assert()
        .success();
}
