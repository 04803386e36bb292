//! Binary-level tests for the `arma` CLI.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

fn write_form(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

const VALID_FORM: &str = r#"
name: login
title: Sign in
fields:
  - name: username
    kind: text
    required: true
  - name: remember
    kind: checkbox
"#;

const INVALID_FORM: &str = r#"
name: broken
fields:
  - name: choices
    kind: select
"#;

#[test]
fn validate_accepts_a_valid_form() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_form(&dir, "login.yaml", VALID_FORM);

    Command::cargo_bin("arma")
        .unwrap()
        .args(["validate"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("OK").and(predicate::str::contains("login")));
}

#[test]
fn validate_rejects_an_invalid_form() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_form(&dir, "broken.yaml", INVALID_FORM);

    Command::cargo_bin("arma")
        .unwrap()
        .args(["validate"])
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("INVALID"));
}

#[test]
fn build_emits_a_json_report() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_form(&dir, "login.yaml", VALID_FORM);

    Command::cargo_bin("arma")
        .unwrap()
        .args(["--format", "json", "build"])
        .arg(&path)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("\"ready_order\"")
                .and(predicate::str::contains("\"username\"")),
        );
}

#[test]
fn kinds_lists_the_default_widget_set() {
    Command::cargo_bin("arma")
        .unwrap()
        .arg("kinds")
        .assert()
        .success()
        .stdout(predicate::str::contains("select").and(predicate::str::contains("group")));
}
