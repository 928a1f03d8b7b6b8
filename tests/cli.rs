use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn nextstep(dir: &TempDir, backend: &str) -> Command {
    let config = dir.path().join("config.toml");
    if !config.exists() {
        std::fs::write(&config, "").unwrap();
    }
    let mut cmd = Command::cargo_bin("nextstep").unwrap();
    cmd.env("NEXTSTEP_DATA_DIR", dir.path().join("data"))
        .env_remove("NEXTSTEP_BACKEND")
        .env_remove("NEXTSTEP_USER")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(&config)
        .arg("--backend")
        .arg(backend);
    cmd
}

fn add(dir: &TempDir, backend: &str, company: &str, position: &str) {
    nextstep(dir, backend)
        .args(["add", company, position, "--date", "2025-01-10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added application"));
}

#[test]
fn help_lists_commands() {
    Command::cargo_bin("nextstep")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("step"))
        .stdout(predicate::str::contains("export"));
}

#[test]
fn sqlite_requires_init() {
    let dir = tempfile::tempdir().unwrap();
    nextstep(&dir, "sqlite")
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("nextstep init"));

    nextstep(&dir, "sqlite")
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Database initialized"));
    nextstep(&dir, "sqlite")
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No applications found."));
}

#[test]
fn add_list_and_stats_on_local_backend() {
    let dir = tempfile::tempdir().unwrap();
    nextstep(&dir, "local").arg("init").assert().success();
    add(&dir, "local", "Acme", "Engineer");

    nextstep(&dir, "local")
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Acme"))
        .stdout(predicate::str::contains("Applied"));

    nextstep(&dir, "local")
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("Total applications: 1"));
}

#[test]
fn near_duplicate_needs_force() {
    let dir = tempfile::tempdir().unwrap();
    add(&dir, "local", "Acme", "Engineer");

    nextstep(&dir, "local")
        .args(["add", "acme", "Engineer"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Possible duplicate"));

    nextstep(&dir, "local")
        .args(["add", "acme", "Engineer", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added application"));
}

#[test]
fn step_add_defaults_to_suggested_status() {
    let dir = tempfile::tempdir().unwrap();
    nextstep(&dir, "sqlite").arg("init").assert().success();
    add(&dir, "sqlite", "Acme", "Engineer");

    let export = dir.path().join("export.json");
    nextstep(&dir, "sqlite")
        .arg("export")
        .arg("--output")
        .arg(&export)
        .assert()
        .success();
    let id = first_id(&export);

    nextstep(&dir, "sqlite")
        .args(["step", "add", &id[..8], "--date", "2025-01-15"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Recorded Screening"));

    nextstep(&dir, "sqlite")
        .args(["show", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Status: Screening"))
        .stdout(predicate::str::contains("Steps (2)"));
}

#[test]
fn export_then_import_into_other_backend() {
    let dir = tempfile::tempdir().unwrap();
    add(&dir, "local", "Acme", "Engineer");
    add(&dir, "local", "Globex", "Analyst");

    let export = dir.path().join("export.json");
    nextstep(&dir, "local")
        .arg("export")
        .arg("--output")
        .arg(&export)
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported 2"));

    nextstep(&dir, "sqlite").arg("init").assert().success();
    nextstep(&dir, "sqlite")
        .arg("import")
        .arg(&export)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 2"));
    nextstep(&dir, "sqlite")
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Globex"));
}

#[test]
fn import_rejects_malformed_file() {
    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("bad.json");
    std::fs::write(&bad, r#"[{"company": "Acme"}]"#).unwrap();

    nextstep(&dir, "local")
        .arg("import")
        .arg(&bad)
        .assert()
        .failure()
        .stderr(predicate::str::contains("record 0"));
}

#[test]
fn clear_requires_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    add(&dir, "local", "Acme", "Engineer");

    nextstep(&dir, "local")
        .arg("clear")
        .assert()
        .success()
        .stdout(predicate::str::contains("--yes"));
    nextstep(&dir, "local")
        .args(["clear", "--yes"])
        .assert()
        .success();
    nextstep(&dir, "local")
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No applications found."));
}

fn first_id(export: &Path) -> String {
    let raw = std::fs::read_to_string(export).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    value[0]["id"].as_str().unwrap().to_string()
}
