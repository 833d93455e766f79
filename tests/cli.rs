#![forbid(unsafe_code)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const PEOPLE: &str = "id,name,grade,wte\na,Alice,Registrar,1.0\nb,Bob,Registrar,1.0\n";

fn write_config(dir: &Path, end_date: &str) -> String {
    let path = dir.join("rota.json");
    fs::write(
        &path,
        format!(
            r#"{{ "id": "cli", "name": "CLI", "start_date": "2025-01-06", "end_date": "{end_date}",
                 "coverage": [{{ "kind": "N_REG", "count": 1 }}],
                 "solver": {{ "time_budget_secs": 30, "node_limit": 2000 }} }}"#
        ),
    )
    .unwrap();
    path.display().to_string()
}

fn write_people(dir: &Path) -> String {
    let path = dir.join("people.csv");
    fs::write(&path, PEOPLE).unwrap();
    path.display().to_string()
}

fn cli() -> Command {
    Command::cargo_bin("garde-cli").unwrap()
}

#[test]
fn import_people_writes_json() {
    let dir = tempdir().unwrap();
    let csv = write_people(dir.path());
    let out = dir.path().join("people.json");
    cli()
        .args(["import-people", "--csv", &csv, "--out"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 person(s)"));
    let json = fs::read_to_string(&out).unwrap();
    assert!(json.contains("\"Alice\""));
}

#[test]
fn solve_complete_roster_exits_zero() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), "2025-01-12");
    let people = write_people(dir.path());
    let grid = dir.path().join("grid.csv");
    let snapshot = dir.path().join("snapshot.json");
    cli()
        .args(["solve", "--config", &config, "--people", &people, "--out-grid"])
        .arg(&grid)
        .arg("--snapshot")
        .arg(&snapshot)
        .assert()
        .code(0)
        .stdout(predicate::str::contains("nights | 7 assignment(s) | 0 gap(s)"));

    let grid = fs::read_to_string(&grid).unwrap();
    assert!(grid.starts_with("date,Alice,Bob,locum"));
    assert_eq!(grid.lines().count(), 8);

    cli()
        .args(["check", "--snapshot"])
        .arg(&snapshot)
        .assert()
        .code(0)
        .stdout(predicate::str::contains("OK"));
}

#[test]
fn solve_with_capacity_gaps_exits_two() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), "2025-01-15");
    let people = write_people(dir.path());
    let report = dir.path().join("report.csv");
    let json = dir.path().join("roster.json");
    cli()
        .args(["solve", "--config", &config, "--people", &people, "--report"])
        .arg(&report)
        .arg("--out-json")
        .arg(&json)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("LOCUM"));
    assert!(fs::read_to_string(&report)
        .unwrap()
        .starts_with("id,name,grade,wte"));
    assert!(fs::read_to_string(&json).unwrap().contains("\"gaps\""));
}

#[test]
fn unknown_config_fails() {
    let dir = tempdir().unwrap();
    let people = write_people(dir.path());
    cli()
        .args(["solve", "--config", "missing.json", "--people", &people])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.json"));
}
