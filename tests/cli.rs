mod common;

use std::fs;

use assert_cmd::Command;
use common::TestWorkspace;
use csv_unify::schema::{CanonicalSchema, ColumnType, MANIFEST_FILE_NAME};
use predicates::prelude::*;
use predicates::str::contains;

fn bin() -> Command {
    let mut cmd = Command::cargo_bin("csv-unify").expect("binary exists");
    cmd.env("RUST_LOG", "off");
    cmd
}

#[test]
fn unify_writes_normalized_files_and_manifest() {
    let ws = TestWorkspace::new();
    ws.write_in("raw", "a.csv", "a,b\n1,2\n");
    ws.write_in("raw", "b.csv", "a,c\n3,x\n");
    let raw = ws.dir("raw");
    let out = ws.path().join("out");

    bin()
        .args([
            "unify",
            "-i",
            raw.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
            "--max-workers",
            "2",
        ])
        .assert()
        .success()
        .stdout(contains("a.csv").and(contains("ok")).and(contains("filled 1 column(s)")));

    assert_eq!(fs::read_to_string(out.join("a.csv")).unwrap(), "a,b,c\n1,2.0,\n");
    let manifest = CanonicalSchema::load(&out.join(MANIFEST_FILE_NAME)).expect("manifest");
    assert_eq!(manifest.column_type("b"), Some(ColumnType::Decimal));
}

#[test]
fn unify_exits_non_zero_when_a_file_fails() {
    let ws = TestWorkspace::new();
    ws.write_in("raw", "good.csv", "a\n1\n");
    ws.write_in("raw", "dup.csv", "a,A\n1,2\n");
    let raw = ws.dir("raw");
    let out = ws.path().join("out");

    bin()
        .args(["unify", "-i", raw.to_str().unwrap(), "-o", out.to_str().unwrap()])
        .assert()
        .failure()
        .stdout(contains("FAILED").and(contains("good.csv")))
        .stderr(contains("1 of 2 file(s) failing"));
    assert!(out.join("good.csv").is_file());
}

#[test]
fn schema_prints_columns_and_saves_yaml() {
    let ws = TestWorkspace::new();
    ws.write_in(
        "raw",
        "2015-01.csv",
        "VendorID;lpep_pickup_datetime;Congestion_Surcharge\n2;2015-01-01 00:34:42;\n",
    );
    let raw = ws.dir("raw");
    let schema_path = ws.path().join("schema.yml");

    bin()
        .args([
            "schema",
            "-i",
            raw.to_str().unwrap(),
            "-o",
            schema_path.to_str().unwrap(),
            "--delimiter",
            ";",
        ])
        .assert()
        .success()
        .stdout(
            contains("lpep_pickup_datetime")
                .and(contains("timestamp"))
                .and(contains("override")),
        );

    let saved = CanonicalSchema::load(&schema_path).expect("saved schema");
    assert_eq!(
        saved.column_type("congestion_surcharge"),
        Some(ColumnType::Decimal)
    );
}

#[test]
fn scrub_rewrites_files_in_place() {
    let ws = TestWorkspace::new();
    let path = ws.write_in("raw", "a.csv", "a,b\r\n1,2\r\n\r\n");
    bin()
        .args(["scrub", "-i", ws.dir("raw").to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("blank line(s)"));
    assert_eq!(fs::read_to_string(path).unwrap(), "a,b\n1,2\n");
}

#[test]
fn empty_input_directory_fails_the_run() {
    let ws = TestWorkspace::new();
    let raw = ws.dir("raw");
    bin()
        .args(["schema", "-i", raw.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("No CSV files found"));
}

#[test]
fn config_file_overrides_are_applied() {
    let ws = TestWorkspace::new();
    ws.write_in("raw", "a.csv", "id|note\n1|x\n");
    let config = ws.write_in(
        "cfg",
        "pipeline.yml",
        "delimiter: pipe\ntype_overrides:\n  version: 2\n  columns:\n    ID: text\n",
    );
    let out = ws.path().join("out");
    bin()
        .args([
            "unify",
            "--config",
            config.to_str().unwrap(),
            "-i",
            ws.dir("raw").to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
        ])
        .assert()
        .success();

    let manifest = CanonicalSchema::load(&out.join(MANIFEST_FILE_NAME)).expect("manifest");
    assert_eq!(manifest.overrides.version, 2);
    assert_eq!(manifest.column_type("id"), Some(ColumnType::Text));
    assert_eq!(fs::read_to_string(out.join("a.csv")).unwrap(), "id,note\n1,x\n");
}

#[test]
fn load_reports_unreachable_database() {
    let ws = TestWorkspace::new();
    ws.write_in("out", "a.csv", "a\n1\n");
    bin()
        .env_remove("PGPASSWORD")
        .args([
            "load",
            "-i",
            ws.dir("out").to_str().unwrap(),
            "--host",
            "127.0.0.1",
            "--port",
            "1",
        ])
        .assert()
        .failure()
        .stderr(contains("Connecting to postgres://postgres@127.0.0.1:1/nyc_green_taxi"));
}
