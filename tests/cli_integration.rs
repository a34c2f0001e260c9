//! Integration tests for the command-line interface.

#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const REPORT: &str = r#"{
  "run": {
    "threshold": 0.25,
    "image_count": 3,
    "timestamp": "2026-01-05T10:00:00Z",
    "model": "road",
    "version": "0.3.0"
  },
  "detections": [
    {"image_id": "1", "image": "1_a.jpg", "bbox": {"x_min": 0, "y_min": 0, "x_max": 5, "y_max": 5},
     "class_id": 1, "label": "pothole", "confidence": 0.8},
    {"image_id": "2", "image": "2_a.jpg", "bbox": {"x_min": 0, "y_min": 0, "x_max": 5, "y_max": 5},
     "class_id": 2, "label": "crack", "confidence": 0.3}
  ],
  "errors": []
}"#;

/// Command isolated from the user's config and environment.
fn roadwatch(temp: &Path) -> Command {
    let mut cmd = Command::new(cargo_bin("roadwatch"));
    cmd.env_remove("MAPILLARY_API_KEY")
        .env_remove("ROADWATCH_CONFIDENCE")
        .env_remove("ROADWATCH_RADIUS")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(temp.join("config.toml"))
        .arg("--data-dir")
        .arg(temp.join("data"))
        .arg("--quiet");
    cmd
}

#[test]
fn test_summary_applies_threshold() {
    let temp = TempDir::new().unwrap();
    let report = temp.path().join("report.json");
    std::fs::write(&report, REPORT).unwrap();

    roadwatch(temp.path())
        .args(["summary", "-c", "0.5", "--report"])
        .arg(&report)
        .assert()
        .success()
        .stdout(predicate::str::contains("pothole"))
        .stdout(predicate::str::contains("crack").not());
}

#[test]
fn test_summary_json() {
    let temp = TempDir::new().unwrap();
    let report = temp.path().join("report.json");
    std::fs::write(&report, REPORT).unwrap();

    let output = roadwatch(temp.path())
        .args(["summary", "--json", "-c", "0.3", "--report"])
        .arg(&report)
        .output()
        .unwrap();
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["image_count"], 3);
    assert_eq!(summary["detection_count"], 2);
}

#[test]
fn test_summary_missing_report_fails() {
    let temp = TempDir::new().unwrap();

    roadwatch(temp.path())
        .arg("summary")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn test_fetch_rejects_wide_radius() {
    let temp = TempDir::new().unwrap();

    roadwatch(temp.path())
        .args(["fetch", "--lat", "48.85", "--lon", "2.35", "--radius", "10"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("radius must be between"));
}

#[test]
fn test_fetch_without_key_fails() {
    let temp = TempDir::new().unwrap();

    roadwatch(temp.path())
        .args(["fetch", "--lat", "48.85", "--lon", "2.35", "--radius", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("API key"));
    assert!(!temp.path().join("data").join("images").exists());
}

#[test]
fn test_map_with_no_detections() {
    let temp = TempDir::new().unwrap();
    let output = temp.path().join("map.html");

    roadwatch(temp.path())
        .args(["map", "--mode", "fetch", "--output"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 markers"));

    let html = std::fs::read_to_string(&output).unwrap();
    assert!(html.contains("leaflet"));
}

#[test]
fn test_map_preloaded_requires_marker_file() {
    let temp = TempDir::new().unwrap();

    roadwatch(temp.path())
        .arg("map")
        .assert()
        .failure();
}

#[test]
fn test_report_stats_on_empty_dir() {
    let temp = TempDir::new().unwrap();

    roadwatch(temp.path())
        .args(["report", "--stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total reports: 0"));
}

#[test]
fn test_config_path() {
    let temp = TempDir::new().unwrap();

    roadwatch(temp.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_init_writes_defaults() {
    let temp = TempDir::new().unwrap();

    roadwatch(temp.path())
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created configuration file"));

    let text = std::fs::read_to_string(temp.path().join("config.toml")).unwrap();
    assert!(text.contains("confidence_threshold"));
}

#[test]
fn test_unlock_removes_left_over_lock() {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("data");
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(
        data.join(".roadwatch.lock"),
        r#"{"pid": 999999, "operation": "fetch", "started": "2026-01-05T10:00:00Z"}"#,
    )
    .unwrap();

    roadwatch(temp.path())
        .arg("unlock")
        .assert()
        .success()
        .stdout(predicate::str::contains("pid 999999"));
    assert!(!data.join(".roadwatch.lock").exists());
}

#[test]
fn test_unlock_without_lock() {
    let temp = TempDir::new().unwrap();

    roadwatch(temp.path())
        .arg("unlock")
        .assert()
        .success()
        .stdout(predicate::str::contains("No operation lock"));
}
