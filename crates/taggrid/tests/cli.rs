mod common;

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use common::{config_json, grid_frame};
use taggrid::{load_gray, save_gray, Roi, ScannerConfig};

fn taggrid() -> Command {
    let mut cmd = Command::cargo_bin("taggrid").expect("binary");
    cmd.arg("--log-level").arg("warn");
    cmd
}

/// A frame on disk plus a config pointing at it.
fn workspace() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let frame = dir.path().join("frame.png");
    save_gray(&grid_frame(), &frame).expect("write frame");
    let config = dir.path().join("scanner.json");
    write_config(&config, config_json(&frame));
    (dir, config)
}

fn write_config(path: &Path, value: serde_json::Value) {
    fs::write(path, serde_json::to_string_pretty(&value).expect("json")).expect("write config");
}

#[test]
fn decode_prints_the_grid() {
    let (dir, config) = workspace();
    taggrid()
        .arg("decode")
        .arg("--config")
        .arg(&config)
        .arg("--image")
        .arg(dir.path().join("frame.png"))
        .assert()
        .success()
        .stdout("[[0,1],[1,-1]]\n");
}

#[test]
fn decode_fills_the_template_and_writes_visualization() {
    let (dir, config) = workspace();
    let mut value = config_json(&dir.path().join("frame.png"));
    value["notify"] = serde_json::json!({
        "template": { "site": "lab", "grid": null },
        "assignTo": "/grid"
    });
    write_config(&config, value);
    let viz = dir.path().join("viz");

    taggrid()
        .arg("decode")
        .arg("--config")
        .arg(&config)
        .arg("--image")
        .arg(dir.path().join("frame.png"))
        .arg("--template")
        .arg("--viz-dir")
        .arg(&viz)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""grid":[[0,1],[1,-1]]"#))
        .stdout(predicate::str::contains(r#""site":"lab""#));

    let tiles = load_gray(viz.join("tiles.png")).expect("tiles");
    assert_eq!((tiles.width, tiles.height), (80, 80));
    let rectified = load_gray(viz.join("rectified.png")).expect("rectified");
    assert_eq!((rectified.width, rectified.height), (68, 68));
}

#[test]
fn invalid_config_is_rejected_before_scanning() {
    let (dir, config) = workspace();
    let mut value = config_json(&dir.path().join("frame.png"));
    value["camera"]["smooth"] = serde_json::json!(1.5);
    write_config(&config, value);

    taggrid()
        .arg("scan")
        .arg("--config")
        .arg(&config)
        .arg("--no-input")
        .assert()
        .failure()
        .stderr(predicate::str::contains("InvalidSmoothing(1.5)"));
}

#[test]
fn set_roi_stores_relative_corners() {
    let (_dir, config) = workspace();
    taggrid()
        .arg("set-roi")
        .arg("--config")
        .arg(&config)
        .args(["0.1", "0.2", "0.9", "0.2", "0.9", "0.8", "0.1", "0.8"])
        .assert()
        .success();

    let stored = ScannerConfig::load_validated(&config).expect("config");
    assert_eq!(
        stored.dimensions.roi,
        Roi::new([[0.1, 0.2], [0.9, 0.2], [0.9, 0.8], [0.1, 0.8]])
    );
}

#[test]
fn set_roi_converts_and_clamps_pixel_corners() {
    let (_dir, config) = workspace();
    taggrid()
        .arg("set-roi")
        .arg("--config")
        .arg(&config)
        .args(["--frame", "200", "100"])
        .args(["-20", "0", "100", "0", "100", "50", "0", "150"])
        .assert()
        .success();

    let stored = ScannerConfig::load_validated(&config).expect("config");
    assert_eq!(
        stored.dimensions.roi,
        Roi::new([[0.0, 0.0], [0.5, 0.0], [0.5, 0.5], [0.0, 1.0]])
    );
}

#[test]
fn snapshot_saves_the_source_frame() {
    let (dir, config) = workspace();
    let output = dir.path().join("snap.png");
    taggrid()
        .arg("snapshot")
        .arg("--config")
        .arg(&config)
        .arg("--output")
        .arg(&output)
        .assert()
        .success();

    let snap = load_gray(&output).expect("snapshot");
    assert_eq!(snap, grid_frame());
}

#[test]
fn scan_reports_the_grid_on_stdout() {
    let (_dir, config) = workspace();
    taggrid()
        .arg("scan")
        .arg("--config")
        .arg(&config)
        .arg("--duration")
        .arg("1.0")
        .arg("--no-input")
        .assert()
        .success()
        .stdout(predicate::str::contains("[[0,1],[1,-1]]"));
}

#[test]
fn scan_quits_on_q() {
    let (_dir, config) = workspace();
    taggrid()
        .arg("scan")
        .arg("--config")
        .arg(&config)
        .arg("--duration")
        .arg("30")
        .write_stdin("\nq\n")
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .success();
}
