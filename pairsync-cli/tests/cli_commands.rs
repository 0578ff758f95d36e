use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

use pairsync_core::types::{AssetReference, CategoryState, ObjectKind, StateSnapshot};
use pairsync_sync::save_snapshot;

fn pairsync_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pairsync"));
    cmd.env("HOME", home).env("USERPROFILE", home);
    cmd
}

fn write_snapshot(dir: &Path, name: &str, categories: Vec<(ObjectKind, CategoryState)>) -> String {
    let path = dir.join(name);
    let snapshot = StateSnapshot::new(categories.into_iter().collect::<BTreeMap<_, _>>());
    save_snapshot(&path, &snapshot).expect("write snapshot");
    path.display().to_string()
}

fn player(appearance: &str, assets: &[(&str, &str)]) -> CategoryState {
    CategoryState {
        appearance: Some(appearance.to_owned()),
        assets: assets
            .iter()
            .map(|(hash, path)| AssetReference::hashed(*hash, &[path]))
            .collect(),
        ..CategoryState::default()
    }
}

// ---------------------------------------------------------------------------
// diff
// ---------------------------------------------------------------------------

#[test]
fn diff_json_reports_changes_and_redraws() {
    let home = TempDir::new().expect("home");
    let old = write_snapshot(
        home.path(),
        "old.json",
        vec![
            (ObjectKind::Player, player("look:1", &[("aaa", "chara/a.mdl")])),
            (ObjectKind::Pet, player("pet:1", &[])),
        ],
    );
    let new = write_snapshot(
        home.path(),
        "new.json",
        vec![
            (ObjectKind::Player, player("look:1", &[("bbb", "chara/a.mdl")])),
            (ObjectKind::Pet, player("pet:1", &[])),
        ],
    );

    let assert = pairsync_cmd(home.path())
        .args(["diff", &old, &new, "--json"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    let json: serde_json::Value = serde_json::from_str(&stdout).expect("diff JSON");

    assert_eq!(json["identical"], serde_json::Value::Bool(false));
    let categories = json["categories"].as_array().expect("categories");
    assert_eq!(categories.len(), 1, "pet is unchanged");
    assert_eq!(categories[0]["kind"], "player");
    assert_eq!(categories[0]["changes"], serde_json::json!(["mod_files"]));
    assert_eq!(categories[0]["needs_redraw"], serde_json::Value::Bool(true));
}

#[test]
fn diff_identical_snapshots() {
    let home = TempDir::new().expect("home");
    let old = write_snapshot(home.path(), "a.json", vec![(ObjectKind::Player, player("x", &[]))]);
    let new = write_snapshot(home.path(), "b.json", vec![(ObjectKind::Player, player("x", &[]))]);

    pairsync_cmd(home.path())
        .args(["diff", &old, &new])
        .assert()
        .success()
        .stdout(contains("identical"));

    pairsync_cmd(home.path())
        .args(["diff", &old, &new, "--forced"])
        .assert()
        .success()
        .stdout(contains("appearance_description"));
}

#[test]
fn diff_rejects_malformed_snapshot() {
    let home = TempDir::new().expect("home");
    let bad = home.path().join("bad.json");
    fs::write(&bad, "{ not json").expect("write");
    let good = write_snapshot(home.path(), "good.json", vec![]);

    pairsync_cmd(home.path())
        .args(["diff", bad.to_str().unwrap(), &good])
        .assert()
        .failure()
        .stderr(contains("cannot load snapshot"));
}

// ---------------------------------------------------------------------------
// store
// ---------------------------------------------------------------------------

#[test]
fn store_ingest_then_status() {
    let home = TempDir::new().expect("home");
    let file = home.path().join("body.mdl");
    fs::write(&file, b"model bytes").expect("write asset");

    pairsync_cmd(home.path())
        .args(["store", "ingest", file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("Ingested 1 file"));

    let store_root = home.path().join(".pairsync").join("store");
    assert!(store_root.join("manifest.json").is_file());

    let assert = pairsync_cmd(home.path())
        .args(["store", "status", "--json"])
        .assert()
        .success();
    let json: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("status JSON");
    assert_eq!(json["records"], 1);
    assert_eq!(json["missing"], serde_json::json!([]));
}

#[test]
fn store_status_lists_missing_files() {
    let home = TempDir::new().expect("home");
    let root = home.path().join("custom-store");
    fs::create_dir_all(&root).expect("store dir");
    fs::write(root.join("manifest.json"), r#"{"deadbeef":"deadbeef.tex"}"#).expect("manifest");

    pairsync_cmd(home.path())
        .args(["store", "status", "--root", root.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("deadbeef"))
        .stdout(contains("missing"));
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

#[test]
fn config_init_then_show() {
    let home = TempDir::new().expect("home");

    pairsync_cmd(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(contains("not found"))
        .stdout(contains("fetch_rounds: 10"));

    pairsync_cmd(home.path())
        .args(["config", "init"])
        .assert()
        .success();
    assert!(home.path().join(".pairsync").join("config.yaml").is_file());

    pairsync_cmd(home.path())
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(contains("--force"));

    pairsync_cmd(home.path())
        .args(["config", "init", "--force"])
        .assert()
        .success();
}

#[test]
fn invalid_config_is_reported() {
    let home = TempDir::new().expect("home");
    let dir = home.path().join(".pairsync");
    fs::create_dir_all(&dir).expect("config dir");
    fs::write(dir.join("config.yaml"), "apply:\n  fetch_rounds: 0\n").expect("config");

    pairsync_cmd(home.path())
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(contains("fetch_rounds"));
}
