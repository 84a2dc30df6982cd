//! End-to-end tests of the `clinic-backup` binary.
//!
//! Every test runs with `HOME` pointed at a temp directory and an explicit
//! `--store`, so nothing touches the real `~/.clinic-backup`.

use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Env {
    home: TempDir,
}

impl Env {
    fn new() -> Self {
        Self {
            home: TempDir::new().unwrap(),
        }
    }

    fn store(&self) -> PathBuf {
        self.home.path().join("clinic.db")
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("clinic-backup").unwrap();
        cmd.env("HOME", self.home.path())
            .env_remove("CB_STORE")
            .env_remove("CB_CLINIC")
            .env_remove("CB_LANG")
            .env_remove("CB_TEST_STORE")
            .env_remove("RUST_LOG")
            .arg("--store")
            .arg(self.store())
            .arg("--json");
        cmd
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self.cmd().args(args).assert().success().get_output().stdout.clone();
        serde_json::from_slice(&output).unwrap()
    }
}

fn only_backup_in(dir: &Path) -> PathBuf {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("clinic_backup_") && n.ends_with(".json"))
        })
        .collect();
    assert_eq!(files.len(), 1, "expected exactly one backup in {}", dir.display());
    files.remove(0)
}

#[test]
fn commands_fail_before_init() {
    let env = Env::new();
    env.cmd().arg("status").assert().failure().code(2);
}

#[test]
fn init_twice_needs_force() {
    let env = Env::new();
    env.json(&["init"]);
    env.cmd().arg("init").assert().failure().code(2);
    env.json(&["init", "--force"]);
}

#[test]
fn clinic_chosen_at_init_is_remembered() {
    let env = Env::new();
    let init = env.json(&["init", "--clinic", "c1", "--seed-billing"]);
    assert_eq!(init["seeded"], "clinics/c1/billingItems");
    assert!(init["settings"].as_str().unwrap().ends_with("config.json"));

    let status = env.json(&["status"]);
    let collections = status["status"]["collections"].as_array().unwrap();
    let billing = collections
        .iter()
        .find(|c| c["name"] == "clinics/c1/billingItems")
        .unwrap();
    assert_eq!(billing["count"], 7);
}

#[test]
fn export_import_inspect_status() {
    let env = Env::new();
    let out_dir = env.home.path().join("backups");

    let init = env.json(&["init", "--seed-billing"]);
    assert_eq!(init["seeded_items"], 7);

    let export = env.json(&["export", "--output", out_dir.to_str().unwrap()]);
    assert_eq!(export["success"], true);
    assert_eq!(export["stats"]["billing_items"], 7);
    let backup = only_backup_in(&out_dir);
    assert_eq!(export["path"], backup.display().to_string());

    let inspect = env.json(&["inspect", backup.to_str().unwrap()]);
    assert_eq!(inspect["summary"]["checksum"], export["checksum"]);
    assert_eq!(inspect["summary"]["restore_steps"], 6);
    assert_eq!(inspect["summary"]["has_kv"], true);

    let mut doc: Value = serde_json::from_str(&fs::read_to_string(&backup).unwrap()).unwrap();
    doc["patients"] = serde_json::json!([{"id": 1, "name": "A"}, {"id": 2, "name": "B"}]);
    doc["rtdb"] = serde_json::json!({"herbInventory": {"h1": 3}, "appointments": {"x": 1}});
    let edited = env.home.path().join("edited.json");
    fs::write(&edited, doc.to_string()).unwrap();

    let import = env.json(&["import", edited.to_str().unwrap(), "--yes"]);
    assert_eq!(import["success"], true);
    assert_eq!(import["report"]["steps"].as_array().unwrap().len(), 6);
    assert_eq!(import["report"]["kv_denylisted"][0], "appointments");

    let status = env.json(&["status"]);
    let collections = status["status"]["collections"].as_array().unwrap();
    assert_eq!(collections[0]["name"], "patients");
    assert_eq!(collections[0]["count"], 2);
    assert_eq!(status["status"]["kv_keys"][0], "herbInventory");
}

#[test]
fn import_without_confirmation_is_cancelled() {
    let env = Env::new();
    env.json(&["init"]);
    let backup = env.home.path().join("b.json");
    fs::write(&backup, r#"{"patients": [{"id": 1}]}"#).unwrap();

    env.cmd()
        .args(["import", backup.to_str().unwrap()])
        .write_stdin("n\n")
        .assert()
        .failure()
        .code(6);

    let status = env.json(&["status"]);
    assert_eq!(status["status"]["collections"][0]["count"], 0);
}

#[test]
fn dry_run_import_writes_nothing() {
    let env = Env::new();
    env.json(&["init"]);
    let backup = env.home.path().join("b.json");
    fs::write(&backup, r#"{"patients": [{"id": 1}, {"name": "no id"}]}"#).unwrap();

    let plan = env.json(&["import", backup.to_str().unwrap(), "--dry-run"]);
    assert_eq!(plan["dry_run"], true);
    assert_eq!(plan["plan"]["collections"][0]["to_create"], 1);
    assert_eq!(plan["plan"]["collections"][0]["skipped"], 1);

    let status = env.json(&["status"]);
    assert_eq!(status["status"]["collections"][0]["count"], 0);
}

#[test]
fn dry_run_export_does_not_seed_billing() {
    let env = Env::new();
    env.json(&["init"]);

    let preview = env.json(&["export", "--dry-run"]);
    assert_eq!(preview["dry_run"], true);
    assert_eq!(preview["stats"]["seeded_billing"], false);
    assert_eq!(preview["stats"]["billing_seed_pending"], true);
    assert_eq!(preview["stats"]["billing_items"], 7);

    let status = env.json(&["status"]);
    let collections = status["status"]["collections"].as_array().unwrap();
    let billing = collections.iter().find(|c| c["name"] == "billingItems").unwrap();
    assert_eq!(billing["count"], 0);
}

#[test]
fn invalid_backup_is_rejected() {
    let env = Env::new();
    env.json(&["init"]);
    let backup = env.home.path().join("bad.json");
    fs::write(&backup, "not json").unwrap();

    let output = env
        .cmd()
        .args(["import", backup.to_str().unwrap(), "--yes", "--quiet"])
        .assert()
        .failure()
        .code(4)
        .get_output()
        .stderr
        .clone();
    let error: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(error["error"]["code"], "INVALID_BACKUP");
}

#[test]
fn missing_backup_file() {
    let env = Env::new();
    env.json(&["init"]);
    env.cmd()
        .args(["inspect", "/nonexistent/clinic_backup.json"])
        .assert()
        .failure()
        .code(3);
}

#[test]
fn version_reports_package_version() {
    let env = Env::new();
    let version = env.json(&["version"]);
    assert_eq!(version["version"], env!("CARGO_PKG_VERSION"));
}
