#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn alert_worker(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("alert-worker").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("QDB_ADDR")
        .env_remove("ALERT_CONFIG")
        .env("RUST_LOG", "warn");
    cmd
}

fn write(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    path
}

const NOTIFICATION: &str = r#"{
    "entity_id": "alert-1",
    "entity_type": "AlertController",
    "field": "SendTrigger",
    "current": {"type": "int", "raw": 1},
    "context": [
        {"field": "ApplicationName", "value": {"type": "string", "raw": "billing"}},
        {"field": "Description", "value": {"type": "string", "raw": "ledger out of balance"}},
        {"field": "TTSAlert", "value": {"type": "bool", "raw": true}},
        {"field": "EmailAlert", "value": {"type": "bool", "raw": false}}
    ]
}"#;

// ---------------------------------------------------------------------------
// alert-worker config
// ---------------------------------------------------------------------------

#[test]
fn config_shows_default_store_address() {
    let dir = TempDir::new().unwrap();
    alert_worker(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("store_address: redis:6379"))
        .stdout(predicate::str::contains("AlertController"));
}

#[test]
fn config_env_overrides_default() {
    let dir = TempDir::new().unwrap();
    alert_worker(&dir)
        .env("QDB_ADDR", "qdb.internal:6380")
        .args(["config", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"store_address\": \"qdb.internal:6380\""));
}

#[test]
fn config_flag_overrides_file() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "alert.yaml", "store_address: from-file:1\n");
    alert_worker(&dir)
        .args(["config", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("from-file:1"));

    alert_worker(&dir)
        .args(["config", "--store-addr", "from-flag:2", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("from-flag:2"));
}

#[test]
fn config_rejects_unknown_keys() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "alert.yaml", "store_adress: typo:1\n");
    alert_worker(&dir)
        .args(["config", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}

// ---------------------------------------------------------------------------
// alert-worker decode
// ---------------------------------------------------------------------------

#[test]
fn decode_prints_record() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "n.json", NOTIFICATION);
    alert_worker(&dir)
        .arg("decode")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("application: billing"))
        .stdout(predicate::str::contains("description: ledger out of balance"));
}

#[test]
fn decode_json_output() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "n.json", NOTIFICATION);
    let out = alert_worker(&dir)
        .args(["decode", "--json"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(out.status.success());
    let record: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(record["application_name"], "billing");
    assert_eq!(record["tts_alert"], true);
    assert_eq!(record["email_alert"], false);
}

#[test]
fn decode_type_mismatch_fails() {
    let dir = TempDir::new().unwrap();
    let bad = NOTIFICATION.replace(
        r#"{"type": "bool", "raw": true}"#,
        r#"{"type": "string", "raw": "true"}"#,
    );
    let path = write(&dir, "bad.json", &bad);
    alert_worker(&dir)
        .arg("decode")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("position 2"));
}

// ---------------------------------------------------------------------------
// alert-worker replay
// ---------------------------------------------------------------------------

#[test]
fn replay_reports_leader_only_writes() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "scenario.yaml",
        r#"
actuators:
  tts: [hall]
  email: [relay]
steps:
  - step: alert
    application_name: api
    description: ignored while follower
    tts: true
    email: true
  - step: became_leader
  - step: alert
    application_name: api
    description: p99 latency over budget
    tts: true
    email: true
  - step: lost_leadership
"#,
    );
    let out = alert_worker(&dir)
        .args(["replay", "--json"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(out.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(summary["store_address"], "redis:6379");
    assert_eq!(summary["total_writes"], 4);
    assert_eq!(summary["steps"][0]["writes"].as_array().unwrap().len(), 0);
    assert_eq!(summary["steps"][2]["writes"].as_array().unwrap().len(), 4);
    assert!(summary["steps"][0]["reports"].as_array().unwrap().is_empty());
    let report = &summary["steps"][2]["reports"][0];
    assert_eq!(report["tts"]["delivered"], 1);
    assert_eq!(report["email"]["attempted"], 1);
    assert_eq!(report["email"]["failed"], 0);
    assert_eq!(summary["steps"][3]["role"], "follower");
    assert_eq!(summary["steps"][3]["subscriptions"], 0);
}

#[test]
fn replay_text_output() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "scenario.yaml",
        "actuators:\n  tts: [hall]\nsteps:\n  - step: became_leader\n  - step: alert\n    application_name: api\n    description: down\n    tts: true\n",
    );
    alert_worker(&dir)
        .arg("replay")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("role=leader subscriptions=1"))
        .stdout(predicate::str::contains("tts 1/1 delivered, email 0/0 delivered"))
        .stdout(predicate::str::contains("hall TextToSpeech = \"down\""))
        .stdout(predicate::str::contains("total writes: 1"));
}

#[test]
fn replay_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    alert_worker(&dir)
        .args(["replay", "nope.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}
