mod common;

use std::io::Write;
use std::process::Command;

use common::RafflerProcess;
use serde_json::{Value, json};

fn raffler(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_raffler"))
        .arg("--quiet")
        .args(args)
        .env_remove("RAFFLER_CONFIG")
        .env_remove("RAFFLER_DATA_DIR")
        .output()
        .expect("failed to run raffler")
}

#[tokio::test(flavor = "multi_thread")]
async fn stdin_session_drives_a_giveaway() {
    let mut proc = RafflerProcess::spawn(&["--store", "memory"]);

    let created = proc
        .request(&json!({
            "op": "create",
            "prize": "sticker pack",
            "winners": 1,
            "duration": "1h",
            "organizer": "org",
        }))
        .await;
    assert_eq!(created["ok"], true, "{created}");
    let id = created["id"].as_str().unwrap().to_string();

    let joined = proc
        .request(&json!({ "op": "join", "id": id, "actor": "amy" }))
        .await;
    assert_eq!(joined["membership"], "joined");

    let status = proc.request(&json!({ "op": "status", "id": id })).await;
    assert_eq!(status["entity"]["prize"], "sticker pack");
    assert_eq!(status["entity"]["participants"], json!(["amy"]));

    let cancelled = proc
        .request(&json!({ "op": "cancel", "id": id, "actor": "org" }))
        .await;
    assert_eq!(cancelled["cancelled"], true);

    let gone = proc
        .request(&json!({ "op": "join", "id": id, "actor": "bob" }))
        .await;
    assert_eq!(gone["error"], "not_found");

    let status = proc.shutdown().await;
    assert!(status.success(), "exit status {status:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn file_store_rows_are_listed_after_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().to_str().unwrap();

    let mut proc = RafflerProcess::spawn(&["--store", "file", "--data-dir", data_dir]);
    let created = proc
        .request(&json!({
            "op": "create",
            "prize": "keyboard",
            "winners": 2,
            "phases": 2,
            "duration": "2h",
            "organizer": "org",
            "participants": ["a", "b", "c"],
        }))
        .await;
    assert_eq!(created["ok"], true, "{created}");
    assert!(proc.shutdown().await.success());

    let out = raffler(&["list", "--data-dir", data_dir, "--format", "json"]);
    assert!(out.status.success());
    let listing: Value = serde_json::from_slice(&out.stdout).unwrap();
    let entities = listing["entities"].as_array().unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0]["id"], created["id"]);
    assert_eq!(entities[0]["total_phases"], 2);
    assert_eq!(listing["corrupt"], json!([]));
}

#[test]
fn draw_is_reproducible_with_a_seed() {
    let args = [
        "draw", "-e", "amy", "-e", "bob=5", "-e", "cy", "--winners", "2", "--seed", "42",
        "--format", "json",
    ];
    let first = raffler(&args);
    let second = raffler(&args);
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);

    let winners: Vec<String> = serde_json::from_slice(&first.stdout).unwrap();
    assert_eq!(winners.len(), 2);
}

#[test]
fn validate_reports_bad_config_with_exit_code() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "scheduler:\n  max_ticket_weight: 0").unwrap();

    let out = raffler(&["validate", file.path().to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("FAILED"), "{stdout}");
}

#[test]
fn version_prints_package_name() {
    let out = raffler(&["version", "--format", "json"]);
    assert!(out.status.success());
    let info: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(info["name"], "raffler");
}
