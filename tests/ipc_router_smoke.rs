use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_attendanced");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn attendanced");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
}

#[test]
fn health_reports_version_and_default_threshold() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(resp["ok"], true);
    assert_eq!(resp["result"]["thresholdPercent"], 75);
    assert!(resp["result"]["workspacePath"].is_null());
    drop(stdin);
    let _ = child.wait();
}

#[test]
fn threshold_bounds_are_enforced() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "config.setThreshold",
        json!({ "percent": 110 }),
    );
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "bad_params");

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "config.setThreshold",
        json!({ "percent": 80 }),
    );
    assert_eq!(resp["ok"], true);

    let resp = request(&mut stdin, &mut reader, "3", "health", json!({}));
    assert_eq!(resp["result"]["thresholdPercent"], 80);
    drop(stdin);
    let _ = child.wait();
}

#[test]
fn reconcile_requires_a_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "reconcile.run",
        json!({ "rosterPath": "r.csv", "logPath": "l.csv", "schedules": [] }),
    );
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "no_workspace");
    drop(stdin);
    let _ = child.wait();
}

#[test]
fn unknown_method_is_reported() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request(&mut stdin, &mut reader, "1", "attendance.magic", json!({}));
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "not_implemented");
    drop(stdin);
    let _ = child.wait();
}

#[test]
fn missing_roster_file_fails_before_output_is_written() {
    let workspace = temp_dir("attendanced-smoke-ws");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(resp["ok"], true);
    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "reconcile.run",
        json!({
            "rosterPath": workspace.join("nope.csv").to_string_lossy(),
            "logPath": workspace.join("nope.csv").to_string_lossy(),
            "schedules": [],
        }),
    );
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "roster_load_failed");
    assert!(!workspace.join("attendance_reports").exists());
    drop(stdin);
    let _ = child.wait();
}
