//! Tests that drive the `synheart-activity` binary as a child process.

#![cfg(unix)]

use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use synheart_activity_pipeline::config::Config;
use synheart_activity_pipeline::store::LogStore;
use tempfile::TempDir;

fn spawn_capture(dir: &TempDir) -> Child {
    let config = Config {
        data_path: dir.path().join("data"),
        ..Config::default()
    };
    let config_path = dir.path().join("config.json");
    config.save_to(&config_path).unwrap();

    Command::new(env!("CARGO_BIN_EXE_synheart-activity"))
        .arg("--config")
        .arg(&config_path)
        .arg("capture")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap()
}

fn wait_with_deadline(child: &mut Child, limit: Duration) -> ExitStatus {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return status;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("capture did not exit after the signal");
        }
        thread::sleep(Duration::from_millis(50));
    }
}

fn stop_capture_with(signal: &str) {
    let dir = TempDir::new().unwrap();
    let mut child = spawn_capture(&dir);
    thread::sleep(Duration::from_millis(1500));

    let sent = Command::new("kill")
        .arg(format!("-{signal}"))
        .arg(child.id().to_string())
        .status()
        .unwrap();
    assert!(sent.success());

    let status = wait_with_deadline(&mut child, Duration::from_secs(10));
    assert!(status.success(), "{signal} exit status: {status:?}");

    let output = child.wait_with_output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Capture stopped"));
    assert!(stdout.contains("Session Statistics"));

    // The in-progress click interval was flushed and sealed on the way out
    let store = LogStore::open(dir.path().join("data").join("logs")).unwrap();
    assert_eq!(store.list("pending/mouse-*.jsonl").unwrap().len(), 1);
    assert!(store.list("active/*").unwrap().is_empty());
}

#[test]
fn test_sigint_flushes_capture() {
    stop_capture_with("INT");
}

#[test]
fn test_sigterm_flushes_capture() {
    stop_capture_with("TERM");
}
