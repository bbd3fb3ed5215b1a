#![cfg(all(unix, feature = "cli"))]

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use bytehub::subsys::FramedSubsystem;
use serde_json::Value;

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "bytehub-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let start = Instant::now();
    while !path.exists() {
        if start.elapsed() >= timeout {
            panic!("socket never appeared at {}", path.display());
        }
        thread::sleep(Duration::from_millis(25));
    }
}

#[test]
fn listen_serves_requested_connections_then_exits() {
    let dir = unique_temp_dir("listen");
    let sock_path = dir.join("hub.sock");

    let child = Command::new(env!("CARGO_BIN_EXE_bytehub"))
        .env_remove("BYTEHUB_CONFIG")
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("json")
        .arg("listen")
        .arg(&sock_path)
        .arg("--connections")
        .arg("1")
        .arg("--idle-tick")
        .arg("20ms")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("listen should start");

    wait_for_socket(&sock_path, Duration::from_secs(3));

    let mut stream = UnixStream::connect(&sock_path).expect("connect should succeed");
    let frame = FramedSubsystem::encode(9, b"via-socket").unwrap();
    // Header and payload arrive in separate writes.
    stream.write_all(&frame[..2]).unwrap();
    thread::sleep(Duration::from_millis(50));
    stream.write_all(&frame[2..]).unwrap();
    stream.write_all(b"$SOCK*00\n").unwrap();
    drop(stream);

    let output = child.wait_with_output().expect("listen should exit");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let lines: Vec<Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let frames: Vec<&str> = lines
        .iter()
        .filter(|v| v["kind"] == "frame")
        .map(|v| v["subsystem"].as_str().unwrap())
        .collect();
    assert_eq!(frames, vec!["framed", "line"]);

    let report = lines.last().unwrap();
    assert_eq!(report["kind"], "session");
    assert_eq!(report["stats"]["delivered_bytes"], 23);
    assert!(report["transport"]
        .as_str()
        .unwrap()
        .starts_with("unix-socket:"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn listen_rejects_bad_idle_tick() {
    let dir = unique_temp_dir("listen-usage");
    let output = Command::new(env!("CARGO_BIN_EXE_bytehub"))
        .arg("listen")
        .arg(dir.join("hub.sock"))
        .arg("--idle-tick")
        .arg("0ms")
        .output()
        .expect("listen should run");
    assert_eq!(output.status.code(), Some(64));
    let _ = std::fs::remove_dir_all(&dir);
}
