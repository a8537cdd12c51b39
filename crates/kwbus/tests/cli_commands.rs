#![cfg(feature = "cli")]

use std::process::Command;

fn kwbus() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_kwbus"));
    cmd.arg("--log-level").arg("error");
    cmd
}

#[test]
fn version_prints_package_version() {
    let output = kwbus().arg("version").output().expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("kwbus {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn file_publish_then_subscribe_round_trip() {
    let dir = tempfile::tempdir().expect("temp dir should be creatable");
    let address = dir.path().join("bus");

    let publish = kwbus()
        .arg("publish")
        .arg("file")
        .arg(&address)
        .args(["--keyword", "STATE", "--data", "x=1;y=2", "--count", "1"])
        .output()
        .expect("publish should run");
    assert!(
        publish.status.success(),
        "publish failed: {}",
        String::from_utf8_lossy(&publish.stderr)
    );

    let subscribe = kwbus()
        .args(["--format", "json", "subscribe", "file"])
        .arg(&address)
        .args(["--keyword", "STATE", "--count", "1", "--timeout", "5s"])
        .output()
        .expect("subscribe should run");
    assert!(
        subscribe.status.success(),
        "subscribe failed: {}",
        String::from_utf8_lossy(&subscribe.stderr)
    );

    let stdout = String::from_utf8_lossy(&subscribe.stdout);
    let line = stdout.lines().next().expect("one update line");
    let value: serde_json::Value = serde_json::from_str(line).expect("json output");
    assert_eq!(value["keyword"], "STATE");
    assert_eq!(value["payload"], "x=1;y=2");
    assert_eq!(value["well_known"], true);
}

#[test]
fn subscribe_to_missing_file_fails() {
    let dir = tempfile::tempdir().expect("temp dir should be creatable");

    let output = kwbus()
        .args(["subscribe", "file"])
        .arg(dir.path().join("nobody"))
        .args(["--keyword", "PLAN", "--count", "1"])
        .output()
        .expect("subscribe should run");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("does not exist"));
}

#[cfg(unix)]
#[test]
fn subscribe_times_out_without_updates() {
    let dir = tempfile::tempdir().expect("temp dir should be creatable");
    let address = dir.path().join("bus");
    // A plain file with no sentinel-framed block never produces a payload.
    std::fs::write(dir.path().join("bus.PLAN"), "").expect("data file should be writable");

    let output = kwbus()
        .args(["subscribe", "pipe"])
        .arg(&address)
        .args(["--keyword", "PLAN", "--timeout", "300ms", "--poll", "50ms"])
        .output()
        .expect("subscribe should run");

    assert_eq!(output.status.code(), Some(124));
}

#[test]
fn config_driven_round_trip() {
    let dir = tempfile::tempdir().expect("temp dir should be creatable");
    let config = dir.path().join("hub.json");
    let hub = serde_json::json!({
        "endpoints": [
            { "kind": "file", "address": dir.path().join("a").display().to_string() },
            { "kind": "file", "address": dir.path().join("b").display().to_string() },
        ]
    });
    std::fs::write(&config, hub.to_string()).expect("config should be writable");

    let publish = kwbus()
        .args(["publish", "--config"])
        .arg(&config)
        .args(["--keyword", "PARAMETERS", "--data", "gain=0.5", "--count", "1"])
        .output()
        .expect("publish should run");
    assert!(publish.status.success());

    let subscribe = kwbus()
        .args(["--format", "raw", "subscribe", "--config"])
        .arg(&config)
        .args(["--keyword", "PARAMETERS", "--count", "2", "--timeout", "5s"])
        .output()
        .expect("subscribe should run");
    assert!(subscribe.status.success());

    let stdout = String::from_utf8_lossy(&subscribe.stdout);
    assert_eq!(stdout.lines().collect::<Vec<_>>(), vec!["gain=0.5", "gain=0.5"]);
}

#[test]
fn invalid_config_is_data_invalid() {
    let dir = tempfile::tempdir().expect("temp dir should be creatable");
    let config = dir.path().join("hub.json");
    std::fs::write(&config, r#"{"endpoints": [{"kind": "smoke", "address": "x"}]}"#)
        .expect("config should be writable");

    let output = kwbus()
        .args(["publish", "--config"])
        .arg(&config)
        .args(["--keyword", "STATE", "--count", "1"])
        .output()
        .expect("publish should run");

    assert_eq!(output.status.code(), Some(60));
}
