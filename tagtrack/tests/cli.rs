//! Runs the `tagtrack` binary end to end.

use std::io::Write;
use std::process::{Command, Output};

use pretty_assertions::assert_eq;
use tagtrack_activity::{ActivityStatus, Tracked};
use tempfile::NamedTempFile;

fn tagtrack(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tagtrack"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run tagtrack")
}

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write temp file");
    file
}

fn tracked_lines(output: &Output) -> Vec<Tracked> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("stdout line is not a tracked item"))
        .collect()
}

#[test]
fn test_replay_file() {
    let log = write_temp(
        "INFO Order received #beg=Order #app=Shop\n\
         INFO Saving #opn=save #rsn=file1\n\
         ERROR Saving #opn=save #rsn=file2 #rcd=5\n\
         INFO Done #end=\n",
    );
    let config = write_temp("metrics_frequency: 3600\nmetrics_on_exception: false\n");

    let output = tagtrack(&[
        "--quiet",
        "replay",
        log.path().to_str().unwrap(),
        "--config",
        config.path().to_str().unwrap(),
        "--thread",
        "worker-7",
    ]);
    assert!(output.status.success(), "{output:?}");

    let items = tracked_lines(&output);
    assert_eq!(items.len(), 1);
    let activity = items[0].as_activity().expect("expected an activity");
    assert_eq!(activity.name, "Order");
    assert_eq!(activity.source.name, "Shop");
    assert_eq!(activity.status, ActivityStatus::End);
    assert_eq!(activity.events.len(), 2);
    assert_eq!(activity.events[1].reason_code, 5);
    assert_eq!(activity.events[1].tag.as_deref(), Some("worker-7"));
}

#[test]
fn test_replay_closes_activity_at_end_of_input() {
    let log = write_temp("#beg=Batch\nfirst\nsecond\n");
    let output = tagtrack(&["--quiet", "replay", log.path().to_str().unwrap()]);
    assert!(output.status.success(), "{output:?}");

    let items = tracked_lines(&output);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].as_activity().map(|a| a.events.len()), Some(2));
}

#[test]
fn test_replay_rejects_invalid_config() {
    let log = write_temp("INFO hello\n");
    let config = write_temp("max_activity_size: 0\n");
    let output = tagtrack(&[
        "--quiet",
        "replay",
        log.path().to_str().unwrap(),
        "--config",
        config.path().to_str().unwrap(),
    ]);
    assert!(!output.status.success());
}

#[test]
fn test_parse_message() {
    let output = tagtrack(&["parse", "text #rsn=Foo #msg='A B' #rcd=42"]);
    assert!(output.status.success(), "{output:?}");

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "text": "text",
            "annotations": {"rsn": "Foo", "msg": "A B", "rcd": "42"},
            "fields": {}
        })
    );
}
