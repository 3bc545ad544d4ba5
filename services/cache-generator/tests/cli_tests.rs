//! The `generate-cache` binary's output channels.

use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};
use test_utils::{write_local_project, TempCache};

// ============================================================================
// Helper functions
// ============================================================================

/// Every tile of this run is rejected as undersized, so it produces
/// warnings and internal diagnostics.
fn run_failing(cache: &TempCache, extra: &[&str]) -> Output {
    let project = write_local_project(cache.path());
    Command::new(env!("CARGO_BIN_EXE_generate-cache"))
        .env_clear()
        .current_dir(cache.path())
        .arg("--project")
        .arg(&project)
        .arg("--output-dir")
        .arg(cache.cache_root())
        .args(["--layer", "parks", "--zoom-max", "1", "--tile-retries", "0"])
        .args(["--min-tile-bytes", "100000000", "--log-level", "debug"])
        .args(extra)
        .output()
        .expect("Failed to run generate-cache")
}

fn records(stream: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stream)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).unwrap_or_else(|e| panic!("not JSON ({}): {}", e, line))
        })
        .collect()
}

fn assert_all_have_kind(records: &[Value]) {
    for record in records {
        assert!(
            record.get("kind").and_then(|k| k.as_str()).is_some(),
            "record without kind: {}",
            record
        );
    }
}

// ============================================================================
// Channels
// ============================================================================

#[test]
fn test_failing_run_stderr_is_event_stream() {
    let cache = TempCache::new();
    let output = run_failing(&cache, &[]);

    assert_eq!(output.status.code(), Some(2));

    let stderr = records(&output.stderr);
    assert!(!stderr.is_empty());
    assert_all_have_kind(&stderr);
    assert!(stderr
        .iter()
        .any(|r| r.get("event").and_then(|e| e.as_str()) == Some("tile_skipped")));

    let stdout = records(&output.stdout);
    assert_all_have_kind(&stdout);
    let status = stdout.last().and_then(|r| r.get("status")).and_then(|s| s.as_str());
    assert_eq!(status, Some("error"));
}

#[test]
fn test_diagnostics_go_to_log_file() {
    let cache = TempCache::new();
    let log_file = cache.path().join("logs").join("generate.log");
    let output = run_failing(&cache, &["--log-file", log_file.to_str().unwrap()]);

    assert_all_have_kind(&records(&output.stderr));
    assert_all_have_kind(&records(&output.stdout));

    let log = std::fs::read_to_string(Path::new(&log_file)).unwrap();
    assert!(log.contains("Tile failed"), "{}", log);
    assert!(records(log.as_bytes()).iter().all(|r| r.get("kind").is_none()));
}
