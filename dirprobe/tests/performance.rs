// dirprobe/tests/performance.rs

mod common;

use assert_cmd::Command;
use common::{spawn_responder, HOLD};
use std::time::{Duration, Instant};

fn dirprobe() -> Command {
    let mut cmd = Command::cargo_bin("dirprobe").unwrap();
    cmd.env("HOME", "/nonexistent-dirprobe-home")
        .env_remove("XDG_CONFIG_HOME")
        .env_remove("DP_CONFIG")
        .env_remove("DP_POOL_SIZE")
        .env_remove("DP_TIMEOUT");
    cmd
}

#[test]
fn test_concurrent_processing_efficiency() {
    let base = spawn_responder();
    let candidates: Vec<String> = (0..24).map(|i| format!("hold{}", i)).collect();

    let start = Instant::now();
    dirprobe()
        .arg(&base)
        .args(&candidates)
        .args(["-c", "8", "--batch"])
        .timeout(Duration::from_secs(30))
        .assert()
        .success();
    let duration = start.elapsed();

    // 24 held responses one at a time would take 24 * HOLD
    let sequential = HOLD * 24;
    assert!(
        duration < sequential,
        "probes were not overlapped: {:?} (sequential {:?})",
        duration,
        sequential
    );
}

#[test]
fn test_single_candidate_is_fast() {
    let base = spawn_responder();

    let start = Instant::now();
    dirprobe()
        .args([base.as_str(), "admin"])
        .timeout(Duration::from_secs(10))
        .assert()
        .success();

    assert!(
        start.elapsed() < Duration::from_secs(5),
        "single probe took too long: {:?}",
        start.elapsed()
    );
}

#[test]
fn test_stalled_targets_bounded_by_timeout() {
    let base = spawn_responder();
    let candidates: Vec<String> = (0..6).map(|i| format!("slow{}", i)).collect();

    let start = Instant::now();
    dirprobe()
        .arg(&base)
        .args(&candidates)
        .args(["-c", "2", "-t", "400ms", "--batch", "--all"])
        .timeout(Duration::from_secs(20))
        .assert()
        .success();
    let duration = start.elapsed();

    // Three waves of two stalled probes, each cut off at the timeout
    assert!(
        duration < Duration::from_secs(4),
        "stalled probes were not reaped: {:?}",
        duration
    );
}
