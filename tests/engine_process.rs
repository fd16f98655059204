//! Engine process lifecycle against a scripted stand-in binary.

#![cfg(unix)]

mod common;

use drover::engine::{EngineError, EngineProcess, EngineState, StartOutcome, StopOutcome};
use std::time::Duration;

fn setup(script: &str) -> (tempfile::TempDir, std::path::PathBuf, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let exe = common::fake_engine(dir.path(), script);
    let config = dir.path().join("config.json");
    std::fs::write(&config, "{}").unwrap();
    (dir, exe, config)
}

#[tokio::test]
async fn test_immediate_exit_is_reported_with_stderr() {
    let (_dir, exe, config) = setup("echo \"bad config\" >&2\nexit 1\n");
    let engine = EngineProcess::with_timeouts(Duration::from_secs(2), Duration::from_secs(2));

    let outcome = engine.start(&exe, &config).await.unwrap();
    assert_eq!(
        outcome,
        StartOutcome::Exited {
            code: Some(1),
            stderr: "bad config".to_string()
        }
    );
    assert_eq!(
        outcome.diagnostic().unwrap(),
        "Engine exited with code 1. Error:\nbad config"
    );
    assert_eq!(engine.state(), EngineState::Exited);
    assert_eq!(engine.stop().await, StopOutcome::NotRunning);
}

#[tokio::test]
async fn test_engine_receives_run_and_config_arguments() {
    let (dir, exe, config) = setup("echo \"$@\" > args.txt\nexec sleep 30\n");
    let engine = EngineProcess::with_timeouts(Duration::from_millis(300), Duration::from_secs(5));

    assert!(engine.start(&exe, &config).await.unwrap().is_running());
    let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
    assert_eq!(args.trim(), format!("-c {}", config.display()));

    engine.stop().await;
}

#[tokio::test]
async fn test_graceful_stop_then_stop_again() {
    let (_dir, exe, config) = setup("exec sleep 30\n");
    let engine = EngineProcess::with_timeouts(Duration::from_millis(200), Duration::from_secs(5));

    let outcome = engine.start(&exe, &config).await.unwrap();
    assert!(outcome.is_running());
    assert_eq!(engine.state(), EngineState::Running);
    assert!(engine.pid().await.is_some());

    assert!(matches!(
        engine.start(&exe, &config).await,
        Err(EngineError::AlreadyRunning)
    ));

    assert_eq!(engine.stop().await, StopOutcome::Graceful);
    assert_eq!(engine.state(), EngineState::Stopped);
    assert_eq!(engine.stop().await, StopOutcome::NotRunning);
    assert_eq!(engine.state(), EngineState::Stopped);
    assert!(engine.pid().await.is_none());
}

#[tokio::test]
async fn test_engine_ignoring_terminate_is_killed() {
    let (_dir, exe, config) = setup("trap '' TERM\nexec sleep 30\n");
    let engine = EngineProcess::with_timeouts(Duration::from_millis(200), Duration::from_millis(500));

    assert!(engine.start(&exe, &config).await.unwrap().is_running());
    let started = std::time::Instant::now();
    assert_eq!(engine.stop().await, StopOutcome::Forced);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(engine.state(), EngineState::Stopped);
}

#[tokio::test]
async fn test_refresh_notices_a_later_exit() {
    let (_dir, exe, config) = setup("sleep 0.5\nexit 3\n");
    let engine = EngineProcess::with_timeouts(Duration::from_millis(100), Duration::from_secs(2));

    assert!(engine.start(&exe, &config).await.unwrap().is_running());
    assert_eq!(engine.refresh().await, EngineState::Running);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(engine.refresh().await, EngineState::Exited);
    assert_eq!(engine.stop().await, StopOutcome::NotRunning);
}

#[tokio::test]
async fn test_non_executable_file_fails_to_spawn() {
    let dir = tempfile::tempdir().unwrap();
    let exe = dir.path().join("sing-box");
    std::fs::write(&exe, "not a program").unwrap();
    let config = dir.path().join("config.json");
    std::fs::write(&config, "{}").unwrap();

    let engine = EngineProcess::with_timeouts(Duration::from_millis(100), Duration::from_secs(1));
    let err = engine.start(&exe, &config).await.unwrap_err();
    assert!(matches!(err, EngineError::Spawn { .. }));
    assert_eq!(engine.state(), EngineState::NotStarted);
}
