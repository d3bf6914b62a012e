//! System executor tests
//!
//! Runs real `sh` processes to check exit status mapping, timeouts and
//! cancellation.

use nas_engine::error::EngineError;
use nas_engine::exec::{Executor, SystemExecutor};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn executor() -> SystemExecutor {
    SystemExecutor::new(Duration::from_secs(5))
}

#[tokio::test]
async fn test_output_captures_stdout() {
    let stdout = executor()
        .output(&CancellationToken::new(), "sh", &["-c", "printf 'tank\\tONLINE\\n'"])
        .await
        .expect("sh runs");

    assert_eq!(stdout, b"tank\tONLINE\n");
}

#[tokio::test]
async fn test_execute_reports_raw_exit_code() {
    // Given: A command exiting with a smartctl-style status bit set
    let output = executor()
        .execute(&CancellationToken::new(), "sh", &["-c", "echo data; exit 64"])
        .await
        .expect("execute does not judge the exit status");

    // Then: The code and output are both available
    assert_eq!(output.code, Some(64));
    assert!(!output.success());
    assert_eq!(output.stdout_lossy(), "data\n");
}

#[tokio::test]
async fn test_non_zero_exit_is_command_failed() {
    let result = executor()
        .run(
            &CancellationToken::new(),
            "sh",
            &["-c", "echo 'cannot open pool' >&2; exit 1"],
        )
        .await;

    match result {
        Err(EngineError::CommandFailed {
            program,
            code,
            stderr,
            ..
        }) => {
            assert_eq!(program, "sh");
            assert_eq!(code, Some(1));
            assert_eq!(stderr, "cannot open pool");
        }
        other => panic!("expected CommandFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_combined_output_appends_stderr() {
    let combined = executor()
        .combined_output(
            &CancellationToken::new(),
            "sh",
            &["-c", "printf out; printf err >&2"],
        )
        .await
        .unwrap();

    assert_eq!(combined, b"outerr");
}

#[tokio::test]
async fn test_slow_command_times_out() {
    // Given: An executor with a short deadline
    let executor = SystemExecutor::new(Duration::from_millis(200));
    let started = Instant::now();

    // When: Running a command that outlives it
    let result = executor
        .run(&CancellationToken::new(), "sh", &["-c", "sleep 10"])
        .await;

    // Then: The call returns at the deadline with a timeout
    assert!(matches!(result, Err(EngineError::Timeout { .. })));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_cancellation_stops_command() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });
    let started = Instant::now();

    let result = executor().run(&cancel, "sh", &["-c", "sleep 10"]).await;

    assert!(matches!(result, Err(EngineError::Cancelled { .. })));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_missing_binary_is_spawn_error() {
    let result = executor()
        .run(&CancellationToken::new(), "definitely-not-a-real-binary", &[])
        .await;

    match result {
        Err(error @ EngineError::Spawn { .. }) => assert!(error.is_transient()),
        other => panic!("expected Spawn, got {other:?}"),
    }
}
