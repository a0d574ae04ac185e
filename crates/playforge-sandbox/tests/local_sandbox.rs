//! Integration tests for the host-process sandbox backend.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use playforge_sandbox::{
    build_sandbox, CheckerInvocation, LocalSandbox, SandboxConfig, SandboxError, SandboxRunner,
};

fn sandbox_in(scratch: &Path) -> LocalSandbox {
    LocalSandbox::new(SandboxConfig::local().with_scratch_dir(scratch))
}

fn sh(name: &str, script: &str, timeout_secs: u64) -> CheckerInvocation {
    // The artifact path lands in $0 of the script.
    CheckerInvocation::custom(
        name,
        vec!["sh".to_string(), "-c".to_string(), script.to_string()],
        timeout_secs,
    )
}

fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

/// Test: checker reads the artifact through the file reference
#[tokio::test]
async fn test_checker_sees_payload_via_file() {
    let scratch = tempfile::tempdir().unwrap();
    let sandbox = sandbox_in(scratch.path());

    let outcome = sandbox
        .run(&sh("cat", "cat \"$0\"", 10), "- hosts: localhost\n")
        .await
        .expect("run failed");

    assert!(outcome.passed());
    assert_eq!(outcome.stdout, "- hosts: localhost\n");
    assert_eq!(entries(scratch.path()), 0, "transient artifact leaked");
}

/// Test: shell metacharacters in the payload are never executed
#[tokio::test]
async fn test_payload_is_not_interpreted() {
    let scratch = tempfile::tempdir().unwrap();
    let marker = scratch.path().join("pwned");
    let sandbox = sandbox_in(scratch.path());

    let payload = format!("$(touch {})\n`touch {}`; touch {}", marker.display(), marker.display(), marker.display());
    let outcome = sandbox
        .run(
            &CheckerInvocation::custom("wc", vec!["wc".to_string(), "-c".to_string()], 10),
            &payload,
        )
        .await
        .expect("run failed");

    assert!(outcome.passed());
    assert!(!marker.exists());
}

/// Test: nonzero exit is an outcome, not an error
#[tokio::test]
async fn test_nonzero_exit_is_reported() {
    let scratch = tempfile::tempdir().unwrap();
    let sandbox = sandbox_in(scratch.path());

    let outcome = sandbox
        .run(&sh("fail", "echo 'load-failure' >&2; exit 2", 10), "x")
        .await
        .expect("run failed");

    assert_eq!(outcome.exit_code, 2);
    assert!(!outcome.timed_out);
    assert!(outcome.stderr.contains("load-failure"));
    assert_eq!(entries(scratch.path()), 0);
}

/// Test: a hung checker is killed at the deadline and leaves nothing behind
#[tokio::test]
async fn test_hung_checker_times_out_without_leaks() {
    let scratch = tempfile::tempdir().unwrap();
    let sandbox = sandbox_in(scratch.path());

    let started = Instant::now();
    let outcome = sandbox
        .run(&sh("hang", "exec sleep 60", 1), "x")
        .await
        .expect("run failed");

    assert!(outcome.timed_out);
    assert_eq!(outcome.timeout_secs, 1);
    assert!(started.elapsed() < Duration::from_secs(20));
    assert_eq!(entries(scratch.path()), 0, "transient artifact leaked");
}

/// Test: timeouts below the floor are clamped up
#[tokio::test]
async fn test_timeout_below_floor_is_clamped() {
    let scratch = tempfile::tempdir().unwrap();
    let config = SandboxConfig {
        min_timeout_secs: 5,
        ..SandboxConfig::local()
    }
    .with_scratch_dir(scratch.path());
    let sandbox = LocalSandbox::new(config);

    let outcome = sandbox
        .run(&sh("quick", "exit 0", 1), "x")
        .await
        .expect("run failed");

    assert_eq!(outcome.timeout_secs, 5);
}

/// Test: missing checker binary is an infrastructure failure
#[tokio::test]
async fn test_missing_executable_is_unavailable() {
    let scratch = tempfile::tempdir().unwrap();
    let sandbox = sandbox_in(scratch.path());

    let inv = CheckerInvocation::custom(
        "ghost",
        vec!["playforge-definitely-not-installed".to_string()],
        10,
    );
    let err = sandbox.run(&inv, "x").await.unwrap_err();

    assert!(matches!(err, SandboxError::Unavailable { .. }));
    assert_eq!(entries(scratch.path()), 0);
}

/// Test: cancelling an in-flight run kills the checker and removes the artifact
#[tokio::test]
async fn test_cancellation_cleans_up() {
    let scratch = tempfile::tempdir().unwrap();
    let sandbox: Arc<dyn SandboxRunner> =
        build_sandbox(&SandboxConfig::local().with_scratch_dir(scratch.path()));

    let task = {
        let sandbox = sandbox.clone();
        tokio::spawn(async move { sandbox.run(&sh("hang", "exec sleep 60", 30), "x").await })
    };

    // Wait until the artifact exists, then cancel.
    for _ in 0..100 {
        if entries(scratch.path()) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(entries(scratch.path()), 1);

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    assert_eq!(entries(scratch.path()), 0, "transient artifact leaked");
}

/// Test: identical input gives identical results
#[tokio::test]
async fn test_runs_are_repeatable() {
    let scratch = tempfile::tempdir().unwrap();
    let sandbox = sandbox_in(scratch.path());
    let inv = sh("grep", "grep -q kubectl \"$0\" && echo 'no kubectl' >&2 && exit 2; exit 0", 10);

    let a = sandbox.run(&inv, "shell: kubectl apply").await.unwrap();
    let b = sandbox.run(&inv, "shell: kubectl apply").await.unwrap();

    assert_eq!(a.exit_code, b.exit_code);
    assert_eq!(a.stderr, b.stderr);
}

#[cfg(target_os = "linux")]
mod descendants {
    use super::*;

    fn is_running(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit_once(") ")
                .map_or(false, |(_, rest)| !rest.starts_with('Z')),
            Err(_) => false,
        }
    }

    async fn gone(pid: i32) -> bool {
        for _ in 0..100 {
            if !is_running(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    fn read_pid(path: &Path) -> Option<i32> {
        std::fs::read_to_string(path).ok()?.trim().parse().ok()
    }

    /// A checker that forks a background sleeper and records its pid.
    fn forking(pidfile: &Path, tail: &str, timeout_secs: u64) -> CheckerInvocation {
        sh(
            "forking",
            &format!("sleep 3271 & echo $! > '{}'; {tail}", pidfile.display()),
            timeout_secs,
        )
    }

    /// Test: a timed-out checker takes its descendants down with it
    #[tokio::test]
    async fn test_timeout_kills_descendants() {
        let scratch = tempfile::tempdir().unwrap();
        let pids = tempfile::tempdir().unwrap();
        let pidfile = pids.path().join("bg.pid");
        let sandbox = sandbox_in(scratch.path());

        let outcome = sandbox
            .run(&forking(&pidfile, "sleep 3272", 1), "x")
            .await
            .expect("run failed");

        assert!(outcome.timed_out);
        let pid = read_pid(&pidfile).expect("pid not recorded");
        assert!(gone(pid).await, "descendant outlived the timeout");
        assert_eq!(entries(scratch.path()), 0);
    }

    /// Test: a clean exit still reaps background descendants and keeps output
    #[tokio::test]
    async fn test_clean_exit_kills_descendants() {
        let scratch = tempfile::tempdir().unwrap();
        let pids = tempfile::tempdir().unwrap();
        let pidfile = pids.path().join("bg.pid");
        let sandbox = sandbox_in(scratch.path());

        let started = Instant::now();
        let outcome = sandbox
            .run(&forking(&pidfile, "echo 'WARNING  1 violation'", 10), "x")
            .await
            .expect("run failed");

        assert!(outcome.passed());
        assert_eq!(outcome.stdout, "WARNING  1 violation\n");
        assert!(started.elapsed() < Duration::from_secs(4));
        let pid = read_pid(&pidfile).expect("pid not recorded");
        assert!(gone(pid).await, "descendant outlived a clean exit");
    }

    /// Test: cancelling a run kills the checker's descendants
    #[tokio::test]
    async fn test_cancellation_kills_descendants() {
        let scratch = tempfile::tempdir().unwrap();
        let pids = tempfile::tempdir().unwrap();
        let pidfile = pids.path().join("bg.pid");
        let sandbox: Arc<dyn SandboxRunner> =
            build_sandbox(&SandboxConfig::local().with_scratch_dir(scratch.path()));

        let task = {
            let sandbox = sandbox.clone();
            let inv = forking(&pidfile, "sleep 3273", 30);
            tokio::spawn(async move { sandbox.run(&inv, "x").await })
        };

        let mut pid = None;
        for _ in 0..100 {
            pid = read_pid(&pidfile);
            if pid.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let pid = pid.expect("pid not recorded");

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(gone(pid).await, "descendant outlived cancellation");
        assert_eq!(entries(scratch.path()), 0);
    }
}
