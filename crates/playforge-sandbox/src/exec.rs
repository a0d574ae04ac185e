//! Deadline-bounded child process execution with capped output capture.

use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::runner::CheckerOutcome;

const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// What a child left behind.
pub(crate) struct Captured {
    /// `None` when the deadline expired and the child was killed.
    pub status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl Captured {
    pub(crate) fn exit_code(&self) -> i32 {
        self.status.and_then(|s| s.code()).unwrap_or(-1)
    }

    pub(crate) fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }

    /// Map to the public result type; a missing status means the deadline hit.
    pub(crate) fn into_outcome(self, timeout_secs: u64) -> CheckerOutcome {
        let exit_code = self.exit_code();
        let elapsed_ms = self.elapsed_ms();
        let outcome = match self.status {
            Some(_) => CheckerOutcome::completed(exit_code, self.stdout, self.stderr, timeout_secs),
            None => CheckerOutcome::deadline_exceeded(self.stdout, self.stderr, timeout_secs),
        };
        outcome.with_duration_ms(elapsed_ms)
    }
}

/// Spawn `cmd` and wait for it at most `deadline`.
///
/// The child gets its own process group. The whole group is killed once the
/// leader exits or the deadline expires, and on drop of the returned future,
/// so background descendants never outlive the call. Readers keep draining
/// the pipes past `max_output_bytes` so a chatty child never blocks on a full
/// pipe.
pub(crate) async fn run_to_deadline(
    cmd: &mut Command,
    deadline: Duration,
    grace: Duration,
    max_output_bytes: usize,
) -> std::io::Result<Captured> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let started = Instant::now();
    let mut child = cmd.spawn()?;
    let mut group = ProcessGroup::new(child.id());

    let stdout_buf = SharedCapture::default();
    let stderr_buf = SharedCapture::default();
    let stdout = tokio::spawn(read_capped(
        child.stdout.take(),
        stdout_buf.clone(),
        max_output_bytes,
    ));
    let stderr = tokio::spawn(read_capped(
        child.stderr.take(),
        stderr_buf.clone(),
        max_output_bytes,
    ));

    let status = match tokio::time::timeout(deadline, child.wait()).await {
        Ok(status) => {
            group.kill();
            Some(status?)
        }
        Err(_) => {
            group.kill();
            if let Err(e) = child.kill().await {
                tracing::debug!(error = %e, "child already gone at deadline");
            }
            None
        }
    };

    let stdout = collect(stdout, &stdout_buf, grace).await;
    let stderr = collect(stderr, &stderr_buf, grace).await;

    Ok(Captured {
        status,
        stdout,
        stderr,
        elapsed: started.elapsed(),
    })
}

/// Bytes read from one pipe so far, shared with the reader task.
#[derive(Clone, Default)]
struct SharedCapture(Arc<Mutex<Capture>>);

#[derive(Default)]
struct Capture {
    bytes: Vec<u8>,
    truncated: bool,
}

impl SharedCapture {
    fn lock(&self) -> MutexGuard<'_, Capture> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn append(&self, chunk: &[u8], limit: usize) {
        let mut capture = self.lock();
        let room = limit.saturating_sub(capture.bytes.len());
        if chunk.len() > room {
            capture.truncated = true;
        }
        capture.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    fn text(&self) -> String {
        let capture = self.lock();
        let mut text = String::from_utf8_lossy(&capture.bytes).into_owned();
        if capture.truncated {
            text.push_str(TRUNCATION_MARKER);
        }
        text
    }
}

async fn read_capped<R>(reader: Option<R>, sink: SharedCapture, limit: usize)
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return;
    };

    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => sink.append(&chunk[..n], limit),
        }
    }
}

/// Wait for a reader, then return what it captured.
///
/// A reader still blocked after `grace` is abandoned; whatever it read up to
/// that point is kept.
async fn collect(handle: JoinHandle<()>, sink: &SharedCapture, grace: Duration) -> String {
    let abort = handle.abort_handle();
    if tokio::time::timeout(grace, handle).await.is_err() {
        abort.abort();
    }
    sink.text()
}

/// Kills the child's process group, at the latest when dropped.
///
/// `kill_on_drop` only reaches the direct child; checkers that fork (shell
/// wrappers, python workers) need the group signal too.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_process_group(pgid);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
        // Nothing left in the group.
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pgid, error = %e, "failed to signal checker process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2; exit 3"]);
        let captured = run_to_deadline(
            &mut cmd,
            Duration::from_secs(10),
            Duration::from_secs(1),
            1024,
        )
        .await
        .unwrap();

        assert_eq!(captured.exit_code(), 3);
        assert_eq!(captured.stdout.trim(), "out");
        assert_eq!(captured.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_deadline_kills_child() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exec sleep 30"]);
        let started = Instant::now();
        let captured = run_to_deadline(
            &mut cmd,
            Duration::from_millis(200),
            Duration::from_secs(1),
            1024,
        )
        .await
        .unwrap();

        assert!(captured.status.is_none());
        assert_eq!(captured.exit_code(), -1);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_output_is_capped_but_drained() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "head -c 200000 /dev/zero | tr '\\0' 'a'"]);
        let captured = run_to_deadline(
            &mut cmd,
            Duration::from_secs(10),
            Duration::from_secs(1),
            100,
        )
        .await
        .unwrap();

        assert_eq!(captured.exit_code(), 0);
        assert!(captured.stdout.starts_with(&"a".repeat(100)));
        assert!(captured.stdout.ends_with(TRUNCATION_MARKER));
    }

    #[cfg(target_os = "linux")]
    fn is_running(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit_once(") ")
                .map_or(false, |(_, rest)| !rest.starts_with('Z')),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    async fn gone(pid: i32) -> bool {
        for _ in 0..100 {
            if !is_running(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[cfg(target_os = "linux")]
    fn read_pid(path: &std::path::Path) -> i32 {
        std::fs::read_to_string(path).unwrap().trim().parse().unwrap()
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_background_descendant_killed_after_clean_exit() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("bg.pid");
        let mut cmd = Command::new("sh");
        cmd.args([
            "-c",
            &format!("sleep 3191 & echo $! > '{}'; echo done", pidfile.display()),
        ]);

        let started = Instant::now();
        let captured = run_to_deadline(
            &mut cmd,
            Duration::from_secs(10),
            Duration::from_secs(5),
            1024,
        )
        .await
        .unwrap();

        assert_eq!(captured.exit_code(), 0);
        assert_eq!(captured.stdout, "done\n");
        assert!(started.elapsed() < Duration::from_secs(4), "stalled on inherited pipes");
        assert!(gone(read_pid(&pidfile)).await, "background sleep outlived the run");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_group_kill_does_not_depend_on_path() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("bg.pid");
        let mut cmd = Command::new("/bin/sh");
        cmd.env("PATH", "/nonexistent").args([
            "-c",
            &format!(
                "/bin/sleep 3181 & echo $! > '{}'; exec /bin/sleep 3182",
                pidfile.display()
            ),
        ]);

        let captured = run_to_deadline(
            &mut cmd,
            Duration::from_millis(500),
            Duration::from_secs(1),
            1024,
        )
        .await
        .unwrap();

        assert!(captured.status.is_none());
        assert!(gone(read_pid(&pidfile)).await, "descendant survived the deadline");
    }

    #[tokio::test]
    async fn test_abandoned_reader_keeps_partial_output() {
        let sink = SharedCapture::default();
        sink.append(b"partial line\n", 1024);
        let reader = tokio::spawn(std::future::pending::<()>());

        let text = collect(reader, &sink, Duration::from_millis(50)).await;

        assert_eq!(text, "partial line\n");
    }

    #[test]
    fn test_capture_marks_truncation() {
        let sink = SharedCapture::default();
        sink.append(b"abcdef", 4);
        sink.append(b"gh", 4);
        assert_eq!(sink.text(), format!("abcd{TRUNCATION_MARKER}"));
    }
}
