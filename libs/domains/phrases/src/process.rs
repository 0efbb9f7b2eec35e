//! Subprocess execution for the StarSpace tools.
//!
//! Programs always get an argument list, never a shell string. Every run is
//! bounded by a timeout and the child is killed when its future is dropped.

use crate::error::{PhraseError, PhraseResult};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Read buffer for streamed output.
pub const READ_CHUNK_BYTES: usize = 1 << 20;
/// Longest line logged in one piece; longer lines are split.
pub const MAX_LINE_BYTES: u64 = 100 << 20;
/// stderr lines kept for the error of a failed streaming run.
const STDERR_TAIL_LINES: usize = 20;
/// How long output pipes may stay open once a streamed program has exited.
pub const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Captured result of [`run_with_input`].
#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CapturedOutput {
    /// stdout followed by stderr, lossily decoded, for error messages.
    pub fn combined(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&self.stderr));
        text.trim().to_string()
    }
}

pub(crate) fn program_name(program: &Path) -> String {
    program
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

fn spawn(mut command: Command, program: &Path) -> PhraseResult<Child> {
    command.kill_on_drop(true).spawn().map_err(|source| PhraseError::Spawn {
        program: program.display().to_string(),
        source,
    })
}

/// Run `program`, feed `input` on stdin, and capture both output streams.
pub async fn run_with_input(
    program: &Path,
    args: &[OsString],
    input: &[u8],
    limit: Duration,
) -> PhraseResult<CapturedOutput> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = spawn(command, program)?;
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| PhraseError::Internal("child stdin not captured".to_string()))?;

    let write_input = async move {
        let result = async {
            stdin.write_all(input).await?;
            stdin.shutdown().await
        }
        .await;
        drop(stdin);
        match result {
            // The tool may exit without reading its input
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
            other => other,
        }
    };

    let run = async {
        let (written, output) = tokio::join!(write_input, child.wait_with_output());
        if let Err(e) = written {
            debug!(error = %e, "Failed to write subprocess stdin");
        }
        output
    };

    match tokio::time::timeout(limit, run).await {
        Ok(Ok(output)) => Ok(CapturedOutput {
            status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        }),
        Ok(Err(e)) => Err(PhraseError::Io(e)),
        Err(_) => Err(PhraseError::Timeout {
            program: program_name(program),
            seconds: limit.as_secs(),
        }),
    }
}

/// Exit of a [`run_streaming`] child.
#[derive(Debug)]
pub struct StreamedExit {
    pub status: ExitStatus,
    /// Last stderr lines, newline separated
    pub stderr_tail: String,
}

/// Resolves once `cancel` flips to `true`; never resolves if the sender is gone.
pub async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Run `program` with null stdin, logging stdout at info and stderr at warn
/// line by line until it exits, times out, or `cancel` fires.
///
/// The timeout and the cancel signal also bound the drain of the output
/// pipes after exit, which stay open while any background child of the
/// program holds them. A drain that outlives [`DRAIN_GRACE`] or the deadline
/// is abandoned and the exit is reported with the output read so far.
pub async fn run_streaming(
    program: &Path,
    args: &[OsString],
    limit: Duration,
    mut cancel: watch::Receiver<bool>,
) -> PhraseResult<StreamedExit> {
    let name = program_name(program);
    let deadline = Instant::now() + limit;
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = spawn(command, program)?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| PhraseError::Internal("child stdout not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| PhraseError::Internal("child stderr not captured".to_string()))?;

    let tail = StderrTail::default();
    let mut stdout_task = tokio::spawn(log_lines(stdout, name.clone(), None));
    let mut stderr_task = tokio::spawn(log_lines(stderr, name.clone(), Some(tail.clone())));

    let outcome = tokio::select! {
        waited = child.wait() => Phase::Exited(waited),
        _ = tokio::time::sleep_until(deadline) => Phase::TimedOut,
        _ = cancelled(&mut cancel) => Phase::Cancelled,
    };

    let status = match outcome {
        Phase::Exited(Ok(status)) => status,
        Phase::Exited(Err(e)) => {
            stop(&mut child, &name, &stdout_task, &stderr_task).await;
            return Err(PhraseError::Io(e));
        }
        Phase::TimedOut => {
            warn!(program = %name, timeout_secs = limit.as_secs(), "Subprocess timed out, killing it");
            stop(&mut child, &name, &stdout_task, &stderr_task).await;
            return Err(PhraseError::Timeout {
                program: name,
                seconds: limit.as_secs(),
            });
        }
        Phase::Cancelled => {
            warn!(program = %name, "Subprocess cancelled, killing it");
            stop(&mut child, &name, &stdout_task, &stderr_task).await;
            return Err(PhraseError::Cancelled(name));
        }
    };

    let drain_until = deadline.min(Instant::now() + DRAIN_GRACE);
    let drained = tokio::select! {
        _ = async { tokio::join!(&mut stdout_task, &mut stderr_task) } => Phase::Exited(Ok(status)),
        _ = tokio::time::sleep_until(drain_until) => Phase::TimedOut,
        _ = cancelled(&mut cancel) => Phase::Cancelled,
    };
    stdout_task.abort();
    stderr_task.abort();

    match drained {
        Phase::Cancelled => {
            warn!(program = %name, "Subprocess cancelled while draining output");
            return Err(PhraseError::Cancelled(name));
        }
        Phase::TimedOut => warn!(program = %name, "Output still open after exit, abandoning it"),
        Phase::Exited(_) => {}
    }

    Ok(StreamedExit {
        status,
        stderr_tail: tail.joined(),
    })
}

enum Phase {
    Exited(io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

async fn stop(
    child: &mut Child,
    name: &str,
    stdout_task: &JoinHandle<()>,
    stderr_task: &JoinHandle<()>,
) {
    if let Err(e) = child.kill().await {
        debug!(program = %name, error = %e, "Kill after abnormal exit failed");
    }
    stdout_task.abort();
    stderr_task.abort();
}

/// Last stderr lines, shared with the reader task so they survive its abort.
#[derive(Clone, Default)]
struct StderrTail(Arc<Mutex<VecDeque<String>>>);

impl StderrTail {
    fn push(&self, line: &str) {
        let mut lines = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if lines.len() == STDERR_TAIL_LINES {
            lines.pop_front();
        }
        lines.push_back(line.to_string());
    }

    fn joined(&self) -> String {
        let lines = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Vec::from(lines.clone()).join("\n")
    }
}

/// Log every line of `reader`; lines over [`MAX_LINE_BYTES`] come out in pieces.
///
/// stderr readers get a `tail` and also record their last lines there.
async fn log_lines<R>(reader: R, program: String, tail: Option<StderrTail>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::with_capacity(READ_CHUNK_BYTES, reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        match (&mut reader).take(MAX_LINE_BYTES).read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                let text = text.trim_end_matches(['\r', '\n']);
                if text.is_empty() {
                    continue;
                }
                match &tail {
                    Some(tail) => {
                        warn!(program = %program, "{}", text);
                        tail.push(text);
                    }
                    None => info!(program = %program, "{}", text),
                }
            }
            Err(e) => {
                warn!(program = %program, error = %e, "Failed to read subprocess output");
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_run_with_input_captures_streams() {
        let dir = TempDir::new().unwrap();
        let cat = script(&dir, "echo_input", "cat\necho done >&2\n");

        let output = run_with_input(&cat, &[], b"hello\n", Duration::from_secs(5))
            .await
            .unwrap();

        assert!(output.status.success());
        assert_eq!(output.stdout, b"hello\n");
        assert_eq!(output.combined(), "hello\ndone");
    }

    #[tokio::test]
    async fn test_run_with_input_passes_arguments_verbatim() {
        let dir = TempDir::new().unwrap();
        let args = script(&dir, "print_args", "printf '%s\\n' \"$@\"\n");
        let tricky = OsString::from("$(rm -rf /); `id` | && \"quoted\"");

        let output = run_with_input(&args, &[tricky.clone()], b"", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(
            String::from_utf8(output.stdout).unwrap().trim_end(),
            tricky.to_string_lossy()
        );
    }

    #[tokio::test]
    async fn test_run_with_input_times_out() {
        let dir = TempDir::new().unwrap();
        let slow = script(&dir, "slow", "exec sleep 30\n");

        let err = run_with_input(&slow, &[], b"", Duration::from_millis(200))
            .await
            .unwrap_err();

        assert!(matches!(err, PhraseError::Timeout { ref program, .. } if program == "slow"));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = run_with_input(
            Path::new("/nonexistent/embed_doc"),
            &[],
            b"",
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PhraseError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_run_streaming_reports_exit_status() {
        let dir = TempDir::new().unwrap();
        let noisy = script(&dir, "noisy", "echo progress\necho oops >&2\nexit 4\n");
        let (_tx, rx) = watch::channel(false);

        let exit = run_streaming(&noisy, &[], Duration::from_secs(5), rx)
            .await
            .unwrap();

        assert_eq!(exit.status.code(), Some(4));
        assert_eq!(exit.stderr_tail, "oops");
    }

    #[tokio::test]
    async fn test_run_streaming_times_out() {
        let dir = TempDir::new().unwrap();
        let slow = script(&dir, "slow_train", "exec sleep 30\n");
        let (_tx, rx) = watch::channel(false);

        let err = run_streaming(&slow, &[], Duration::from_millis(200), rx)
            .await
            .unwrap_err();

        assert!(matches!(err, PhraseError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_run_streaming_cancelled() {
        let dir = TempDir::new().unwrap();
        let slow = script(&dir, "slow_train", "exec sleep 30\n");
        let (tx, rx) = watch::channel(false);

        let run = tokio::spawn(async move {
            run_streaming(&slow, &[], Duration::from_secs(60), rx).await
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        let err = run.await.unwrap().unwrap_err();
        assert!(matches!(err, PhraseError::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_run_streaming_bounded_when_background_child_holds_output() {
        let dir = TempDir::new().unwrap();
        let detached = script(
            &dir,
            "detached",
            "sleep 6 &\necho trained\necho warned >&2\nexit 0\n",
        );
        let (_tx, rx) = watch::channel(false);
        let started = std::time::Instant::now();

        let exit = run_streaming(&detached, &[], Duration::from_secs(1), rx)
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(exit.status.success());
        assert_eq!(exit.stderr_tail, "warned");
    }

    #[tokio::test]
    async fn test_run_streaming_cancelled_while_output_still_open() {
        let dir = TempDir::new().unwrap();
        let detached = script(&dir, "detached", "sleep 6 &\necho trained\nexit 0\n");
        let (tx, rx) = watch::channel(false);
        let started = std::time::Instant::now();

        let run = tokio::spawn(async move {
            run_streaming(&detached, &[], Duration::from_secs(60), rx).await
        });
        tokio::time::sleep(Duration::from_millis(500)).await;
        tx.send(true).unwrap();

        let err = run.await.unwrap().unwrap_err();
        assert!(matches!(err, PhraseError::Cancelled(_)));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_long_lines_are_consumed() {
        let dir = TempDir::new().unwrap();
        let long = script(
            &dir,
            "long_line",
            "head -c 3000000 /dev/zero | tr '\\0' 'x'\necho\necho tail\n",
        );
        let (_tx, rx) = watch::channel(false);

        let exit = run_streaming(&long, &[], Duration::from_secs(10), rx)
            .await
            .unwrap();

        assert!(exit.status.success());
        assert!(exit.stderr_tail.is_empty());
    }
}
