//! Spawning of test executables
//!
//! A [`RunningProcess`] owns exactly one child process. Output is streamed to
//! a callback in whatever chunks the pipes deliver; line reassembly is left to
//! the consumer. A watchdog terminates the process after the allotted running
//! time and a [`KillHandle`] allows cooperative cancellation from elsewhere.

use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::TestmateError;
use crate::result::Result;

/// How long output is still collected after the process exited
///
/// Processes forked by the test executable may keep the pipes open; their
/// output after this grace period is dropped.
pub const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Working directory and extra environment of a spawned executable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpawnOptions {
    /// Working directory; inherited when `None`
    pub cwd: Option<PathBuf>,
    /// Variables added on top of the inherited environment
    pub env: IndexMap<String, String>,
}

impl SpawnOptions {
    pub fn new(cwd: impl Into<PathBuf>, env: IndexMap<String, String>) -> Self {
        Self {
            cwd: Some(cwd.into()),
            env,
        }
    }
}

/// Which pipe a chunk of output came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// How a process run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The process exited on its own; `code` is `None` when a signal ended it
    Exited { code: Option<i32> },
    /// The run was cancelled through its [`KillHandle`]
    Killed,
    /// The watchdog terminated the process
    TimedOut,
}

impl ProcessOutcome {
    /// Exited with status 0
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessOutcome::Exited { code: Some(0) })
    }
}

#[derive(Debug, Default)]
struct KillState {
    requested: AtomicBool,
    notify: Notify,
}

/// Cloneable handle that terminates a running process
#[derive(Debug, Clone, Default)]
pub struct KillHandle {
    inner: Arc<KillState>,
}

impl KillHandle {
    /// Request termination; safe to call before, during or after the run
    pub fn kill(&self) {
        self.inner.requested.store(true, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }

    /// Whether termination was requested
    pub fn is_killed(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    async fn requested(&self) {
        loop {
            if self.is_killed() {
                return;
            }
            self.inner.notify.notified().await;
        }
    }
}

/// Starts test executables
pub struct ProcessRunner;

impl ProcessRunner {
    /// Spawn `path` with `args`
    ///
    /// Fails with [`TestmateError::SpawnError`] only when the process could
    /// not be started at all.
    pub fn spawn(path: &Path, args: &[String], options: &SpawnOptions) -> Result<RunningProcess> {
        let mut cmd = Command::new(path);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }
        cmd.envs(&options.env);

        let child = cmd
            .spawn()
            .map_err(|e| TestmateError::spawn_error(path, e))?;
        debug!("Spawned {} {:?}", path.display(), args);

        Ok(RunningProcess {
            child,
            path: path.to_path_buf(),
            kill: KillHandle::default(),
            started: Instant::now(),
        })
    }
}

/// A spawned process that has not been waited on yet
pub struct RunningProcess {
    child: Child,
    path: PathBuf,
    kill: KillHandle,
    started: Instant,
}

impl RunningProcess {
    /// Handle for cancelling this run
    pub fn kill_handle(&self) -> KillHandle {
        self.kill.clone()
    }

    /// OS process id, if still known
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Stream output to `on_output` until the process ends
    ///
    /// When `max_duration` is set and the process runs longer, it is
    /// terminated and the run resolves as [`ProcessOutcome::TimedOut`].
    pub async fn wait<F>(mut self, mut on_output: F, max_duration: Option<Duration>) -> Result<ProcessOutcome>
    where
        F: FnMut(OutputStream, &[u8]),
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut readers: Vec<JoinHandle<()>> = Vec::new();
        if let Some(stdout) = self.child.stdout.take() {
            readers.push(tokio::spawn(pump(stdout, OutputStream::Stdout, tx.clone())));
        }
        if let Some(stderr) = self.child.stderr.take() {
            readers.push(tokio::spawn(pump(stderr, OutputStream::Stderr, tx.clone())));
        }
        drop(tx);

        let deadline = max_duration.map(|d| tokio::time::Instant::from_std(self.started + d));
        let watchdog = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(watchdog);

        let kill = self.kill.clone();
        let kill_requested = kill.requested();
        tokio::pin!(kill_requested);

        let outcome = loop {
            tokio::select! {
                Some((stream, bytes)) = rx.recv() => on_output(stream, &bytes),
                status = self.child.wait() => {
                    let status = status.map_err(|e| TestmateError::io_error(&self.path, e))?;
                    break ProcessOutcome::Exited { code: status.code() };
                }
                _ = &mut kill_requested => {
                    debug!("Killing {}", self.path.display());
                    terminate(&mut self.child).await;
                    break ProcessOutcome::Killed;
                }
                _ = &mut watchdog => {
                    warn!(
                        "{} exceeded its running time of {:?}, terminating",
                        self.path.display(),
                        max_duration.unwrap_or_default()
                    );
                    terminate(&mut self.child).await;
                    break ProcessOutcome::TimedOut;
                }
            }
        };

        let outcome = match outcome {
            ProcessOutcome::Exited { .. } => {
                let drain_deadline = tokio::time::sleep(OUTPUT_DRAIN_TIMEOUT);
                tokio::pin!(drain_deadline);
                loop {
                    tokio::select! {
                        chunk = rx.recv() => match chunk {
                            Some((stream, bytes)) => on_output(stream, &bytes),
                            None => break outcome,
                        },
                        _ = &mut drain_deadline => {
                            warn!(
                                "{} exited but its output is still held open, not waiting for it",
                                self.path.display()
                            );
                            break outcome;
                        }
                        _ = &mut kill_requested => break ProcessOutcome::Killed,
                        _ = &mut watchdog => break ProcessOutcome::TimedOut,
                    }
                }
            }
            ProcessOutcome::Killed | ProcessOutcome::TimedOut => {
                while let Ok((stream, bytes)) = rx.try_recv() {
                    on_output(stream, &bytes);
                }
                outcome
            }
        };
        for reader in &readers {
            reader.abort();
        }

        debug!(
            "{} finished after {:?}: {:?}",
            self.path.display(),
            self.started.elapsed(),
            outcome
        );
        Ok(outcome)
    }
}

async fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!("start_kill failed (process probably gone): {}", e);
    }
    if let Err(e) = child.wait().await {
        warn!("Failed to reap killed process: {}", e);
    }
}

async fn pump<R>(
    mut reader: R,
    stream: OutputStream,
    tx: mpsc::UnboundedSender<(OutputStream, Vec<u8>)>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tx.send((stream, buf[..n].to_vec())).is_err() {
                    break;
                }
            }
        }
    }
}

/// Output of a run collected in memory
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub outcome: ProcessOutcome,
}

/// Spawn, wait and collect both output streams
pub async fn run_captured(
    path: &Path,
    args: &[String],
    options: &SpawnOptions,
    max_duration: Option<Duration>,
) -> Result<CapturedOutput> {
    let process = ProcessRunner::spawn(path, args, options)?;
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let outcome = process
        .wait(
            |stream, bytes| match stream {
                OutputStream::Stdout => stdout.extend_from_slice(bytes),
                OutputStream::Stderr => stderr.extend_from_slice(bytes),
            },
            max_duration,
        )
        .await?;

    Ok(CapturedOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        outcome,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let out = run_captured(Path::new("sh"), &sh("echo hello; echo oops >&2; exit 3"), &SpawnOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(out.stdout, "hello\n");
        assert_eq!(out.stderr, "oops\n");
        assert_eq!(out.outcome, ProcessOutcome::Exited { code: Some(3) });
        assert!(!out.outcome.is_success());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_distinct() {
        let err = ProcessRunner::spawn(
            Path::new("/definitely/not/here/test.exe"),
            &[],
            &SpawnOptions::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, TestmateError::SpawnError { .. }));
    }

    #[tokio::test]
    async fn test_cwd_and_env_are_applied() {
        let temp_dir = TempDir::new().unwrap();
        let mut env = IndexMap::new();
        env.insert("TESTMATE_MARK".to_string(), "bar".to_string());
        let options = SpawnOptions::new(temp_dir.path(), env);

        let out = run_captured(Path::new("sh"), &sh("echo $TESTMATE_MARK; pwd"), &options, None)
            .await
            .unwrap();
        let mut lines = out.stdout.lines();
        assert_eq!(lines.next(), Some("bar"));
        let cwd = PathBuf::from(lines.next().unwrap());
        assert_eq!(
            cwd.canonicalize().unwrap(),
            temp_dir.path().canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn test_watchdog_terminates_long_runs() {
        let started = Instant::now();
        let out = run_captured(
            Path::new("sh"),
            &sh("sleep 10"),
            &SpawnOptions::default(),
            Some(Duration::from_millis(200)),
        )
        .await
        .unwrap();
        assert_eq!(out.outcome, ProcessOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_kill_resolves_as_killed() {
        let process = ProcessRunner::spawn(Path::new("sh"), &sh("sleep 10"), &SpawnOptions::default()).unwrap();
        let handle = process.kill_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.kill();
        });

        let outcome = process.wait(|_, _| {}, None).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Killed);
    }

    #[tokio::test]
    async fn test_kill_before_wait() {
        let process = ProcessRunner::spawn(Path::new("sh"), &sh("sleep 10"), &SpawnOptions::default()).unwrap();
        process.kill_handle().kill();
        let outcome = process.wait(|_, _| {}, None).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Killed);
    }

    #[tokio::test]
    async fn test_forked_process_holding_output_does_not_block() {
        let started = Instant::now();
        let out = run_captured(
            Path::new("sh"),
            &sh("echo done; sleep 5 & exit 0"),
            &SpawnOptions::default(),
            None,
        )
        .await
        .unwrap();
        assert_eq!(out.outcome, ProcessOutcome::Exited { code: Some(0) });
        assert_eq!(out.stdout, "done\n");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_kill_interrupts_output_drain() {
        let process = ProcessRunner::spawn(
            Path::new("sh"),
            &sh("sleep 5 & exit 0"),
            &SpawnOptions::default(),
        )
        .unwrap();
        let handle = process.kill_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            handle.kill();
        });

        let outcome = tokio::time::timeout(Duration::from_secs(4), process.wait(|_, _| {}, None))
            .await
            .expect("kill ends the wait")
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::Killed);
    }

    #[tokio::test]
    async fn test_streams_output_in_chunks() {
        let process = ProcessRunner::spawn(
            Path::new("sh"),
            &sh("printf 'a'; sleep 0.1; printf 'b\\n'"),
            &SpawnOptions::default(),
        )
        .unwrap();
        let mut chunks: Vec<Vec<u8>> = Vec::new();
        let outcome = process
            .wait(|_, bytes| chunks.push(bytes.to_vec()), None)
            .await
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(chunks.concat(), b"ab\n");
    }
}
