/// Process Runner - One External Process, One Result
///
/// **Core Responsibility:**
/// Spawn a command, feed it input bytes, enforce a wall-clock deadline and
/// collect everything it printed.
///
/// **Critical Properties:**
/// - Knows nothing about languages or verdicts
/// - Never returns an error: spawn failures are reported inside `RunResult`
/// - stdin is written by its own task; a broken pipe is ignored
/// - stdout and stderr are drained concurrently so a chatty child cannot block
/// - Output read before the pipes are abandoned is always kept
/// - On unix the child leads its own process group; the group is killed once
///   the child is gone so background descendants cannot outlive the run
///
/// **Timing Rules:**
/// - The kill deadline is `ceil(limit * 1.1)` after spawn
/// - Elapsed time comes from the monotonic clock
/// - Exceeding the nominal limit marks the run timed out even when the process
///   exited on its own before the kill fired
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// How long stream readers may keep going after the process is gone.
/// A leaked grandchild can hold the pipes open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Outcome of a single process run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    /// `None` when the process was killed by a signal or never started
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: u64,
    pub timed_out: bool,
    pub spawn_failed: bool,
}

impl RunResult {
    pub fn succeeded(&self) -> bool {
        !self.spawn_failed && !self.timed_out && self.exit_code == Some(0)
    }
}

/// Kill deadline for a nominal limit: `ceil(limit * 1.1)` milliseconds
pub fn kill_deadline(time_limit_ms: u64) -> Duration {
    Duration::from_millis(time_limit_ms.saturating_mul(11).saturating_add(9) / 10)
}

type SharedBuf = Arc<Mutex<Vec<u8>>>;

/// Append everything read from `stream` into `buf` as it arrives
async fn collect<R: AsyncRead + Unpin>(stream: Option<R>, buf: SharedBuf) {
    let Some(mut stream) = stream else {
        return;
    };
    let mut chunk = [0u8; 8192];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => buf
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(&chunk[..n]),
            Err(e) => {
                debug!(error = %e, "Stream read ended early");
                break;
            }
        }
    }
}

async fn drain(mut reader: JoinHandle<()>, buf: SharedBuf) -> Vec<u8> {
    match tokio::time::timeout(DRAIN_GRACE, &mut reader).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Stream reader task failed"),
        Err(_) => {
            reader.abort();
            warn!("Output pipe still open after exit, keeping what was read");
        }
    }
    let mut collected = buf.lock().unwrap_or_else(PoisonError::into_inner);
    std::mem::take(&mut *collected)
}

/// SIGKILL every process left in the child's group
#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else {
        return;
    };
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => warn!(pgid = pid, error = %e, "Failed to kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

/// Run `command` with `input` on stdin under `time_limit_ms`
pub async fn run(
    command: &CommandLine,
    input: &[u8],
    time_limit_ms: u64,
    workdir: Option<&Path>,
) -> RunResult {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = workdir {
        cmd.current_dir(dir);
    }
    #[cfg(unix)]
    cmd.process_group(0);

    let started = Instant::now();
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(command = %command, error = %e, "Failed to start process");
            return RunResult {
                exit_code: None,
                stdout: String::new(),
                stderr: format!("failed to start {}: {}", command.program, e),
                elapsed_ms: started.elapsed().as_millis() as u64,
                timed_out: false,
                spawn_failed: true,
            };
        }
    };

    let stdin = child.stdin.take();
    let payload = input.to_vec();
    let writer = tokio::spawn(async move {
        if let Some(mut stdin) = stdin {
            // The program may exit without reading; EPIPE is not a run failure
            if let Err(e) = stdin.write_all(&payload).await {
                debug!(error = %e, "stdin write interrupted");
            }
            let _ = stdin.shutdown().await;
        }
    });
    let pid = child.id();
    let stdout_buf = SharedBuf::default();
    let stderr_buf = SharedBuf::default();
    let stdout_reader = tokio::spawn(collect(child.stdout.take(), stdout_buf.clone()));
    let stderr_reader = tokio::spawn(collect(child.stderr.take(), stderr_buf.clone()));

    let deadline = started + kill_deadline(time_limit_ms);
    let mut timed_out = false;

    let waited = tokio::time::timeout_at(deadline, child.wait()).await;
    let status = match waited {
        Ok(status) => status.ok(),
        Err(_) => {
            timed_out = true;
            kill_group(pid);
            if let Err(e) = child.start_kill() {
                warn!(command = %command, error = %e, "Failed to kill timed-out process");
            }
            child.wait().await.ok()
        }
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    if elapsed_ms > time_limit_ms {
        timed_out = true;
    }

    // Leftover descendants would keep the pipes open
    kill_group(pid);
    writer.abort();
    let stdout = drain(stdout_reader, stdout_buf).await;
    let stderr = drain(stderr_reader, stderr_buf).await;

    debug!(
        command = %command,
        exit_code = ?status.and_then(|s| s.code()),
        elapsed_ms,
        timed_out,
        "Process finished"
    );

    RunResult {
        exit_code: status.and_then(|s| s.code()),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        elapsed_ms,
        timed_out,
        spawn_failed: false,
    }
}
