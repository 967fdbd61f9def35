//! Helpers for running child processes with timeouts and bounded output.

use std::fs::File;
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// How long the output readers may keep draining after the child has been
/// reaped. Pipes still open after this are held by leftover descendants.
const READER_GRACE: Duration = Duration::from_secs(2);

const CHUNK_BYTES: usize = 8192;
/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_truncated_notice(&self, label: &str) -> String {
        if self.stdout_truncated > 0 {
            format!(
                "\n[{label} stdout truncated {} bytes]\n",
                self.stdout_truncated
            )
        } else {
            String::new()
        }
    }

    pub fn stderr_truncated_notice(&self, label: &str) -> String {
        if self.stderr_truncated > 0 {
            format!(
                "\n[{label} stderr truncated {} bytes]\n",
                self.stderr_truncated
            )
        } else {
            String::new()
        }
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently in fixed-size chunks while the child runs. `output_limit_bytes`
/// bounds the amount of stdout/stderr stored in memory (bytes beyond this are discarded while
/// still draining the pipe). When `stream_path` is `Some`, stdout is also appended to that file
/// and flushed as it arrives.
///
/// On unix the child leads its own process group. On timeout the whole group is killed and the
/// child reaped before returning. Readers get [`READER_GRACE`] after the child is reaped; if a
/// descendant still holds a pipe after that, the group is killed and the output captured so far
/// is returned.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes, streaming = stream_path.is_some()))]
pub fn run_command(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
    stream_path: Option<&Path>,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };
    let leader = child.id();
    debug!(pgid = leader, "child leads its own process group");

    let started = stream_path
        .map(open_stream_file)
        .transpose()
        .and_then(|tee| start_drains(&mut child, output_limit_bytes, tee));
    let (stdout_drain, stderr_drain) = match started {
        Ok(drains) => drains,
        Err(err) => {
            abandon(&mut child, leader);
            return Err(err);
        }
    };

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing process group"
            );
            timed_out = true;
            kill_group_or_warn(leader);
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let deadline = Instant::now() + READER_GRACE;
    let stdout = stdout_drain.finish(deadline).context("collect stdout")?;
    let stderr = stderr_drain.finish(deadline).context("collect stderr")?;
    if !(stdout.complete && stderr.complete) {
        warn!(
            grace_secs = READER_GRACE.as_secs(),
            "output pipes still open after exit, killing leftover processes"
        );
        kill_group_or_warn(leader);
    }

    if stdout.truncated > 0 || stderr.truncated > 0 {
        warn!(
            stdout_truncated = stdout.truncated,
            stderr_truncated = stderr.truncated,
            "output truncated"
        );
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout: stdout.bytes,
        stderr: stderr.bytes,
        stdout_truncated: stdout.truncated,
        stderr_truncated: stderr.truncated,
        timed_out,
    })
}

fn open_stream_file(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create stream dir {}", parent.display()))?;
    }
    let file =
        File::create(path).with_context(|| format!("create stream file {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn start_drains(
    child: &mut Child,
    limit: usize,
    tee: Option<BufWriter<File>>,
) -> Result<(Drain, Drain)> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    Ok((
        Drain::spawn(stdout, limit, tee),
        Drain::spawn(stderr, limit, None),
    ))
}

/// Kill and reap a child we can no longer supervise.
fn abandon(child: &mut Child, leader: u32) {
    kill_group_or_warn(leader);
    if let Err(err) = child.kill().and_then(|()| child.wait().map(drop)) {
        warn!(err = %err, "failed to kill abandoned child");
    }
}

fn kill_group_or_warn(leader: u32) {
    if let Err(err) = kill_group(leader) {
        warn!(err = %format!("{err:#}"), "failed to kill process group");
    }
}

/// SIGKILL every process in the group led by `leader`. A group that is
/// already gone is not an error.
#[cfg(unix)]
fn kill_group(leader: u32) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = i32::try_from(leader).context("process id out of range")?;
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(errno).context("kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_leader: u32) -> Result<()> {
    Ok(())
}

/// Bytes kept from one pipe, shared between its reader thread and the caller.
#[derive(Debug, Default)]
struct Capture {
    bytes: Vec<u8>,
    truncated: usize,
}

impl Capture {
    fn keep(&mut self, chunk: &[u8], limit: usize) {
        let remaining = limit.saturating_sub(self.bytes.len());
        let keep = chunk.len().min(remaining);
        self.bytes.extend_from_slice(&chunk[..keep]);
        self.truncated += chunk.len() - keep;
    }
}

#[derive(Debug)]
struct Collected {
    bytes: Vec<u8>,
    truncated: usize,
    /// The pipe reached EOF before the deadline.
    complete: bool,
}

/// Reader thread draining one pipe into a [`Capture`].
struct Drain {
    capture: Arc<Mutex<Capture>>,
    done: mpsc::Receiver<Result<()>>,
}

impl Drain {
    fn spawn<R>(reader: R, limit: usize, tee: Option<BufWriter<File>>) -> Self
    where
        R: Read + Send + 'static,
    {
        let capture = Arc::new(Mutex::new(Capture::default()));
        let (tx, done) = mpsc::channel();
        let shared = Arc::clone(&capture);
        thread::spawn(move || {
            let result = drain_limited(reader, limit, tee, &shared);
            // The receiver is gone once the caller stopped waiting.
            let _ = tx.send(result);
        });
        Self { capture, done }
    }

    /// Wait for EOF until `deadline`, then take whatever has been captured.
    fn finish(self, deadline: Instant) -> Result<Collected> {
        let wait = deadline.saturating_duration_since(Instant::now());
        let complete = match self.done.recv_timeout(wait) {
            Ok(result) => {
                result?;
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => bail!("output reader thread panicked"),
        };
        let mut capture = self.capture.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Collected {
            bytes: std::mem::take(&mut capture.bytes),
            truncated: capture.truncated,
            complete,
        })
    }
}

/// Read a pipe in fixed-size chunks until EOF, keeping at most `limit` bytes
/// and optionally tee-ing everything to a file.
fn drain_limited<R: Read>(
    mut reader: R,
    limit: usize,
    mut tee: Option<BufWriter<File>>,
    capture: &Mutex<Capture>,
) -> Result<()> {
    let mut chunk = [0u8; CHUNK_BYTES];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("read output"),
        };

        if let Some(writer) = tee.as_mut() {
            if let Err(e) = writer.write_all(&chunk[..n]).and_then(|()| writer.flush()) {
                warn!(err = %e, "failed to write to stream file, disabling tee");
                tee = None;
            }
        }

        capture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keep(&chunk[..n], limit);
    }
}
