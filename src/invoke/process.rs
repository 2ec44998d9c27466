//! Child process plumbing: captured runs with timeouts, and a guard that
//! always terminates and reaps a background server.
//!
//! Every child is started in its own process group so termination reaches
//! anything it forked.

use std::io::Read;
use std::process::{Child, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

#[cfg(unix)]
use nix::sys::signal::Signal;
use tracing::{debug, warn};

use super::CommandLine;
use crate::error::InvocationContext;
use crate::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Grace period between SIGTERM and SIGKILL.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Output of a process that ran to completion.
#[derive(Debug)]
pub struct Captured {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Why a captured run produced no [`Captured`].
#[derive(Debug)]
pub enum ProcessError {
    Spawn(std::io::Error),
    Wait(std::io::Error),
    TimedOut(Duration),
}

impl ProcessError {
    pub fn into_error(self, context: InvocationContext) -> Error {
        let context = Box::new(context);
        match self {
            Self::Spawn(source) | Self::Wait(source) => Error::Spawn { context, source },
            Self::TimedOut(elapsed) => Error::Timeout { context, elapsed },
        }
    }
}

fn configure(command: &CommandLine) -> std::process::Command {
    let mut cmd = command.to_command();
    cmd.stdin(Stdio::null());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    cmd
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Reader threads draining a child's pipes, collected with a deadline.
///
/// The pipes stay open as long as any descendant holds them, so the join
/// must not outlive the invocation timeout.
#[derive(Debug)]
struct Drain {
    rx: Receiver<(Stream, String)>,
    pending: usize,
}

impl Drain {
    fn start(child: &mut Child) -> Self {
        let (tx, rx) = mpsc::channel();
        let mut pending = 0;
        if let Some(pipe) = child.stdout.take() {
            spawn_reader(pipe, Stream::Stdout, tx.clone());
            pending += 1;
        }
        if let Some(pipe) = child.stderr.take() {
            spawn_reader(pipe, Stream::Stderr, tx);
            pending += 1;
        }
        Self { rx, pending }
    }

    /// `(stdout, stderr)`, or `None` if `deadline` passes before every pipe
    /// reaches EOF.
    fn finish(mut self, deadline: Option<Instant>) -> Option<(String, String)> {
        let (mut stdout, mut stderr) = (String::new(), String::new());
        while self.pending > 0 {
            let received = match deadline {
                None => self.rx.recv().ok(),
                Some(deadline) => {
                    match self.rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                        Ok(received) => Some(received),
                        Err(RecvTimeoutError::Timeout) => return None,
                        Err(RecvTimeoutError::Disconnected) => None,
                    }
                }
            };
            // Disconnected: a reader died without sending.
            let Some((stream, text)) = received else {
                break;
            };
            match stream {
                Stream::Stdout => stdout = text,
                Stream::Stderr => stderr = text,
            }
            self.pending -= 1;
        }
        Some((stdout, stderr))
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    mut pipe: R,
    stream: Stream,
    tx: Sender<(Stream, String)>,
) {
    thread::spawn(move || {
        let mut buf = Vec::new();
        // A read error just truncates the capture.
        let _ = pipe.read_to_end(&mut buf);
        // The receiver is gone once the run gave up on this reader.
        let _ = tx.send((stream, String::from_utf8_lossy(&buf).into_owned()));
    });
}

/// Signal every member of the process group led by `pid`. An empty group is
/// not an error.
#[cfg(unix)]
fn signal_group(pid: u32, signal: Signal) -> std::io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(i32::try_from(pid).map_err(std::io::Error::other)?);
    match killpg(pgid, signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// SIGKILL whatever a finished leader left behind in its group.
fn kill_stragglers(pid: u32) {
    #[cfg(unix)]
    {
        if let Err(e) = signal_group(pid, Signal::SIGKILL) {
            debug!(error = %e, pid, "failed to kill leftover group members");
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}

fn wait_until(
    child: &mut Child,
    deadline: Option<Instant>,
) -> std::io::Result<Option<ExitStatus>> {
    let Some(deadline) = deadline else {
        return child.wait().map(Some);
    };
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Run `command` to completion, capturing stdout and stderr.
///
/// The timeout covers both the process and the draining of its pipes. On
/// timeout the process group is terminated and reaped before returning.
/// Descendants still running after the process exits are killed.
pub fn run_captured(
    command: &CommandLine,
    timeout: Option<Duration>,
) -> Result<Captured, ProcessError> {
    let mut cmd = configure(command);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    let start = Instant::now();
    let deadline = timeout.map(|limit| start + limit);
    let mut child = cmd.spawn().map_err(ProcessError::Spawn)?;
    debug!(pid = child.id(), command = %command, "spawned");

    // Drain both pipes concurrently so a chatty child cannot block on a full pipe.
    let drain = Drain::start(&mut child);

    let status = match wait_until(&mut child, deadline) {
        Ok(Some(status)) => status,
        Ok(None) => {
            if let Err(e) = terminate(&mut child, DEFAULT_SHUTDOWN_GRACE) {
                warn!(error = %e, command = %command, "failed to reap timed-out process");
            }
            return Err(ProcessError::TimedOut(start.elapsed()));
        }
        Err(e) => {
            if let Err(kill_err) = terminate(&mut child, DEFAULT_SHUTDOWN_GRACE) {
                warn!(error = %kill_err, "failed to reap process after wait error");
            }
            return Err(ProcessError::Wait(e));
        }
    };

    kill_stragglers(child.id());
    let Some((stdout, stderr)) = drain.finish(deadline) else {
        warn!(command = %command, "pipes still open after exit; giving up");
        return Err(ProcessError::TimedOut(start.elapsed()));
    };
    Ok(Captured {
        status,
        stdout,
        stderr,
    })
}

/// SIGTERM the child's process group, wait up to `grace`, then SIGKILL, and
/// reap. When the child has already exited, only the rest of its group is
/// killed.
pub fn terminate(child: &mut Child, grace: Duration) -> std::io::Result<()> {
    let pid = child.id();
    if child.try_wait()?.is_none() {
        #[cfg(unix)]
        {
            if let Err(e) = signal_group(pid, Signal::SIGTERM) {
                debug!(error = %e, "SIGTERM to process group failed");
            }
            let deadline = Instant::now() + grace;
            while Instant::now() < deadline && child.try_wait()?.is_none() {
                thread::sleep(POLL_INTERVAL);
            }
            if child.try_wait()?.is_none() && signal_group(pid, Signal::SIGKILL).is_err() {
                child.kill()?;
            }
        }
        #[cfg(not(unix))]
        {
            let _ = grace;
            child.kill()?;
        }
        child.wait()?;
    }
    kill_stragglers(pid);
    Ok(())
}

/// A background server that is terminated and reaped when the guard is shut
/// down or dropped, whichever comes first.
#[derive(Debug)]
pub struct ServerGuard {
    child: Option<Child>,
    stderr: Option<Drain>,
    grace: Duration,
}

impl ServerGuard {
    /// Start `command` in the background. Its stdout is discarded, its stderr
    /// kept for error reports.
    pub fn spawn(command: &CommandLine, grace: Duration) -> std::io::Result<Self> {
        let mut cmd = configure(command);
        cmd.stdout(Stdio::null()).stderr(Stdio::piped());
        let mut child = cmd.spawn()?;
        let stderr = Drain::start(&mut child);
        Ok(Self {
            child: Some(child),
            stderr: Some(stderr),
            grace,
        })
    }

    /// Process id of the server.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Exit status if the server has already exited.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        match self.child.as_mut() {
            Some(child) => child.try_wait(),
            None => Ok(None),
        }
    }

    /// Terminate and reap the server and its group, returning whatever it
    /// wrote to stderr.
    pub fn shutdown(mut self) -> std::io::Result<String> {
        if let Some(mut child) = self.child.take() {
            terminate(&mut child, self.grace)?;
        }
        let deadline = Instant::now() + self.grace;
        Ok(self
            .stderr
            .take()
            .and_then(|drain| drain.finish(Some(deadline)))
            .map(|(_, stderr)| stderr)
            .unwrap_or_default())
    }
}

impl Drop for ServerGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = terminate(&mut child, self.grace) {
                warn!(error = %e, pid = child.id(), "failed to terminate server");
            }
        }
    }
}
