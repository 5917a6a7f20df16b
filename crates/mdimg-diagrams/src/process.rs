//! Supervised execution of renderer processes.
//!
//! On Unix the renderer is started in its own process group, so stopping it
//! also stops whatever it spawned (the node process behind `npx`, headless
//! Chromium).

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use crate::consts::{DRAIN_GRACE, POLL_INTERVAL};
use crate::renderer::CancelToken;

/// How a supervised process ended.
#[derive(Debug)]
pub(crate) enum ProcessOutcome {
    /// The process exited on its own.
    Exited { status: ExitStatus, stderr: String },
    /// The time budget ran out; the process was killed.
    TimedOut,
    /// Cancellation was requested; the process was killed.
    Cancelled,
}

/// Run `command` until it exits, `timeout` elapses or `cancel` is set.
///
/// Standard input is closed; standard output and error are drained on helper
/// threads so a chatty process cannot block on a full pipe. A process that
/// is stopped early is killed together with its process group and reaped
/// before this returns. Once the process exits, leftover group members are
/// killed and its output is awaited only until the timeout (or a short
/// grace period) runs out.
pub(crate) fn run_with_timeout(
    mut command: Command,
    timeout: Duration,
    cancel: &CancelToken,
) -> io::Result<ProcessOutcome> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    isolate(&mut command);

    let mut child = command.spawn()?;
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);
    let started = Instant::now();

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                kill_group(&child);
                let deadline = (started + timeout).max(Instant::now() + DRAIN_GRACE);
                if let Some(out) = collect(stdout, deadline).filter(|s| !s.trim().is_empty()) {
                    tracing::debug!("renderer stdout: {}", out.trim());
                }
                let stderr = collect(stderr, deadline).unwrap_or_default();
                return Ok(ProcessOutcome::Exited { status, stderr });
            }
            Ok(None) => {}
            Err(e) => {
                terminate(&mut child);
                return Err(e);
            }
        }

        // Reader threads are left to finish on their own once the pipes
        // close.
        if cancel.is_cancelled() {
            terminate(&mut child);
            return Ok(ProcessOutcome::Cancelled);
        }
        if started.elapsed() >= timeout {
            terminate(&mut child);
            return Ok(ProcessOutcome::TimedOut);
        }

        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buf) {
            tracing::debug!("failed to read renderer output: {e}");
        }
        // The receiver is gone when the caller stopped waiting.
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

fn collect(output: Option<Receiver<String>>, deadline: Instant) -> Option<String> {
    let rx = output?;
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::debug!("renderer output not collected: {e}");
            None
        }
    }
}

fn terminate(child: &mut Child) {
    kill_group(child);
    if let Err(e) = child.kill() {
        tracing::debug!(pid = child.id(), "failed to kill renderer: {e}");
    }
    if let Err(e) = child.wait() {
        tracing::debug!(pid = child.id(), "failed to reap renderer: {e}");
    }
}

#[cfg(unix)]
fn isolate(command: &mut Command) {
    use std::os::unix::process::CommandExt;

    command.process_group(0);
}

#[cfg(not(unix))]
fn isolate(_command: &mut Command) {}

/// Kill every process in the child's group. The group id equals the child's
/// pid because of [`isolate`].
#[cfg(unix)]
fn kill_group(child: &Child) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(pid) = i32::try_from(child.id()) else {
        return;
    };
    match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::debug!(pid, "failed to kill renderer process group: {e}"),
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}
