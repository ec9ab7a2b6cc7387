//! Post-install smoke test.
//!
//! Runs the freshly installed binary (by default with `--version`) and
//! requires a zero exit status and some output on stdout within a timeout.

use log::debug;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// Default time the installed binary has to answer.
pub const SELF_TEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest stderr excerpt carried in a failure message.
const STDERR_EXCERPT_CHARS: usize = 400;

const SPAWN_ATTEMPTS: u32 = 5;

/// Errors arising from the post-install self-test.
#[derive(Debug, thiserror::Error)]
pub enum SelfTestError {
    /// The binary could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// The binary path.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The binary did not exit in time, or left its output pipes open past
    /// the deadline.
    #[error("{program} did not finish within {}s", timeout.as_secs())]
    TimedOut {
        /// The binary path.
        program: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The binary exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        /// The binary path.
        program: String,
        /// The exit status.
        status: ExitStatus,
        /// The start of its stderr output.
        stderr: String,
    },

    /// The binary succeeded but printed nothing on stdout.
    #[error("{program} printed nothing on stdout")]
    EmptyOutput {
        /// The binary path.
        program: String,
    },
}

/// Run `program args...` and check it answers sensibly.
///
/// Returns the trimmed first line of stdout, typically the version banner.
///
/// # Errors
///
/// Returns a [`SelfTestError`] describing the failure.
pub fn self_test(
    program: &Path,
    args: &[String],
    timeout: Duration,
) -> Result<String, SelfTestError> {
    let name = program.display().to_string();
    debug!(target: "selftest", "running {name} {}", args.join(" "));
    let deadline = Instant::now() + timeout;
    let timed_out = |program: String| SelfTestError::TimedOut { program, timeout };
    let mut child = spawn(program, args).map_err(|source| SelfTestError::Spawn {
        program: name.clone(),
        source,
    })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let waited = child.wait_timeout(timeout).map_err(|source| SelfTestError::Spawn {
        program: name.clone(),
        source,
    })?;
    let Some(status) = waited else {
        if let Err(err) = child.kill() {
            debug!(target: "selftest", "kill failed: {err}");
        }
        if let Err(err) = child.wait() {
            debug!(target: "selftest", "reaping failed: {err}");
        }
        return Err(timed_out(name));
    };

    // A background process spawned by the binary can inherit its pipes and
    // keep them open after the binary itself has exited.
    let Some(out) = collect(stdout, deadline) else {
        return Err(timed_out(name));
    };
    if !status.success() {
        let err = collect(stderr, deadline).unwrap_or_default();
        return Err(SelfTestError::Failed {
            program: name,
            status,
            stderr: err.trim().chars().take(STDERR_EXCERPT_CHARS).collect(),
        });
    }
    let banner = out.lines().find(|line| !line.trim().is_empty()).map(str::trim);
    banner.map(str::to_owned).ok_or(SelfTestError::EmptyOutput { program: name })
}

/// Start the child, retrying briefly while the freshly written binary is
/// still held open for writing by a concurrently forked process.
fn spawn(program: &Path, args: &[String]) -> std::io::Result<Child> {
    let mut attempt = 1;
    loop {
        let result = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        match result {
            Err(err) if err.kind() == ErrorKind::ExecutableFileBusy && attempt < SPAWN_ATTEMPTS => {
                debug!(target: "selftest", "{} busy, retrying", program.display());
                std::thread::sleep(Duration::from_millis(50));
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Read a child pipe to the end on a helper thread so a chatty child can
/// never block on a full pipe while we wait for it.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<String>> {
    pipe.map(|mut reader| {
        let (sender, receiver) = mpsc::channel();
        std::thread::spawn(move || {
            let mut bytes = Vec::new();
            if let Err(err) = reader.read_to_end(&mut bytes) {
                debug!(target: "selftest", "pipe read failed: {err}");
            }
            if sender.send(String::from_utf8_lossy(&bytes).into_owned()).is_err() {
                debug!(target: "selftest", "pipe closed after the deadline");
            }
        });
        receiver
    })
}

/// Wait for a drained pipe until `deadline`; `None` when it is still open.
fn collect(pipe: Option<Receiver<String>>, deadline: Instant) -> Option<String> {
    let Some(receiver) = pipe else {
        return Some(String::new());
    };
    match receiver.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(text) => Some(text),
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => Some(String::new()),
    }
}
