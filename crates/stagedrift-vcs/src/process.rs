use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use stagedrift_core::DriftError;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Captured result of one external tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Exit status of the child.
    pub status: ExitStatus,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

impl ToolOutput {
    /// Returns `true` if the tool exited with status 0.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// A one-line failure description: trimmed stderr, or the exit status.
    pub fn failure_detail(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("exited with {}", self.status)
        } else {
            stderr.to_string()
        }
    }
}

/// Run `program args..` in `cwd`, capturing its output.
///
/// The working directory is always explicit; nothing depends on the
/// process-wide current directory. With a `timeout`, the child is polled
/// and killed once the deadline passes.
///
/// # Errors
///
/// Returns [`DriftError::Io`] if the program cannot be spawned, or
/// [`DriftError::ExternalToolTimeout`] if it outlives `timeout`.
/// A non-zero exit is not an error here; check [`ToolOutput::success`].
pub fn run_tool(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Option<Duration>,
) -> Result<ToolOutput, DriftError> {
    debug!(program, ?args, cwd = %cwd.display(), "running external tool");

    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match timeout {
        None => child.wait()?,
        Some(limit) => {
            let started = Instant::now();
            loop {
                if let Some(status) = child.try_wait()? {
                    break status;
                }
                if started.elapsed() >= limit {
                    if let Err(e) = child.kill() {
                        warn!(program, error = %e, "failed to kill timed out tool");
                    }
                    // reap; readers are left to finish on their own
                    let _ = child.wait();
                    return Err(DriftError::ExternalToolTimeout {
                        tool: program.to_string(),
                        timeout_secs: limit.as_secs(),
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    };

    Ok(ToolOutput {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    let bytes = handle.and_then(|h| h.join().ok()).unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}
