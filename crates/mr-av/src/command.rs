//! Builder for executing external tool commands with timeout support.
//!
//! Arguments are always passed to the child as an explicit vector; nothing is
//! ever routed through a shell. Only the trailing `max_stderr_bytes` of
//! standard error is retained, and a child that outlives its timeout, its
//! cancellation token, or the future driving it is killed.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{ChildStderr, Command};
use tokio_util::sync::CancellationToken;

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default retained stderr tail: 8 KiB.
const DEFAULT_MAX_STDERR: usize = 8 * 1024;

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Exit code, `None` when the process was ended by a signal.
    pub exit_code: Option<i32>,
    /// Trailing portion of standard error (lossy UTF-8).
    pub stderr: String,
    /// Whether earlier stderr output was discarded to respect the bound.
    pub stderr_truncated: bool,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Ways an invocation can fail before producing an exit status.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{program} was cancelled")]
    Cancelled { program: String },

    #[error("I/O error waiting for {program}: {source}")]
    Wait {
        program: String,
        source: std::io::Error,
    },
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use mr_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> Result<(), mr_av::CommandError> {
/// let output = ToolCommand::new(PathBuf::from("ffmpeg"))
///     .args(["-hide_banner", "-i", "/tmp/in", "/tmp/out.mp4"])
///     .execute()
///     .await?;
/// println!("exit={:?} stderr={}", output.exit_code, output.stderr);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    max_stderr_bytes: usize,
    cancel: Option<CancellationToken>,
}

enum Finish {
    Exited(std::io::Result<std::process::ExitStatus>, Vec<u8>, bool),
    TimedOut,
    Cancelled,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            max_stderr_bytes: DEFAULT_MAX_STDERR,
            cancel: None,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    /// Set how many trailing stderr bytes are retained.
    pub fn max_stderr_bytes(&mut self, n: usize) -> &mut Self {
        self.max_stderr_bytes = n;
        self
    }

    /// Kill the child as soon as `token` is cancelled.
    pub fn cancel_on(&mut self, token: CancellationToken) -> &mut Self {
        self.cancel = Some(token);
        self
    }

    /// The argument vector as it will be handed to the child.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Execute the command and wait for it to exit.
    ///
    /// A non-zero exit is *not* an error here; callers inspect
    /// [`ToolOutput::exit_code`].
    ///
    /// # Errors
    ///
    /// - [`CommandError::Spawn`] if the process cannot be started.
    /// - [`CommandError::Timeout`] if it outlives the timeout (it is killed).
    /// - [`CommandError::Cancelled`] if the token fires first (it is killed).
    /// - [`CommandError::Wait`] if waiting on the process fails.
    pub async fn execute(&self) -> Result<ToolOutput, CommandError> {
        let program_name = self
            .program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string());

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
            program: program_name.clone(),
            source,
        })?;

        let stderr = child.stderr.take();
        let cap = self.max_stderr_bytes;

        let finish = tokio::select! {
            (status, (tail, truncated)) = async {
                tokio::join!(child.wait(), read_tail(stderr, cap))
            } => Finish::Exited(status, tail, truncated),
            _ = tokio::time::sleep(self.timeout) => Finish::TimedOut,
            _ = cancelled(self.cancel.as_ref()) => Finish::Cancelled,
        };

        match finish {
            Finish::Exited(Ok(status), tail, truncated) => Ok(ToolOutput {
                exit_code: status.code(),
                stderr: String::from_utf8_lossy(&tail).to_string(),
                stderr_truncated: truncated,
            }),
            Finish::Exited(Err(source), _, _) => Err(CommandError::Wait {
                program: program_name,
                source,
            }),
            Finish::TimedOut => {
                terminate(&mut child, &program_name).await;
                Err(CommandError::Timeout {
                    program: program_name,
                    timeout: self.timeout,
                })
            }
            Finish::Cancelled => {
                terminate(&mut child, &program_name).await;
                Err(CommandError::Cancelled {
                    program: program_name,
                })
            }
        }
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Kill and reap the child so no zombie outlives the invocation.
async fn terminate(child: &mut tokio::process::Child, program: &str) {
    if let Err(e) = child.kill().await {
        tracing::warn!("Failed to kill {program}: {e}");
    }
}

/// Drain `stderr`, keeping only the last `cap` bytes.
async fn read_tail(stderr: Option<ChildStderr>, cap: usize) -> (Vec<u8>, bool) {
    let Some(mut stderr) = stderr else {
        return (Vec::new(), false);
    };

    let mut tail = Vec::new();
    let mut truncated = false;
    let mut buf = [0u8; 4096];

    loop {
        match stderr.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > cap {
                    let excess = tail.len() - cap;
                    tail.drain(..excess);
                    truncated = true;
                }
            }
        }
    }

    (tail, truncated)
}
