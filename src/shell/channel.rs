//! Subprocess query channel.
//!
//! Runs one query per client process. Credentials and the query are written to the
//! client's stdin as a script, never passed on the command line where they would be
//! visible in the process table.

use crate::db::Connection;
use crate::error::{ConnectorError, Result};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::framing::FramingPolicy;

/// Default client program.
pub const DEFAULT_PROGRAM: &str = "beeline";

/// Directive that opens a session in the client script.
pub const CONNECT_DIRECTIVE: &str = "!connect";

/// Directive that ends the client session.
pub const QUIT_DIRECTIVE: &str = "!quit";

/// Settings for the shell client process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellSettings {
    /// Client executable, resolved through `PATH`.
    pub program: String,

    /// Fixed invocation flags.
    pub args: Vec<String>,

    /// Banner lines stripped from the front of the output.
    pub banner_lines: usize,

    /// Prompt lines stripped from the end of the output.
    pub footer_lines: usize,

    /// Optional deadline in milliseconds; the process is killed when it expires.
    pub timeout_ms: Option<u64>,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            args: vec!["--silent=true".to_string(), "--outputformat=csv2".to_string()],
            banner_lines: FramingPolicy::BEELINE.leading_lines,
            footer_lines: FramingPolicy::BEELINE.trailing_lines,
            timeout_ms: None,
        }
    }
}

impl ShellSettings {
    /// Creates settings for an arbitrary program with no flags and default framing.
    pub fn for_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            ..Self::default()
        }
    }

    /// Sets the invocation flags.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the framing policy.
    pub fn with_framing(mut self, framing: FramingPolicy) -> Self {
        self.banner_lines = framing.leading_lines;
        self.footer_lines = framing.trailing_lines;
        self
    }

    /// Sets the process deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn framing(&self) -> FramingPolicy {
        FramingPolicy::new(self.banner_lines, self.footer_lines)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Renders the stdin script: connect, principal, secret, query, quit.
pub(crate) fn render_script(query: &str, connection: &Connection) -> String {
    format!(
        "{CONNECT_DIRECTIVE} {}\n{}\n{}\n{}\n{QUIT_DIRECTIVE}\n",
        connection.endpoint(),
        connection.principal(),
        connection.secret().expose_secret(),
        query
    )
}

/// How a client process run ended before its output was collected.
enum Interrupt {
    Cancelled,
    Deadline(Duration),
}

/// Spawns the shell client and collects its raw output.
#[derive(Debug, Clone)]
pub struct ShellChannel {
    settings: ShellSettings,
}

impl ShellChannel {
    pub fn new(settings: ShellSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ShellSettings {
        &self.settings
    }

    /// Runs `query` in a fresh client process and returns its unframed stdout.
    ///
    /// Fails with `BackendUnavailable` if the process cannot start or exits
    /// non-zero, `Cancelled` if `cancel` fires, and `Timeout` if the configured
    /// deadline passes. Interrupted processes are killed and reaped before returning.
    pub async fn execute(
        &self,
        query: &str,
        connection: &Connection,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let program = &self.settings.program;
        debug!(program = %program, "Spawning shell client");

        let mut child = Command::new(program)
            .args(&self.settings.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ConnectorError::backend_unavailable(format!("Failed to start `{program}`: {e}"))
            })?;

        // Drain both pipes while the script is written so the client never blocks on output.
        let mut stdout_task = spawn_reader(child.stdout.take());
        let mut stderr_task = spawn_reader(child.stderr.take());
        let stdin_task = tokio::spawn(write_script(
            child.stdin.take(),
            render_script(query, connection),
        ));

        // Output collection is raced too: a descendant may hold the pipes after the client exits.
        let deadline = self.settings.timeout();
        let finished = {
            let finished = async {
                let status = child.wait().await;
                let stdout = collect(&mut stdout_task, program).await;
                let stderr = collect(&mut stderr_task, program).await;
                (status, stdout, stderr)
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Interrupt::Cancelled),
                _ = sleep_or_forever(deadline) => {
                    Err(Interrupt::Deadline(deadline.unwrap_or_default()))
                }
                done = finished => Ok(done),
            }
        };

        let (status, stdout, stderr) = match finished {
            Ok(done) => done,
            Err(interrupt) => {
                terminate(&mut child, program).await;
                stdin_task.abort();
                stdout_task.abort();
                stderr_task.abort();
                return Err(match interrupt {
                    Interrupt::Cancelled => ConnectorError::Cancelled,
                    Interrupt::Deadline(limit) => ConnectorError::timeout(format!(
                        "`{program}` did not finish within {} ms",
                        limit.as_millis()
                    )),
                });
            }
        };

        let status = status.map_err(|e| {
            ConnectorError::backend_unavailable(format!("Failed to wait for `{program}`: {e}"))
        })?;
        let stdout = stdout?;
        let stderr = stderr?;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(ConnectorError::backend_unavailable(format!(
                "`{program}` exited with {status}: {}",
                connection.redact(stderr.trim())
            )));
        }

        debug!(program = %program, bytes = stdout.len(), "Shell client finished");

        String::from_utf8(stdout).map_err(|e| {
            ConnectorError::decode(
                format!("`{program}` output is not valid UTF-8"),
                Some(e.utf8_error().valid_up_to() as u64),
            )
        })
    }
}

fn spawn_reader<R>(pipe: Option<R>) -> JoinHandle<std::io::Result<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf).await?;
        }
        Ok(buf)
    })
}

async fn collect(
    task: &mut JoinHandle<std::io::Result<Vec<u8>>>,
    program: &str,
) -> Result<Vec<u8>> {
    task.await
        .map_err(|e| {
            ConnectorError::internal(format!("Output reader for `{program}` failed: {e}"))
        })?
        .map_err(|e| {
            ConnectorError::backend_unavailable(format!("Failed to read `{program}` output: {e}"))
        })
}

/// Writes the script and closes stdin. A client that exits early is judged by its
/// exit status, so write failures are only logged.
async fn write_script(stdin: Option<ChildStdin>, script: String) {
    let Some(mut stdin) = stdin else {
        return;
    };
    if let Err(e) = stdin.write_all(script.as_bytes()).await {
        debug!("Shell client closed stdin early: {}", e.kind());
        return;
    }
    if let Err(e) = stdin.shutdown().await {
        debug!("Failed to close shell client stdin: {}", e.kind());
    }
}

async fn sleep_or_forever(deadline: Option<Duration>) {
    match deadline {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending::<()>().await,
    }
}

async fn terminate(child: &mut Child, program: &str) {
    // kill() also reaps the process.
    if let Err(e) = child.kill().await {
        warn!(program = %program, "Failed to kill shell client: {}", e);
    }
}
