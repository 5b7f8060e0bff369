//! Gateway implementation that runs the real E-Sys launcher.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use super::{CapturedOutput, CommandOutcome, Directive, EsysTool, GatewayError, ServerProcess};
use crate::config::{DeviceConfig, SessionConfig};
use crate::layout::Layout;

/// Interval between exit checks while waiting on a command
const WAIT_POLL: Duration = Duration::from_millis(20);

/// How long captured output keeps being collected after the process is gone.
/// A grandchild that inherited the pipe can hold it open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Kills and reaps the child when dropped, whatever path left the scope
struct ProcessGuard {
    child: Child,
    reaped: bool,
}

impl ProcessGuard {
    fn new(child: Child) -> Self {
        Self {
            child,
            reaped: false,
        }
    }

    /// Block until exit, or `None` once `timeout` has passed
    fn wait_timeout(&mut self, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.child.try_wait()? {
                self.reaped = true;
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(WAIT_POLL);
        }
    }

    fn terminate(&mut self) {
        if !self.reaped {
            let _ = self.child.kill();
            let _ = self.child.wait();
            self.reaped = true;
        }
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Forward a pipe chunk by chunk; the reader thread outlives the call when
/// something else keeps the pipe open
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<Vec<u8>>> {
    pipe.map(|mut pipe| {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match pipe.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        rx
    })
}

/// Gather whatever arrives before the pipe closes or `deadline` passes
fn collect(rx: Option<Receiver<Vec<u8>>>, deadline: Instant) -> String {
    let Some(rx) = rx else {
        return String::new();
    };
    let mut buf = Vec::new();
    while let Ok(chunk) = rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        buf.extend_from_slice(&chunk);
    }
    String::from_utf8_lossy(&buf).trim().to_string()
}

/// Quote one word for `sh -c`
fn shell_quote(word: &str) -> String {
    if !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=".contains(c))
    {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

/// Real implementation invoking the batch launcher
pub struct SystemTool {
    program: PathBuf,
    log_path: PathBuf,
    /// Route status checks through the platform shell
    server_shell: bool,
    timeout: Duration,
    /// Budget for captured status checks
    check_timeout: Duration,
}

impl SystemTool {
    pub fn new(program: impl Into<PathBuf>, log_path: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            log_path: log_path.into(),
            server_shell: false,
            timeout: SessionConfig::default().command_timeout(),
            check_timeout: SessionConfig::default().check_timeout(),
        }
    }

    pub fn from_config(config: &DeviceConfig, layout: &Layout, session: &SessionConfig) -> Self {
        Self::new(config.resolve_tool_path(), layout.session_log())
            .with_server_shell(config.server_shell)
            .with_timeout(session.command_timeout())
            .with_check_timeout(session.check_timeout())
    }

    pub fn with_server_shell(mut self, server_shell: bool) -> Self {
        self.server_shell = server_shell;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Open the session log for appending; history is never truncated
    fn open_log(&self) -> std::io::Result<File> {
        if let Some(parent) = self.log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
    }

    /// Open the log, write the invocation header and split it into stdout/stderr
    fn log_streams(&self, args: &[String]) -> std::io::Result<(Stdio, Stdio)> {
        let mut log = self.open_log()?;
        writeln!(log, ">> {} {}", self.program.display(), args.join(" "))?;
        let stderr = log.try_clone()?;
        Ok((Stdio::from(log), Stdio::from(stderr)))
    }

    fn spawn_error(&self, err: &std::io::Error) -> String {
        if err.kind() == std::io::ErrorKind::NotFound {
            GatewayError::ToolNotFound(self.program.clone()).to_string()
        } else {
            format!("failed to spawn {}: {err}", self.program.display())
        }
    }

    fn shell_command(&self, args: &[String]) -> Command {
        if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(&self.program).args(args);
            cmd
        } else {
            let line = std::iter::once(self.program.to_string_lossy().to_string())
                .chain(args.iter().cloned())
                .map(|w| shell_quote(&w))
                .collect::<Vec<_>>()
                .join(" ");
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(line);
            cmd
        }
    }

    fn detached_command(&self) -> Command {
        let args = Directive::StartServer.args();
        if cfg!(windows) {
            // `start` treats the first quoted argument as the window title
            let mut cmd = Command::new("cmd.exe");
            cmd.args(["/c", "start", ""]).arg(&self.program).args(args);
            cmd
        } else {
            let mut cmd = Command::new(&self.program);
            cmd.args(args);
            cmd
        }
    }
}

impl EsysTool for SystemTool {
    #[instrument(skip_all, fields(program = %self.program.display()))]
    fn spawn_server(&self) -> Result<Box<dyn ServerProcess>, GatewayError> {
        let args = Directive::StartServer.args();
        let (stdout, stderr) =
            self.log_streams(&args)
                .map_err(|source| GatewayError::LogUnavailable {
                    path: self.log_path.clone(),
                    source,
                })?;

        let child = self
            .detached_command()
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    GatewayError::ToolNotFound(self.program.clone())
                } else {
                    GatewayError::SpawnFailed(e.to_string())
                }
            })?;

        debug!(pid = child.id(), "E-Sys server process spawned");
        Ok(Box::new(child))
    }

    #[instrument(skip_all, fields(directive = directive.name()))]
    fn run(&self, directive: &Directive) -> CommandOutcome {
        let args = directive.args();
        debug!(?args, "Running E-Sys command");

        let (stdout, stderr) = match self.log_streams(&args) {
            Ok(streams) => streams,
            Err(e) => {
                return CommandOutcome::transport_error(format!(
                    "cannot open session log {}: {e}",
                    self.log_path.display()
                ))
            }
        };

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn();
        let mut guard = match child {
            Ok(child) => ProcessGuard::new(child),
            Err(e) => return CommandOutcome::transport_error(self.spawn_error(&e)),
        };

        match guard.wait_timeout(self.timeout) {
            Ok(Some(status)) => {
                let outcome = CommandOutcome::exited(status.code());
                if !outcome.success {
                    debug!(code = ?status.code(), "E-Sys command failed");
                }
                outcome
            }
            Ok(None) => {
                warn!(timeout_secs = self.timeout.as_secs(), "E-Sys command timed out");
                guard.terminate();
                CommandOutcome::timed_out(self.timeout)
            }
            Err(e) => CommandOutcome::transport_error(e.to_string()),
        }
    }

    #[instrument(skip_all, fields(directive = directive.name()))]
    fn run_captured(&self, directive: &Directive) -> CapturedOutput {
        let args = directive.args();
        let mut cmd = if self.server_shell {
            self.shell_command(&args)
        } else {
            let mut cmd = Command::new(&self.program);
            cmd.args(&args);
            cmd
        };

        let child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let mut guard = match child {
            Ok(child) => ProcessGuard::new(child),
            Err(e) => {
                return CapturedOutput {
                    success: false,
                    output: self.spawn_error(&e),
                }
            }
        };

        let stdout = drain(guard.child.stdout.take());
        let stderr = drain(guard.child.stderr.take());

        let status = guard.wait_timeout(self.check_timeout);
        if !matches!(status, Ok(Some(_))) {
            guard.terminate();
        }
        let drained_by = Instant::now() + DRAIN_GRACE;
        let stdout = collect(stdout, drained_by);
        let stderr = collect(stderr, drained_by);

        match status {
            Ok(Some(status)) if status.success() => CapturedOutput {
                success: true,
                output: stdout,
            },
            Ok(Some(_)) => CapturedOutput {
                success: false,
                output: if stderr.is_empty() { stdout } else { stderr },
            },
            Ok(None) => CapturedOutput {
                success: false,
                output: format!("{stdout}timed out after {:?}", self.check_timeout),
            },
            Err(e) => CapturedOutput {
                success: false,
                output: format!("{stdout}{e}"),
            },
        }
    }
}
