//! Session state machine for one E-Sys server.
//!
//! States run `Closed → Open → Connected → Authenticated`, with `Imported`
//! tracked alongside. Every transition is a no-op when its flag is already
//! set, so callers may repeat them freely. The detached server handle is
//! owned here and released only after it has been terminated.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use backon::{BlockingRetryable, ConstantBuilder};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{EsysError, Result};
use crate::files::{remove_files, XML_SUFFIX};
use crate::gateway::{Directive, EsysTool, ServerProcess};
use crate::layout::Layout;
use crate::outcome::{Outcome, Step};
use crate::sweep::ProcessSweeper;

pub struct Session {
    tool: Arc<dyn EsysTool>,
    sweeper: Arc<dyn ProcessSweeper>,
    layout: Layout,
    poll_attempts: u32,
    poll_interval: Duration,
    server: Option<Box<dyn ServerProcess>>,
    open: bool,
    connected: bool,
    authenticated: bool,
    /// Project name of the last successful PDX import
    imported: Option<String>,
}

impl Session {
    pub fn new(
        tool: Arc<dyn EsysTool>,
        sweeper: Arc<dyn ProcessSweeper>,
        layout: Layout,
        settings: &SessionConfig,
    ) -> Self {
        Self {
            tool,
            sweeper,
            layout,
            poll_attempts: settings.poll_attempts.max(1),
            poll_interval: settings.poll_interval(),
            server: None,
            open: false,
            connected: false,
            authenticated: false,
            imported: None,
        }
    }

    pub fn tool(&self) -> &dyn EsysTool {
        self.tool.as_ref()
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn is_imported(&self) -> bool {
        self.imported.is_some()
    }

    pub fn imported_project(&self) -> Option<&str> {
        self.imported.as_deref()
    }

    pub fn mark_imported(&mut self, project: impl Into<String>) {
        self.imported = Some(project.into());
    }

    pub fn server_pid(&self) -> Option<u32> {
        self.server.as_ref().map(|s| s.pid())
    }

    /// Run one synchronous command and translate its result for `step`
    pub fn run(&self, step: Step, directive: &Directive) -> Outcome {
        let result = self.tool.run(directive);
        if !result.success {
            warn!(
                %step,
                directive = directive.name(),
                reason = %result.describe(),
                "E-Sys command failed"
            );
        }
        Outcome::from_command(step, &result)
    }

    /// Close the session, then hand back `err`
    pub fn fail<T>(&mut self, err: EsysError) -> Result<T> {
        warn!(error = %err, "Precondition failed, closing session");
        let _ = self.close();
        Err(err)
    }

    /// Pass `result` through, closing the session first on a precondition error
    pub fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        match result {
            Err(err) if err.is_precondition() => self.fail(err),
            other => other,
        }
    }

    /// Require `path` to be a file, closing the session otherwise
    pub fn require_file(&mut self, path: &Path) -> Result<()> {
        if path.is_file() {
            return Ok(());
        }
        self.fail(EsysError::FileNotFound(path.to_path_buf()))
    }

    /// Poll the status check until the server reports running
    fn wait_for_server(&self) -> bool {
        let tool = Arc::clone(&self.tool);
        let check = || {
            let status = tool.run_captured(&Directive::CheckServer);
            if status.reports_running() {
                Ok(())
            } else {
                Err(status.output)
            }
        };

        let backoff = ConstantBuilder::default()
            .with_delay(self.poll_interval)
            .with_max_times(self.poll_attempts as usize - 1);

        check
            .retry(backoff)
            .sleep(std::thread::sleep)
            .notify(|output: &String, delay: Duration| {
                debug!(
                    status = %output,
                    delay_ms = delay.as_millis() as u64,
                    "E-Sys server not ready yet"
                );
            })
            .call()
            .is_ok()
    }

    /// Start the detached server and wait for it to come up
    pub fn open(&mut self) -> Outcome {
        if self.open {
            return Outcome::success();
        }

        info!("Starting E-Sys server");
        match self.tool.spawn_server() {
            Ok(server) => {
                debug!(pid = server.pid(), "E-Sys server handle acquired");
                self.server = Some(server);
            }
            Err(e) => {
                warn!(error = %e, "Could not start E-Sys server");
                return Outcome::failed(Step::Open, e.to_string());
            }
        }

        if !self.wait_for_server() {
            warn!(
                attempts = self.poll_attempts,
                "E-Sys server did not come up, closing"
            );
            let _ = self.close();
            return Outcome::failed(
                Step::Open,
                format!("server not running after {} status checks", self.poll_attempts),
            );
        }

        self.open = true;
        info!("E-Sys server running");
        Outcome::success()
    }

    /// `open`, retried once when the first attempt fails
    pub fn open_with_retry(&mut self) -> Outcome {
        let outcome = self.open();
        if outcome.is_success() {
            return outcome;
        }
        info!(%outcome, "Retrying E-Sys server start");
        self.open()
    }

    /// Open a connection with the master config, then refresh the SVT.
    ///
    /// The connected flag stays set when the refresh fails; the returned
    /// outcome reports that failure.
    pub fn connect(&mut self) -> Result<Outcome> {
        if self.connected {
            return Ok(Outcome::success());
        }

        let master = self.layout.master_config();
        self.require_file(&master)?;

        let outcome = self.run(Step::Connect, &Directive::OpenConnection { config: master });
        if !outcome.is_success() {
            return Ok(outcome);
        }
        self.connected = true;
        info!("Connected to ECU");

        let refresh = self.refresh_svt()?;
        Ok(outcome.and(refresh))
    }

    fn refresh_svt(&mut self) -> Result<Outcome> {
        remove_files(&self.layout.svt_dir(), XML_SUFFIX)?;

        let svt = self.layout.svt_file();
        let outcome = self.run(
            Step::ReadSvt,
            &Directive::ReadSvt {
                config: self.layout.master_config(),
                out: svt.clone(),
            },
        );
        if outcome.is_success() {
            self.require_file(&svt)?;
        }
        Ok(outcome)
    }

    pub fn authenticate(&mut self) -> Outcome {
        if self.authenticated {
            return Outcome::success();
        }

        let outcome = self.run(Step::Authenticate, &Directive::AuthenticationCoding);
        if outcome.is_success() {
            self.authenticated = true;
            info!("Authenticated against backend");
        }
        outcome
    }

    pub fn disconnect(&mut self) -> Outcome {
        if !self.connected {
            return Outcome::success();
        }

        let outcome = self.run(Step::Disconnect, &Directive::CloseConnection);
        if outcome.is_success() {
            self.connected = false;
            info!("Disconnected from ECU");
        }
        outcome
    }

    /// Open (retried once), authenticate and connect.
    ///
    /// Stops at a failed open; later failures are accumulated.
    pub fn prepare(&mut self) -> Result<Outcome> {
        let outcome = self.open_with_retry();
        if !outcome.is_success() {
            return Ok(outcome);
        }
        let outcome = outcome.and(self.authenticate());
        Ok(outcome.and(self.connect()?))
    }

    /// Kill the owned server handle, ignoring errors
    fn release_server(&mut self) {
        if let Some(mut server) = self.server.take() {
            let pid = server.pid();
            match server.terminate() {
                Ok(()) => debug!(pid, "E-Sys server handle terminated"),
                Err(e) => debug!(pid, error = %e, "E-Sys server handle already gone"),
            }
        }
    }

    fn sweep(&self) {
        let report = self.sweeper.sweep();
        if report.total() > 0 {
            info!(?report, "Cleaned up leftover shell processes");
        }
    }

    /// Disconnect, stop the server and clean up every process it left.
    ///
    /// Without an open server no tool command is issued; a handle left by a
    /// failed `open` is still terminated and swept. Every flag is reset
    /// either way.
    pub fn close(&mut self) -> Outcome {
        if !self.open {
            if self.server.is_some() {
                self.release_server();
                self.sweep();
            }
            self.reset_flags();
            return Outcome::success();
        }

        info!("Closing E-Sys session");
        self.open = false;
        let mut outcome = self.disconnect();
        outcome.merge(self.run(Step::StopServer, &Directive::StopServer));

        self.release_server();
        self.sweep();

        self.reset_flags();
        outcome
    }

    fn reset_flags(&mut self) {
        self.connected = false;
        self.authenticated = false;
        self.imported = None;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.open || self.server.is_some() {
            let _ = self.close();
        }
    }
}
