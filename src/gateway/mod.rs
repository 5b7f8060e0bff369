//! Command execution gateway for the E-Sys batch launcher.
//!
//! Provides a trait-based abstraction over tool invocations to enable:
//! - Unit testing without the vendor tool
//! - Recording and scripting tool behavior in tests
//! - A single place that guarantees spawned processes are reaped
//!
//! The gateway never returns an error for a command that could not be run:
//! spawn and I/O failures become a failed [`CommandOutcome`] carrying the
//! error text, so callers treat them like any other negative result.

pub mod system;

#[cfg(test)]
pub(crate) mod mock;

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::layout::slash_path;

pub use system::SystemTool;

/// Status text the tool prints while its server is down
pub const SERVER_NOT_RUNNING: &str = "Server is not running";

/// Errors starting the detached server
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("E-Sys launcher not found at {0}")]
    ToolNotFound(PathBuf),

    #[error("failed to start E-Sys server: {0}")]
    SpawnFailed(String),

    #[error("cannot open session log {path}: {source}")]
    LogUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One invocation of the batch launcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    StartServer,
    CheckServer,
    OpenConnection {
        config: PathBuf,
    },
    CloseConnection,
    StopServer,
    AuthenticationCoding,
    WriteBindings {
        config: PathBuf,
        certificate: PathBuf,
        keys: PathBuf,
        svt: PathBuf,
    },
    PdxImport {
        pdx: PathBuf,
        project: String,
    },
    TalExecution {
        config: PathBuf,
        ignore_bathaf: bool,
    },
    ReadSvt {
        config: PathBuf,
        out: PathBuf,
    },
    ReadFa {
        config: PathBuf,
        out: PathBuf,
    },
    ReadNcd {
        svt: PathBuf,
        config: PathBuf,
        out: PathBuf,
    },
    Fwl2Ncd {
        config: PathBuf,
    },
    SignNcd {
        config: PathBuf,
    },
    GenerateCsr {
        config: PathBuf,
        out: PathBuf,
        vin: String,
    },
}

fn arg(path: &Path) -> String {
    slash_path(path)
}

impl Directive {
    /// Short name used in logs and test assertions
    pub fn name(&self) -> &'static str {
        match self {
            Directive::StartServer => "startserver",
            Directive::CheckServer => "check",
            Directive::OpenConnection { .. } => "openconnection",
            Directive::CloseConnection => "closeconnection",
            Directive::StopServer => "stop",
            Directive::AuthenticationCoding => "authenticationCoding",
            Directive::WriteBindings { .. } => "writeBindings",
            Directive::PdxImport { .. } => "pdximport",
            Directive::TalExecution { .. } => "talexecution",
            Directive::ReadSvt { .. } => "readsvt",
            Directive::ReadFa { .. } => "readfa",
            Directive::ReadNcd { .. } => "readNcd",
            Directive::Fwl2Ncd { .. } => "fwl2Ncd",
            Directive::SignNcd { .. } => "signNcd",
            Directive::GenerateCsr { .. } => "generateCSR",
        }
    }

    /// Command-line arguments passed to the launcher
    pub fn args(&self) -> Vec<String> {
        let server = "-server".to_string();
        match self {
            Directive::StartServer => vec!["-startserver".into()],
            Directive::CheckServer => vec![server, "-check".into()],
            Directive::OpenConnection { config } => {
                vec![server, "-openconnection".into(), arg(config)]
            }
            Directive::CloseConnection => vec![server, "-closeconnection".into()],
            Directive::StopServer => vec![server, "-stop".into()],
            Directive::AuthenticationCoding => vec![
                server,
                "-authenticationCoding".into(),
                "-connection".into(),
                "internet".into(),
                "-useSwlSecCertificate".into(),
            ],
            Directive::WriteBindings {
                config,
                certificate,
                keys,
                svt,
            } => vec![
                server,
                "-writeBindings".into(),
                "-connection".into(),
                arg(config),
                "-in".into(),
                arg(certificate),
                "-secOCKeysPath".into(),
                arg(keys),
                "-svt".into(),
                arg(svt),
            ],
            Directive::PdxImport { pdx, project } => vec![
                "-pdximport".into(),
                arg(pdx),
                "-project".into(),
                project.clone(),
            ],
            Directive::TalExecution {
                config,
                ignore_bathaf,
            } => {
                let mut args = vec![server, "-talexecution".into(), arg(config)];
                if *ignore_bathaf {
                    args.push("-ignoreBATHAF".into());
                }
                args
            }
            Directive::ReadSvt { config, out } => vec![
                server,
                "-readsvt".into(),
                "-connection".into(),
                arg(config),
                "-out".into(),
                arg(out),
            ],
            Directive::ReadFa { config, out } => vec![
                server,
                "-readfa".into(),
                "-connection".into(),
                arg(config),
                "-out".into(),
                arg(out),
            ],
            Directive::ReadNcd { svt, config, out } => vec![
                server,
                "-readNcd".into(),
                arg(svt),
                "-connection".into(),
                arg(config),
                "-out".into(),
                arg(out),
                "-notReadVin".into(),
            ],
            Directive::Fwl2Ncd { config } => vec![server, "-fwl2Ncd".into(), arg(config)],
            Directive::SignNcd { config } => vec![server, "-signNcd".into(), arg(config)],
            Directive::GenerateCsr { config, out, vin } => vec![
                "-generateCSR".into(),
                "-connection".into(),
                arg(config),
                "-out".into(),
                arg(out),
                "-vin".into(),
                vin.clone(),
            ],
        }
    }
}

/// Result of a synchronous invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    /// Transport error text (spawn failure, timeout, log unavailable)
    pub error: Option<String>,
}

impl CommandOutcome {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            error: None,
        }
    }

    pub fn exited(code: Option<i32>) -> Self {
        Self {
            success: code == Some(0),
            exit_code: code,
            error: None,
        }
    }

    pub fn transport_error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: None,
            error: Some(message.into()),
        }
    }

    pub fn timed_out(timeout: Duration) -> Self {
        Self::transport_error(format!("timed out after {}s", timeout.as_secs()))
    }

    /// Human readable failure reason
    pub fn describe(&self) -> String {
        if let Some(error) = &self.error {
            return error.clone();
        }
        match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Result of a captured invocation: success flag and trimmed output text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub success: bool,
    pub output: String,
}

impl CapturedOutput {
    /// Whether this status response reports a running server
    pub fn reports_running(&self) -> bool {
        self.success && !self.output.contains(SERVER_NOT_RUNNING)
    }
}

/// Owned handle to the detached server process
pub trait ServerProcess: Send {
    fn pid(&self) -> u32;

    /// Kill the process and reap it
    fn terminate(&mut self) -> std::io::Result<()>;
}

impl ServerProcess for std::process::Child {
    fn pid(&self) -> u32 {
        self.id()
    }

    fn terminate(&mut self) -> std::io::Result<()> {
        self.kill()?;
        self.wait()?;
        Ok(())
    }
}

/// Trait abstracting E-Sys launcher invocations for testability
pub trait EsysTool: Send + Sync {
    /// Start the server detached and hand back its process handle
    fn spawn_server(&self) -> Result<Box<dyn ServerProcess>, GatewayError>;

    /// Run a directive to completion with output appended to the session log
    fn run(&self, directive: &Directive) -> CommandOutcome;

    /// Run a directive to completion and capture its output text
    fn run_captured(&self, directive: &Directive) -> CapturedOutput;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_directives() {
        assert_eq!(Directive::StartServer.args(), vec!["-startserver"]);
        assert_eq!(Directive::CheckServer.args(), vec!["-server", "-check"]);
        assert_eq!(Directive::StopServer.args(), vec!["-server", "-stop"]);
        assert_eq!(
            Directive::CloseConnection.args(),
            vec!["-server", "-closeconnection"]
        );
        assert_eq!(
            Directive::AuthenticationCoding.args(),
            vec![
                "-server",
                "-authenticationCoding",
                "-connection",
                "internet",
                "-useSwlSecCertificate"
            ]
        );
    }

    #[test]
    fn test_tal_execution_flag() {
        let plain = Directive::TalExecution {
            config: PathBuf::from("/e/config/tal_ecu_ncd.config"),
            ignore_bathaf: false,
        };
        assert_eq!(
            plain.args(),
            vec!["-server", "-talexecution", "/e/config/tal_ecu_ncd.config"]
        );

        let full = Directive::TalExecution {
            config: PathBuf::from("/e/config/master.config"),
            ignore_bathaf: true,
        };
        assert_eq!(full.args().last().unwrap(), "-ignoreBATHAF");
    }

    #[test]
    fn test_read_ncd_directive() {
        let directive = Directive::ReadNcd {
            svt: PathBuf::from("/e/svt/SVT.xml"),
            config: PathBuf::from("/e/config/master.config"),
            out: PathBuf::from("/e/ncd/datasets"),
        };
        assert_eq!(
            directive.args(),
            vec![
                "-server",
                "-readNcd",
                "/e/svt/SVT.xml",
                "-connection",
                "/e/config/master.config",
                "-out",
                "/e/ncd/datasets",
                "-notReadVin"
            ]
        );
    }

    #[test]
    fn test_pdx_import_is_not_a_server_command() {
        let directive = Directive::PdxImport {
            pdx: PathBuf::from("C:\\pdx\\X.1.2.pdx"),
            project: "NA05_X_1_2".into(),
        };
        assert_eq!(
            directive.args(),
            vec!["-pdximport", "C:/pdx/X.1.2.pdx", "-project", "NA05_X_1_2"]
        );
    }

    #[test]
    fn test_write_bindings_and_csr() {
        let bindings = Directive::WriteBindings {
            config: PathBuf::from("/m.config"),
            certificate: PathBuf::from("/cert.txt"),
            keys: PathBuf::from("/keys"),
            svt: PathBuf::from("/svt.xml"),
        };
        assert_eq!(
            bindings.args(),
            vec![
                "-server",
                "-writeBindings",
                "-connection",
                "/m.config",
                "-in",
                "/cert.txt",
                "-secOCKeysPath",
                "/keys",
                "-svt",
                "/svt.xml"
            ]
        );

        let csr = Directive::GenerateCsr {
            config: PathBuf::from("/m.config"),
            out: PathBuf::from("/req.txt"),
            vin: "VIN1".into(),
        };
        assert_eq!(csr.args()[0], "-generateCSR");
        assert_eq!(csr.args().last().unwrap(), "VIN1");
    }

    #[test]
    fn test_command_outcome_describe() {
        assert!(CommandOutcome::succeeded().success);
        assert!(!CommandOutcome::exited(Some(1)).success);
        assert!(CommandOutcome::exited(Some(0)).success);
        assert_eq!(CommandOutcome::exited(None).describe(), "terminated by signal");
        assert_eq!(
            CommandOutcome::timed_out(Duration::from_secs(5)).describe(),
            "timed out after 5s"
        );
        assert_eq!(
            CommandOutcome::transport_error("boom").describe(),
            "boom"
        );
    }

    #[test]
    fn test_captured_output_reports_running() {
        let running = CapturedOutput {
            success: true,
            output: "Server is running".into(),
        };
        assert!(running.reports_running());

        let stopped = CapturedOutput {
            success: true,
            output: "Server is not running".into(),
        };
        assert!(!stopped.reports_running());

        let failed = CapturedOutput {
            success: false,
            output: String::new(),
        };
        assert!(!failed.reports_running());
    }
}
