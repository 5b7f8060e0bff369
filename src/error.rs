//! Error types for the E-Sys driver.
//!
//! Only unrecoverable conditions are errors: invalid configuration, missing
//! precondition files, data-set problems and I/O. A command that ran but
//! reported failure is an [`Outcome`](crate::outcome::Outcome), not an error.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by device construction, precondition checks and the
/// parameter store
#[derive(Error, Debug)]
pub enum EsysError {
    #[error("invalid device configuration: {0}")]
    InvalidConfig(String),

    #[error("device configuration is missing mandatory key '{0}'")]
    MissingConfigKey(&'static str),

    #[error("device configuration key '{0}' is required for this operation")]
    MissingSetting(&'static str),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("no *.fwl data set files found in {0}")]
    NoDataSets(PathBuf),

    #[error("parameter '{0}' not found in any data set")]
    ParameterNotFound(String),

    #[error("malformed parameter record in {file} line {line}: {content}")]
    MalformedParameter {
        file: PathBuf,
        line: usize,
        content: String,
    },

    #[error("failed to download data sets from ECU: {0}")]
    DataSetReadFailed(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EsysError {
    /// Wrap an I/O error with the path it occurred on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is a missing-precondition failure
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::FileNotFound(_) | Self::MissingSetting(_))
    }
}

pub type Result<T, E = EsysError> = std::result::Result<T, E>;
