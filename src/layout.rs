//! Filesystem layout of an E-Sys working tree.
//!
//! ```text
//! <root>/config/{master,fwl,ncd,tal_ecu_ncd}.config
//! <root>/svt/SVT.xml
//! <root>/tal/TAL.xml, tal/TAL_Filter.xml
//! <root>/fa/FA.xml
//! <root>/ncd/{default,datasets,signed,unsigned}/
//! <logdir>/EsysLog.log
//! ```

use std::path::{Path, PathBuf};

use crate::config::DeviceConfig;
use crate::error::{EsysError, Result};

pub const SESSION_LOG_NAME: &str = "EsysLog.log";

/// Resolved paths of one device's working tree
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
    log_dir: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            log_dir: log_dir.into(),
        }
    }

    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(config.root_path(), config.log_path())
    }

    /// Create the working directories that the tool writes into
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            self.log_dir.clone(),
            self.config_dir(),
            self.svt_dir(),
            self.tal_dir(),
            self.fa_dir(),
            self.default_data_sets_dir(),
            self.data_sets_dir(),
            self.signed_dir(),
            self.unsigned_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| EsysError::io(&dir, e))?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn session_log(&self) -> PathBuf {
        self.log_dir.join(SESSION_LOG_NAME)
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn master_config(&self) -> PathBuf {
        self.config_dir().join("master.config")
    }

    pub fn fwl_config(&self) -> PathBuf {
        self.config_dir().join("fwl.config")
    }

    pub fn ncd_config(&self) -> PathBuf {
        self.config_dir().join("ncd.config")
    }

    pub fn tal_ncd_config(&self) -> PathBuf {
        self.config_dir().join("tal_ecu_ncd.config")
    }

    pub fn svt_dir(&self) -> PathBuf {
        self.root.join("svt")
    }

    pub fn svt_file(&self) -> PathBuf {
        self.svt_dir().join("SVT.xml")
    }

    pub fn tal_dir(&self) -> PathBuf {
        self.root.join("tal")
    }

    pub fn tal_file(&self) -> PathBuf {
        self.tal_dir().join("TAL.xml")
    }

    pub fn tal_filter(&self) -> PathBuf {
        self.tal_dir().join("TAL_Filter.xml")
    }

    pub fn fa_dir(&self) -> PathBuf {
        self.root.join("fa")
    }

    pub fn fa_file(&self) -> PathBuf {
        self.fa_dir().join("FA.xml")
    }

    pub fn ncd_dir(&self) -> PathBuf {
        self.root.join("ncd")
    }

    pub fn default_data_sets_dir(&self) -> PathBuf {
        self.ncd_dir().join("default")
    }

    pub fn data_sets_dir(&self) -> PathBuf {
        self.ncd_dir().join("datasets")
    }

    pub fn signed_dir(&self) -> PathBuf {
        self.ncd_dir().join("signed")
    }

    /// Signed NCDs land in a per-VIN sub-directory
    pub fn signed_vin_dir(&self, vin: &str) -> PathBuf {
        self.signed_dir().join(vin)
    }

    pub fn unsigned_dir(&self) -> PathBuf {
        self.ncd_dir().join("unsigned")
    }

    pub fn cert_request_file(&self) -> PathBuf {
        self.root.join("cert").join("request.txt")
    }
}

/// Render a path with forward slashes, the form the tool's configs expect
pub fn slash_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
