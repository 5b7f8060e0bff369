//! The E-Sys device: configuration, session and parameter store behind one
//! public API for automation scripts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::artifacts::ArtifactBuilder;
use crate::config::{DeviceConfig, SessionConfig, Settings};
use crate::error::{EsysError, Result};
use crate::files::{remove_files, XML_SUFFIX};
use crate::gateway::{Directive, EsysTool, SystemTool};
use crate::layout::Layout;
use crate::outcome::{Outcome, Step};
use crate::parameters::ParameterStore;
use crate::session::Session;
use crate::sweep::{ProcessSweeper, SystemSweeper};

/// Prefix of project names created by PDX imports
pub const PROJECT_PREFIX: &str = "NA05";

/// Project name for a PDX container: `NA05_` + file stem, dots replaced
pub fn project_name(pdx: &Path) -> String {
    let stem = pdx
        .file_stem()
        .map(|s| s.to_string_lossy().replace('.', "_"))
        .unwrap_or_default();
    format!("{PROJECT_PREFIX}_{stem}")
}

pub struct EsysDevice {
    pub(crate) config: DeviceConfig,
    pub(crate) layout: Layout,
    pub(crate) session: Session,
    pub(crate) parameters: ParameterStore,
    /// Last flashed data matches the working data sets
    pub(crate) fresh: bool,
}

impl EsysDevice {
    /// Device driving the real launcher
    pub fn new(config: DeviceConfig, settings: &SessionConfig) -> Result<Self> {
        let layout = Layout::from_config(&config);
        let tool = SystemTool::from_config(&config, &layout, settings);
        let sweeper = SystemSweeper::new(settings.shell_process_name.clone());
        Self::with_tool(config, Arc::new(tool), Arc::new(sweeper), settings)
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.device_config()?, &settings.session)
    }

    /// Device with an injected gateway and sweeper
    pub fn with_tool(
        config: DeviceConfig,
        tool: Arc<dyn EsysTool>,
        sweeper: Arc<dyn ProcessSweeper>,
        settings: &SessionConfig,
    ) -> Result<Self> {
        let layout = Layout::from_config(&config);

        let tal_filter = layout.tal_filter();
        if !tal_filter.is_file() {
            return Err(EsysError::FileNotFound(tal_filter));
        }
        layout.ensure_directories()?;

        info!(
            root = %layout.root().display(),
            local_data_sets = config.use_local_data_sets,
            "E-Sys device configured"
        );

        Ok(Self {
            parameters: ParameterStore::new(layout.data_sets_dir()),
            session: Session::new(tool, sweeper, layout.clone(), settings),
            layout,
            config,
            fresh: true,
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Whether the last upload matches the working data sets
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Render the master artifact and, for local data sets, deploy defaults
    pub fn initialize(&mut self) -> Result<()> {
        self.set_config(None)?;
        if self.config.use_local_data_sets {
            self.deploy_default_data_sets()?;
        }
        Ok(())
    }

    /// Replace the device parameters (when given) and regenerate the master
    /// artifact. The working tree roots cannot move on a live device.
    pub fn set_config(&mut self, config: Option<DeviceConfig>) -> Result<PathBuf> {
        if let Some(config) = config {
            if config.root_path() != self.config.root_path()
                || config.log_path() != self.config.log_path()
            {
                return Err(EsysError::InvalidConfig(
                    "configdir and logdir cannot change on a configured device".to_string(),
                ));
            }
            self.config = config;
        }
        self.build(|builder| builder.master())
    }

    /// Render one artifact, closing the session if a precondition is missing
    pub(crate) fn build(
        &mut self,
        render: impl FnOnce(&ArtifactBuilder<'_>) -> Result<PathBuf>,
    ) -> Result<PathBuf> {
        let result = render(&ArtifactBuilder::new(&self.layout, &self.config));
        self.session.guard(result)
    }

    pub fn open(&mut self) -> Outcome {
        self.session.open()
    }

    pub fn connect(&mut self) -> Result<Outcome> {
        self.session.connect()
    }

    pub fn authenticate(&mut self) -> Outcome {
        self.session.authenticate()
    }

    pub fn disconnect(&mut self) -> Outcome {
        self.session.disconnect()
    }

    pub fn close(&mut self) -> Outcome {
        self.session.close()
    }

    /// Write the SWL security bindings to the ECU
    pub fn write_certificate(
        &mut self,
        certificate: &Path,
        keys: &Path,
        svt: &Path,
    ) -> Result<Outcome> {
        let outcome = self.session.prepare()?;
        if !self.session.is_open() {
            return Ok(outcome);
        }

        let directive = Directive::WriteBindings {
            config: self.layout.master_config(),
            certificate: certificate.to_path_buf(),
            keys: keys.to_path_buf(),
            svt: svt.to_path_buf(),
        };
        let outcome = outcome.and(self.session.run(Step::WriteBindings, &directive));
        info!(%outcome, "Certificate write finished");
        Ok(outcome)
    }

    /// Import a PDX container into the E-Sys project `NA05_<stem>`.
    ///
    /// The session remembers the last imported project only. Importing the
    /// same container again is skipped, while a different container replaces
    /// it and runs a fresh import. A failed import is not remembered.
    pub fn import_pdx(&mut self, pdx: &Path) -> Outcome {
        let project = project_name(pdx);
        if self.session.imported_project() == Some(project.as_str()) {
            return Outcome::success();
        }

        let outcome = self.session.run(
            Step::ImportPdx,
            &Directive::PdxImport {
                pdx: pdx.to_path_buf(),
                project: project.clone(),
            },
        );
        if outcome.is_success() {
            info!(%project, "PDX imported");
            self.session.mark_imported(project);
        }
        outcome
    }

    /// Flash the full TAL of the master artifact, optionally importing a
    /// PDX first
    pub fn flash_pdx(&mut self, pdx: Option<&Path>, close_server: bool) -> Result<Outcome> {
        let mut outcome = self.session.prepare()?;
        if !self.session.is_open() {
            return Ok(outcome);
        }

        if let Some(pdx) = pdx {
            let import = self.import_pdx(pdx);
            if !import.is_success() {
                if close_server {
                    let _ = self.session.close();
                }
                return Ok(import);
            }
        }

        outcome.merge(self.session.run(
            Step::FlashPdx,
            &Directive::TalExecution {
                config: self.layout.master_config(),
                ignore_bathaf: true,
            },
        ));
        info!(%outcome, "PDX flashing finished");

        if close_server {
            outcome.merge(self.session.close());
        }
        Ok(outcome)
    }

    /// Generate a certificate signing request for the configured VIN
    pub fn create_cert_request_file(&mut self, out: Option<&Path>) -> Result<Outcome> {
        let vin = match self.config.vin.clone() {
            Some(vin) => vin,
            None => return self.session.fail(EsysError::MissingSetting("vin")),
        };
        let out = out
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.layout.cert_request_file());
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EsysError::io(parent, e))?;
        }

        let outcome = self.session.prepare()?;
        if !self.session.is_open() {
            return Ok(outcome);
        }

        let directive = Directive::GenerateCsr {
            config: self.layout.master_config(),
            out: out.clone(),
            vin,
        };
        let outcome = outcome.and(self.session.run(Step::CertRequest, &directive));
        info!(%outcome, path = %out.display(), "Certificate request finished");
        Ok(outcome)
    }

    /// Refresh `fa/FA.xml` from the ECU
    pub fn read_fa(&mut self) -> Result<Outcome> {
        let outcome = self.session.open_with_retry();
        if !outcome.is_success() {
            return Ok(outcome);
        }
        let outcome = outcome.and(self.session.connect()?);

        remove_files(&self.layout.fa_dir(), XML_SUFFIX)?;
        let fa = self.layout.fa_file();
        let read = self.session.run(
            Step::ReadFa,
            &Directive::ReadFa {
                config: self.layout.master_config(),
                out: fa.clone(),
            },
        );
        if read.is_success() {
            self.session.require_file(&fa)?;
        }
        Ok(outcome.and(read))
    }

    /// Current value of a data-set parameter.
    ///
    /// Without local data sets the working files are re-read from the ECU
    /// first.
    pub fn get_parameter(&mut self, name: &str) -> Result<String> {
        if !self.config.use_local_data_sets {
            self.read_data_sets_from_ecu()?;
        }
        let value = self.parameters.get(name)?;
        info!(parameter = name, %value, "Parameter read");
        Ok(value)
    }

    /// Rewrite a data-set parameter locally; the ECU is untouched until the
    /// next upload
    pub fn set_parameter(&mut self, name: &str, value: &str) -> Result<()> {
        self.fresh = false;
        if !self.config.use_local_data_sets {
            self.read_data_sets_from_ecu()?;
        }
        self.parameters.set(name, value)?;
        Ok(())
    }
}
