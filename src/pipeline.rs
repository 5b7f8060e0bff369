//! Data-coding pipeline: restore-or-read, convert, sign, flash.
//!
//! Every stage regenerates its outputs: the artifact is rendered first, the
//! superseded files are deleted, then the tool is asked to produce new ones.

use tracing::{info, warn};

use crate::device::EsysDevice;
use crate::error::{EsysError, Result};
use crate::files::{copy_files, remove_files, FWL_SUFFIX, NCD_SUFFIX};
use crate::gateway::Directive;
use crate::outcome::{Outcome, Step};

impl EsysDevice {
    /// Refresh the working data sets from the defaults or from the ECU.
    ///
    /// A failed ECU read closes the session and is returned as
    /// [`EsysError::DataSetReadFailed`].
    pub fn restore_data_sets(&mut self) -> Result<Outcome> {
        if self.config.use_local_data_sets {
            self.deploy_default_data_sets()?;
        } else {
            self.read_data_sets_from_ecu()?;
        }
        Ok(Outcome::success())
    }

    /// Replace the working `.fwl` files with copies of the defaults
    pub(crate) fn deploy_default_data_sets(&mut self) -> Result<usize> {
        let working = self.layout.data_sets_dir();
        remove_files(&working, FWL_SUFFIX)?;
        let copied = copy_files(&self.layout.default_data_sets_dir(), FWL_SUFFIX, &working)?;
        self.parameters.invalidate();
        info!(copied, "Default data sets deployed");
        Ok(copied)
    }

    /// Download the ECU's current coding into the working directory.
    ///
    /// Runs its own open/connect/close round-trip.
    pub(crate) fn read_data_sets_from_ecu(&mut self) -> Result<()> {
        self.fresh = false;
        self.parameters.invalidate();

        let mut outcome = self.session.open();
        if outcome.is_success() {
            outcome.merge(self.session.connect()?);
        }

        if outcome.is_success() {
            remove_files(&self.layout.data_sets_dir(), FWL_SUFFIX)?;
            outcome = self.session.run(
                Step::ReadDataSets,
                &Directive::ReadNcd {
                    svt: self.layout.svt_file(),
                    config: self.layout.master_config(),
                    out: self.layout.data_sets_dir(),
                },
            );
        }

        if !outcome.is_success() {
            warn!(%outcome, "Reading data sets from ECU failed");
            let _ = self.session.close();
            return Err(EsysError::DataSetReadFailed(outcome.to_string()));
        }

        info!("Data sets read from ECU");
        let _ = self.session.close();
        Ok(())
    }

    /// FWL → unsigned NCD
    pub(crate) fn convert_data_sets(&mut self) -> Result<Outcome> {
        let config = self.build(|builder| builder.fwl())?;
        remove_files(&self.layout.unsigned_dir(), NCD_SUFFIX)?;

        let outcome = self.session.run(Step::Convert, &Directive::Fwl2Ncd { config });
        info!(%outcome, "Data sets converted");
        Ok(outcome)
    }

    /// Unsigned NCD → signed NCD for the configured VIN
    pub(crate) fn sign_data_sets(&mut self) -> Result<Outcome> {
        let config = self.build(|builder| builder.ncd())?;
        let vin = self.build_vin()?;
        remove_files(&self.layout.signed_vin_dir(&vin), NCD_SUFFIX)?;

        let outcome = self.session.run(Step::Sign, &Directive::SignNcd { config });
        info!(%outcome, %vin, "Data sets signed");
        Ok(outcome)
    }

    fn build_vin(&mut self) -> Result<String> {
        match self.config.vin.clone() {
            Some(vin) => Ok(vin),
            None => self.session.fail(EsysError::MissingSetting("vin")),
        }
    }

    /// Convert, sign and flash the working data sets.
    ///
    /// With `check_modified`, nothing runs while the last upload is still
    /// current. ECU-sourced data sets are re-read before the upload.
    pub fn upload_data_sets(&mut self, check_modified: bool) -> Result<Outcome> {
        if check_modified && self.fresh {
            info!("Data sets unchanged since last upload, skipping");
            return Ok(Outcome::success());
        }

        if !self.config.use_local_data_sets {
            self.read_data_sets_from_ecu()?;
        }

        let mut outcome = self.session.prepare()?;
        if !self.session.is_open() {
            return Ok(outcome);
        }

        outcome.merge(self.convert_data_sets()?);
        outcome.merge(self.sign_data_sets()?);

        let config = self.build(|builder| builder.tal_ncd())?;
        outcome.merge(self.session.run(
            Step::FlashDataSets,
            &Directive::TalExecution {
                config,
                ignore_bathaf: false,
            },
        ));

        if outcome.is_success() {
            self.fresh = true;
        }
        info!(%outcome, "Data set upload finished");
        Ok(outcome)
    }
}
