//! Config artifacts consumed by the E-Sys launcher.
//!
//! Each stage owns one `.config` file under `<root>/config/`. The file is a
//! checked-out template: rendering loads it, overwrites the stage's keys in
//! the `[CONFIG]` section and writes the whole document back.

pub mod ini;

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::DeviceConfig;
use crate::error::{EsysError, Result};
use crate::files::{listing_string, FWL_SUFFIX, NCD_SUFFIX};
use crate::layout::{slash_path, Layout};

pub use ini::IniDocument;

/// Section every artifact key lives in
pub const SECTION: &str = "CONFIG";

/// The per-stage artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Master,
    Fwl,
    Ncd,
    TalNcd,
}

impl ArtifactKind {
    pub fn path(self, layout: &Layout) -> PathBuf {
        match self {
            ArtifactKind::Master => layout.master_config(),
            ArtifactKind::Fwl => layout.fwl_config(),
            ArtifactKind::Ncd => layout.ncd_config(),
            ArtifactKind::TalNcd => layout.tal_ncd_config(),
        }
    }
}

/// Renders stage artifacts from device parameters and data-set listings
pub struct ArtifactBuilder<'a> {
    layout: &'a Layout,
    config: &'a DeviceConfig,
}

impl<'a> ArtifactBuilder<'a> {
    pub fn new(layout: &'a Layout, config: &'a DeviceConfig) -> Self {
        Self { layout, config }
    }

    /// FA file handed to the tool: configured path, else `fa/FA.xml`
    pub fn fa(&self) -> String {
        self.config
            .fa_file
            .clone()
            .unwrap_or_else(|| slash_path(&self.layout.fa_file()))
    }

    /// TAL file handed to the tool: configured path, else `tal/TAL.xml`
    pub fn tal(&self) -> String {
        self.config
            .tal_file
            .clone()
            .unwrap_or_else(|| slash_path(&self.layout.tal_file()))
    }

    pub fn vin(&self) -> Result<&'a str> {
        self.config
            .vin
            .as_deref()
            .ok_or(EsysError::MissingSetting("vin"))
    }

    fn bootloader_id(&self) -> Result<&'a str> {
        self.config
            .bootloader_id
            .as_deref()
            .ok_or(EsysError::MissingSetting("btld"))
    }

    fn render(
        &self,
        kind: ArtifactKind,
        apply: impl FnOnce(&mut IniDocument) -> Result<()>,
    ) -> Result<PathBuf> {
        let path = kind.path(self.layout);
        if !path.is_file() {
            return Err(EsysError::FileNotFound(path));
        }

        let mut doc = IniDocument::load(&path)?;
        apply(&mut doc)?;
        doc.save(&path)?;

        debug!(artifact = ?kind, path = %path.display(), "Rendered config artifact");
        Ok(path)
    }

    /// Connection parameters used by every server command
    pub fn master(&self) -> Result<PathBuf> {
        let config = self.config;
        self.render(ArtifactKind::Master, |doc| {
            let optional = [
                ("PROJECT", &config.project),
                ("VEHICLEINFO", &config.vehicle_info),
                ("CONNECTION", &config.connection_mode),
                ("BUS_NAME", &config.bus_name),
                ("INTERFACE", &config.interface_name),
                ("URL", &config.url),
            ];
            for (key, value) in optional {
                if let Some(value) = value {
                    doc.set(SECTION, key, value.as_str());
                }
            }
            doc.set(SECTION, "TAL", self.tal());
            doc.set(SECTION, "FA", self.fa());
            if let Some(vin) = &config.vin {
                doc.set(SECTION, "VIN", vin.as_str());
            }
            Ok(())
        })
    }

    /// FWL → unsigned NCD conversion
    pub fn fwl(&self) -> Result<PathBuf> {
        self.render(ArtifactKind::Fwl, |doc| {
            doc.set(SECTION, "FA", self.fa());
            doc.set(SECTION, "NCD_DIR", slash_path(&self.layout.unsigned_dir()));
            doc.set(
                SECTION,
                "FWL_LIST",
                listing_string(&self.layout.data_sets_dir(), FWL_SUFFIX)?,
            );
            Ok(())
        })
    }

    /// Unsigned NCD signing
    pub fn ncd(&self) -> Result<PathBuf> {
        let vin = self.vin()?;
        let btld = self.bootloader_id()?;
        self.render(ArtifactKind::Ncd, |doc| {
            doc.set(SECTION, "FA", self.fa());
            doc.set(SECTION, "VIN", vin);
            doc.set(SECTION, "SIGNED_NCD_DIR", slash_path(&self.layout.signed_dir()));
            let unsigned = listing_string(&self.layout.unsigned_dir(), NCD_SUFFIX)?;
            doc.set(SECTION, "NCD_LIST_1", format!("{btld};{unsigned}"));
            Ok(())
        })
    }

    /// Flashing of the signed NCDs for the configured VIN
    pub fn tal_ncd(&self) -> Result<PathBuf> {
        let vin = self.vin()?;
        self.render(ArtifactKind::TalNcd, |doc| {
            doc.set(SECTION, "VIN", vin);
            doc.set(SECTION, "FA", self.fa());
            doc.set(SECTION, "SVT", slash_path(&self.layout.svt_file()));
            doc.set(SECTION, "TAL", self.tal());
            doc.set(
                SECTION,
                "NCD_LIST",
                listing_string(&self.layout.signed_vin_dir(vin), NCD_SUFFIX)?,
            );
            doc.set(SECTION, "TAL_FILTER", slash_path(&self.layout.tal_filter()));
            Ok(())
        })
    }
}

/// Read one `[CONFIG]` value back from an artifact on disk
pub fn read_value(path: &Path, key: &str) -> Result<Option<String>> {
    Ok(IniDocument::load(path)?
        .get(SECTION, key)
        .map(str::to_string))
}
