//! Shared fixtures for unit tests.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use crate::config::{DeviceConfig, SessionConfig};
use crate::layout::Layout;

pub const BATTERY_RECORD: &str = "AccRunningModeActivateSupress:SensData_G70[255]";

const MASTER_TEMPLATE: &str = "\
[CONFIG]
PROJECT = TEMPLATE
VEHICLEINFO = TEMPLATE
CONNECTION = TEMPLATE
BUS_NAME = TEMPLATE
INTERFACE = TEMPLATE
URL = TEMPLATE
TAL = TEMPLATE
FA = TEMPLATE
VIN = TEMPLATE
";

const STAGE_TEMPLATE: &str = "[CONFIG]\nFA = TEMPLATE\n";

/// A temporary project with a complete E-Sys working tree
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let fixture = Self {
            dir: TempDir::new().unwrap(),
        };
        let layout = fixture.layout();
        layout.ensure_directories().unwrap();

        fs::write(layout.master_config(), MASTER_TEMPLATE).unwrap();
        for path in [
            layout.fwl_config(),
            layout.ncd_config(),
            layout.tal_ncd_config(),
        ] {
            fs::write(path, STAGE_TEMPLATE).unwrap();
        }
        fs::write(layout.tal_filter(), "<TalFilter/>").unwrap();
        fs::write(
            layout.default_data_sets_dir().join("Battery.fwl"),
            format!("; Battery\n{BATTERY_RECORD}\nBatteryType:Typ[AGM]\n"),
        )
        .unwrap();
        fs::write(layout.default_data_sets_dir().join("README.md"), "docs").unwrap();
        fixture
    }

    pub fn project_root(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn layout(&self) -> Layout {
        Layout::new(
            self.dir.path().join("Esys"),
            self.dir.path().join("Reports"),
        )
    }

    /// Minimal valid config for this tree; `extra` pairs override defaults
    pub fn device_config(&self, extra: &[(&str, &str)]) -> DeviceConfig {
        let mut map: HashMap<String, String> = [
            ("configdir", "Esys"),
            ("logdir", "Reports"),
            ("localdatasets", "true"),
            ("esysbatch", "/opt/esys/E-Sys.sh"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (key, value) in extra {
            map.insert(key.to_string(), value.to_string());
        }
        DeviceConfig::from_map(&map)
            .unwrap()
            .with_project_root(self.project_root())
    }

    /// Session settings with instant polling and no process sweeping
    pub fn session_config() -> SessionConfig {
        SessionConfig {
            poll_interval_ms: 0,
            shell_process_name: None,
            ..SessionConfig::default()
        }
    }
}
