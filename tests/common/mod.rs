//! Shared helpers for integration tests: an E-Sys working tree and a shell
//! script standing in for the batch launcher.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use esys_driver::config::DeviceConfig;
use esys_driver::layout::Layout;

pub const BATTERY_FWL: &str = "\
; Battery coding
AccRunningModeActivateSupress:SensData_G70[255]
BatteryType:Typ[AGM]
";

/// Create templates, the TAL filter and default data sets under `project`
pub fn write_tree(project: &Path) -> Layout {
    let layout = Layout::new(project.join("Esys"), project.join("Reports"));
    layout.ensure_directories().unwrap();

    fs::write(
        layout.master_config(),
        "[CONFIG]\nPROJECT = x\nVEHICLEINFO = x\nCONNECTION = x\nTAL = x\nFA = x\nVIN = x\n",
    )
    .unwrap();
    for path in [
        layout.fwl_config(),
        layout.ncd_config(),
        layout.tal_ncd_config(),
    ] {
        fs::write(path, "[CONFIG]\n").unwrap();
    }
    fs::write(layout.tal_filter(), "<TalFilter/>").unwrap();
    fs::write(
        layout.default_data_sets_dir().join("Battery.fwl"),
        BATTERY_FWL,
    )
    .unwrap();
    layout
}

pub fn device_config(project: &Path, tool: &Path, local: bool) -> DeviceConfig {
    let map: HashMap<String, String> = [
        ("configdir", "Esys".to_string()),
        ("logdir", "Reports".to_string()),
        ("localdatasets", local.to_string()),
        ("esysbatch", tool.to_string_lossy().to_string()),
        ("project", "G070_TSG".to_string()),
        ("vin", "BMWTEST111H123456".to_string()),
        ("btld", "00008FE2".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    DeviceConfig::from_map(&map)
        .unwrap()
        .with_project_root(project)
}

#[cfg(unix)]
pub mod launcher {
    use super::*;
    use once_cell::sync::Lazy;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    const SCRIPT: &str = r#"#!/bin/sh
# Stand-in for the E-Sys batch launcher
case "$*" in
  *fail*) echo "$* rejected" >&2; exit 3 ;;
  *slow*) sleep 5; exit 0 ;;
  *linger*) sleep 8 & echo "Server is running"; exit 0 ;;
esac
case "$1" in
  -startserver) exec sleep 30 ;;
esac
case "$2" in
  -check) echo "Server is running" ;;
  -readsvt|-readfa) echo "<SVT/>" > "$6" ;;
  -readNcd) printf 'AccRunningModeActivateSupress:SensData_G70[255]\n' > "$7/Battery.fwl" ;;
  *) echo "ok $*" ;;
esac
exit 0
"#;

    /// Written once per test binary, before any test spawns from it
    static LAUNCHER_DIR: Lazy<TempDir> = Lazy::new(|| {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("E-Sys.sh");
        fs::write(&path, SCRIPT).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        dir
    });

    pub fn path() -> PathBuf {
        LAUNCHER_DIR.path().join("E-Sys.sh")
    }
}
