//! End-to-end tests of the public device API
//!
//! The local data-set workflow needs no launcher at all; the ECU round-trip
//! runs against the shell-script launcher (unix only).

mod common;

use std::fs;

use esys_driver::config::{SessionConfig, Settings};
use esys_driver::device::EsysDevice;
use esys_driver::error::EsysError;
use tempfile::TempDir;

fn session_config() -> SessionConfig {
    SessionConfig {
        shell_process_name: None,
        ..SessionConfig::default()
    }
}

#[test]
fn test_local_data_set_scenario() {
    let temp_dir = TempDir::new().unwrap();
    let layout = common::write_tree(temp_dir.path());
    let config = common::device_config(
        temp_dir.path(),
        &temp_dir.path().join("no-launcher"),
        true,
    );

    let mut device = EsysDevice::new(config, &session_config()).unwrap();
    device.initialize().unwrap();

    assert_eq!(
        device.get_parameter("AccRunningModeActivateSupress").unwrap(),
        "255"
    );
    device
        .set_parameter("AccRunningModeActivateSupress", "0")
        .unwrap();

    let content = fs::read_to_string(layout.data_sets_dir().join("Battery.fwl")).unwrap();
    assert_eq!(
        content,
        "; Battery coding\nAccRunningModeActivateSupress:SensData_G70[0]\nBatteryType:Typ[AGM]\n"
    );
    assert!(!device.is_fresh());

    // Restoring brings the defaults back
    assert!(device.restore_data_sets().unwrap().is_success());
    assert_eq!(
        device.get_parameter("AccRunningModeActivateSupress").unwrap(),
        "255"
    );

    // No launcher invocation happened
    assert!(!layout.session_log().exists());
}

#[test]
fn test_unchanged_upload_is_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let layout = common::write_tree(temp_dir.path());
    let config = common::device_config(
        temp_dir.path(),
        &temp_dir.path().join("no-launcher"),
        true,
    );

    let mut device = EsysDevice::new(config, &session_config()).unwrap();
    assert!(device.upload_data_sets(true).unwrap().is_success());
    assert!(!layout.session_log().exists());
}

#[test]
fn test_missing_tal_filter_rejects_device() {
    let temp_dir = TempDir::new().unwrap();
    let layout = common::write_tree(temp_dir.path());
    fs::remove_file(layout.tal_filter()).unwrap();
    let config = common::device_config(temp_dir.path(), &temp_dir.path().join("x"), true);

    assert!(matches!(
        EsysDevice::new(config, &session_config()),
        Err(EsysError::FileNotFound(path)) if path == layout.tal_filter()
    ));
}

#[test]
fn test_device_from_settings_file() {
    let temp_dir = TempDir::new().unwrap();
    let layout = common::write_tree(temp_dir.path());

    let text = format!(
        r#"
project_root = '{root}'

[device]
configdir = "Esys"
logdir = "Reports"
localdatasets = "true"
esysbatch = "E-Sys.bat"
VIN = "BMWTEST111H123456"

[session]
poll_attempts = 5
"#,
        root = temp_dir.path().display()
    );
    let settings: Settings = toml::from_str(&text).unwrap();
    assert_eq!(settings.session.poll_attempts, 5);
    assert_eq!(settings.session.poll_interval_ms, 100);

    let device = EsysDevice::from_settings(&settings).unwrap();
    assert_eq!(device.layout().root(), layout.root());
    assert_eq!(device.config().vin.as_deref(), Some("BMWTEST111H123456"));
}

#[test]
fn test_settings_without_mandatory_key_fail() {
    let settings: Settings = toml::from_str(
        r#"
[device]
configdir = "Esys"
logdir = "Reports"
localdatasets = "true"
"#,
    )
    .unwrap();

    assert!(matches!(
        settings.device_config(),
        Err(EsysError::MissingConfigKey("esysbatch"))
    ));
}

#[cfg(unix)]
#[test]
fn test_ecu_round_trip_with_launcher() {
    let temp_dir = TempDir::new().unwrap();
    let layout = common::write_tree(temp_dir.path());
    let config = common::device_config(temp_dir.path(), &common::launcher::path(), false);

    let mut device = EsysDevice::new(config, &session_config()).unwrap();
    device.initialize().unwrap();

    assert_eq!(
        device.get_parameter("AccRunningModeActivateSupress").unwrap(),
        "255"
    );
    assert!(!device.session().is_open());
    assert!(layout.svt_file().exists());

    let log = fs::read_to_string(layout.session_log()).unwrap();
    for directive in [
        "-startserver",
        "-openconnection",
        "-readsvt",
        "-readNcd",
        "-closeconnection",
        "-stop",
    ] {
        assert!(log.contains(directive), "missing {directive} in session log");
    }
}
