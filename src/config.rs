//! Driver settings and device configuration.
//!
//! [`Settings`] is the layered application configuration (defaults, user
//! file, explicit file, environment). Its `[device]` table is the flat
//! string mapping that [`DeviceConfig`] validates.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::EsysError;

/// Keys every device configuration must carry
pub const MANDATORY_KEYS: [&str; 4] = ["configdir", "logdir", "localdatasets", "esysbatch"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory that `configdir` and `logdir` are relative to (default: cwd)
    #[serde(default)]
    pub project_root: Option<String>,
    /// Flat device mapping, see [`DeviceConfig::from_map`]
    #[serde(default)]
    pub device: BTreeMap<String, String>,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server polling and command execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Status checks issued before `open` gives up (default: 40)
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
    /// Delay between status checks in milliseconds (default: 100)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum seconds a synchronous command may run (default: 3600)
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Maximum seconds a captured status check may run (default: 10)
    #[serde(default = "default_check_timeout")]
    pub check_timeout_secs: u64,
    /// Shell process name swept on close (default: cmd.exe on Windows, none elsewhere)
    #[serde(default = "default_shell_process_name")]
    pub shell_process_name: Option<String>,
}

fn default_poll_attempts() -> u32 {
    40
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_command_timeout() -> u64 {
    3600 // flashing a full TAL can take tens of minutes
}

fn default_check_timeout() -> u64 {
    10
}

fn default_shell_process_name() -> Option<String> {
    if cfg!(windows) {
        Some("cmd.exe".to_string())
    } else {
        None
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_attempts: default_poll_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            command_timeout_secs: default_command_timeout(),
            check_timeout_secs: default_check_timeout(),
            shell_process_name: default_shell_process_name(),
        }
    }
}

impl SessionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to also write driver logs into the device log directory
    #[serde(default)]
    pub to_file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: false,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_root: None,
            device: BTreeMap::new(),
            session: SessionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings, layering defaults, the user config, an explicit file
    /// and `ESYS__` environment variables
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = Settings::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default settings")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        // User config in ~/.config/esys-driver/ (optional global overrides)
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("esys-driver").join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ESYS")
                .separator("__")
                .try_parsing(false),
        );

        let config = builder.build().context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Example settings written by `esys-driver default-config`
    pub fn sample() -> Self {
        let device = [
            ("project", "G070_TSG__01__U012_040_040_042"),
            ("vehicleinfo", "G070_DIRECT"),
            ("connection", "bus"),
            ("busname", "B3_CAN"),
            ("interface", "VECTOR_DIRECT"),
            ("tal", "Config/Devices/Esys/tal/TAL.xml"),
            ("fa", "Config/Devices/Esys/fa/FA.xml"),
            ("vin", "BMWTEST111H123456"),
            ("btld", "00008FE2"),
            ("localdatasets", "true"),
            ("esysbatch", "C:/EC-Apps/E-Sys/E-Sys.bat"),
            ("logdir", "Reports"),
            ("configdir", "Config/Devices/Esys"),
            ("server_shell", "true"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            device,
            ..Self::default()
        }
    }

    /// Save settings as TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create settings directory")?;
            }
        }

        let toml_str =
            toml::to_string_pretty(self).context("Failed to serialize settings to TOML")?;
        std::fs::write(path, toml_str).context("Failed to write settings file")?;
        Ok(())
    }

    /// Absolute project root, relative roots resolved against cwd
    pub fn project_root_path(&self) -> PathBuf {
        let path = PathBuf::from(self.project_root.as_deref().unwrap_or("."));
        if path.is_absolute() {
            path
        } else {
            std::env::current_dir().unwrap_or_default().join(path)
        }
    }

    /// Validate the `[device]` table
    pub fn device_config(&self) -> Result<DeviceConfig, EsysError> {
        let map: HashMap<String, String> = self
            .device
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(DeviceConfig::from_map(&map)?.with_project_root(self.project_root_path()))
    }
}

/// Validated device parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub config_dir: String,
    pub log_dir: String,
    pub use_local_data_sets: bool,
    pub external_tool_path: PathBuf,
    pub project: Option<String>,
    pub vehicle_info: Option<String>,
    pub connection_mode: Option<String>,
    pub bus_name: Option<String>,
    pub interface_name: Option<String>,
    pub url: Option<String>,
    pub tal_file: Option<String>,
    pub fa_file: Option<String>,
    pub vin: Option<String>,
    pub bootloader_id: Option<String>,
    /// Run status polling through the platform shell
    pub server_shell: bool,
    project_root: PathBuf,
}

fn parse_flag(value: Option<&String>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

impl DeviceConfig {
    /// Validate a flat device mapping. Keys are case-insensitive.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, EsysError> {
        let map: HashMap<String, String> = map
            .iter()
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.clone()))
            .collect();

        for key in MANDATORY_KEYS {
            if !map.contains_key(key) {
                return Err(EsysError::MissingConfigKey(key));
            }
        }

        let optional = |key: &str| {
            map.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let external_tool_path = PathBuf::from(map["esysbatch"].trim());
        if external_tool_path.as_os_str().is_empty() {
            return Err(EsysError::InvalidConfig("esysbatch is empty".to_string()));
        }

        Ok(Self {
            config_dir: map["configdir"].trim().to_string(),
            log_dir: map["logdir"].trim().to_string(),
            use_local_data_sets: parse_flag(map.get("localdatasets")),
            external_tool_path,
            project: optional("project"),
            vehicle_info: optional("vehicleinfo"),
            connection_mode: optional("connection"),
            bus_name: optional("busname"),
            interface_name: optional("interface"),
            url: optional("url"),
            tal_file: optional("tal"),
            fa_file: optional("fa"),
            vin: optional("vin"),
            bootloader_id: optional("btld"),
            server_shell: parse_flag(map.get("server_shell")),
            project_root: std::env::current_dir().unwrap_or_default(),
        })
    }

    /// Validate a JSON value; anything but an object of scalars is rejected
    pub fn from_json(value: &serde_json::Value) -> Result<Self, EsysError> {
        let object = value
            .as_object()
            .ok_or_else(|| EsysError::InvalidConfig(format!("expected a mapping, got {value}")))?;

        let mut map = HashMap::with_capacity(object.len());
        for (key, value) in object {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Number(n) => n.to_string(),
                other => {
                    return Err(EsysError::InvalidConfig(format!(
                        "value of '{key}' must be a scalar, got {other}"
                    )))
                }
            };
            map.insert(key.clone(), text);
        }
        Self::from_map(&map)
    }

    /// Resolve `configdir`/`logdir` against `root` instead of cwd
    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Root of the E-Sys working tree (`<project_root>/<configdir>`)
    pub fn root_path(&self) -> PathBuf {
        self.project_root.join(&self.config_dir)
    }

    pub fn log_path(&self) -> PathBuf {
        self.project_root.join(&self.log_dir)
    }

    /// Resolve the batch launcher; bare names are looked up on PATH
    pub fn resolve_tool_path(&self) -> PathBuf {
        let path = &self.external_tool_path;
        if path.components().count() > 1 || path.is_absolute() {
            return path.clone();
        }
        which::which(path).unwrap_or_else(|_| path.clone())
    }
}
