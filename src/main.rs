use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use esys_driver::config::Settings;
use esys_driver::device::EsysDevice;
use esys_driver::logging;
use esys_driver::outcome::Outcome;

#[derive(Parser)]
#[command(name = "esys-driver")]
#[command(about = "Session and data-coding driver for the E-Sys flashing tool")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the master config and deploy default data sets
    Init,

    /// Flash the full TAL, optionally importing a PDX first
    FlashPdx {
        /// PDX container to import before flashing
        #[arg(long)]
        pdx: Option<PathBuf>,

        /// Leave the E-Sys server running afterwards
        #[arg(long)]
        keep_open: bool,
    },

    /// Restore working data sets from defaults or from the ECU
    Restore,

    /// Convert, sign and flash the working data sets
    Upload {
        /// Skip when no parameter changed since the last upload in this run.
        /// Change tracking starts fresh in every process, so on its own this
        /// makes `upload` a no-op; `set --upload` uses it after a change.
        #[arg(long)]
        check_modified: bool,
    },

    /// Print a data-set parameter value
    Get {
        /// Parameter name
        name: String,
    },

    /// Change a data-set parameter value
    Set {
        /// Parameter name
        name: String,

        /// New value
        value: String,

        /// Flash the data sets right away
        #[arg(long)]
        upload: bool,
    },

    /// Write SWL security bindings to the ECU
    WriteCert {
        /// Certificate file
        #[arg(long)]
        cert: PathBuf,

        /// SecOC keys path
        #[arg(long)]
        keys: PathBuf,

        /// SVT file
        #[arg(long)]
        svt: PathBuf,
    },

    /// Generate a certificate signing request for the configured VIN
    Csr {
        /// Output file (default: <configdir>/cert/request.txt)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Read the FA from the ECU
    ReadFa,

    /// Write an example settings file
    DefaultConfig {
        /// Output path (default: esys-driver.toml)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for logging setup)
    let settings = Settings::load(cli.config.as_deref())?;

    if let Commands::DefaultConfig { output } = &cli.command {
        return cmd_default_config(output.clone());
    }

    let device_config = settings
        .device_config()
        .context("Invalid [device] configuration")?;
    let log_dir = device_config.log_path();
    let _logging_handle = logging::init_logging(&settings, Some(&log_dir), cli.debug)?;

    let mut device = EsysDevice::new(device_config, &settings.session)
        .context("Failed to set up E-Sys device")?;
    device
        .set_config(None)
        .context("Failed to render master config")?;

    let result = match cli.command {
        Commands::Init => cmd_init(&mut device),
        Commands::FlashPdx { pdx, keep_open } => device
            .flash_pdx(pdx.as_deref(), !keep_open)
            .map_err(Into::into)
            .and_then(|outcome| report("flash-pdx", outcome)),
        Commands::Restore => device
            .restore_data_sets()
            .map_err(Into::into)
            .and_then(|outcome| report("restore", outcome)),
        Commands::Upload { check_modified } => cmd_upload(&mut device, check_modified),
        Commands::Get { name } => cmd_get(&mut device, &name),
        Commands::Set {
            name,
            value,
            upload,
        } => cmd_set(&mut device, &name, &value, upload),
        Commands::WriteCert { cert, keys, svt } => device
            .write_certificate(&cert, &keys, &svt)
            .map_err(Into::into)
            .and_then(|outcome| report("write-cert", outcome)),
        Commands::Csr { out } => device
            .create_cert_request_file(out.as_deref())
            .map_err(Into::into)
            .and_then(|outcome| report("csr", outcome)),
        Commands::ReadFa => device
            .read_fa()
            .map_err(Into::into)
            .and_then(|outcome| report("read-fa", outcome)),
        Commands::DefaultConfig { .. } => Ok(()),
    };

    let closed = device.close();
    if !closed.is_success() {
        tracing::warn!(%closed, "E-Sys session did not close cleanly");
    }
    result
}

/// Print the outcome, failing the process when a step failed
fn report(operation: &str, outcome: Outcome) -> Result<()> {
    if outcome.is_success() {
        println!("{operation}: success");
        return Ok(());
    }
    bail!("{operation}: {outcome}")
}

fn cmd_init(device: &mut EsysDevice) -> Result<()> {
    device.initialize()?;
    println!(
        "Initialized E-Sys working tree at {}",
        device.layout().root().display()
    );
    Ok(())
}

fn cmd_upload(device: &mut EsysDevice, check_modified: bool) -> Result<()> {
    let outcome = device.upload_data_sets(check_modified)?;
    report("upload", outcome)
}

fn cmd_get(device: &mut EsysDevice, name: &str) -> Result<()> {
    let value = device.get_parameter(name)?;
    println!("{value}");
    Ok(())
}

fn cmd_set(device: &mut EsysDevice, name: &str, value: &str, upload: bool) -> Result<()> {
    device.set_parameter(name, value)?;
    println!("{name} = {value}");
    if upload {
        let outcome = device.upload_data_sets(true)?;
        report("upload", outcome)?;
    }
    Ok(())
}

fn cmd_default_config(output: Option<PathBuf>) -> Result<()> {
    let path = output.unwrap_or_else(|| PathBuf::from("esys-driver.toml"));
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    Settings::sample().save(&path)?;
    println!("Wrote example settings to {}", path.display());
    Ok(())
}
