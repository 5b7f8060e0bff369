//! esys-driver - Session and data-coding driver for the E-Sys flashing tool
//!
//! Wraps the vendor batch launcher behind a session state machine
//! (open → authenticate → connect), renders the per-stage config artifacts it
//! consumes, and runs the read → convert → sign → flash pipeline over ECU
//! data sets.

pub mod artifacts;
pub mod config;
pub mod device;
pub mod error;
pub mod files;
pub mod gateway;
pub mod layout;
pub mod logging;
pub mod outcome;
pub mod parameters;
mod pipeline;
pub mod session;
pub mod sweep;

#[cfg(test)]
mod test_support;

pub use config::{DeviceConfig, SessionConfig, Settings};
pub use device::EsysDevice;
pub use error::{EsysError, Result};
pub use outcome::{Outcome, Step, StepFailure};
