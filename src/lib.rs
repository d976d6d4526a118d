//! # Rust DAQ Teaching Instruments
//!
//! Simulated laboratory instruments for exercising a data-acquisition stack without
//! hardware: a scanning spectrometer with first-order wavelength settling and
//! synthetic spectra, a beam steering rig with a 2D detector, and a Keithley 2110
//! multimeter.
//!
//! ## Crate Structure
//!
//! - **`hardware`**: Capability traits, the simulators, their async adapters and the
//!   `DeviceRegistry` used to open and close them.
//! - **`config`**: Figment-based configuration (`config/sim.toml` + `RUST_DAQ_` env).
//! - **`logging`**: `tracing-subscriber` initialization.
//! - **`measurement_types`**: Serializable 0D/1D/2D measurement records.
//! - **`error`**: The `DaqError` enum shared by every module.

pub mod config;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod measurement_types;

pub use error::{AppResult, DaqError};
