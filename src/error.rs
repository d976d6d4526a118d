//! Custom error types for the simulated instruments.
//!
//! This module defines the primary error type, `DaqError`, used by the instrument
//! controllers, the device registry and the configuration layer. Using the `thiserror`
//! crate, it provides a centralized and consistent way to report failures.
//!
//! ## Error Hierarchy
//!
//! - **`InvalidArgument`**: A controller rejected a value it must signal back to the
//!   caller (negative absolute wavelength, non-positive settling time, malformed
//!   spectral input, unknown setting). Values that a settings panel may legitimately
//!   round-trip (stale grating names, non-positive amplitude) are *not* errors; the
//!   controllers ignore those silently.
//! - **`Configuration`** / **`Figment`**: Semantic and parse errors in `config/sim.toml`.
//! - **`Communication`**: Connection-level failures of the simulated serial devices
//!   (unknown address, already connected, reading while closed).
//! - **`UnknownDevice`**: Registry lookups for ids that were never opened.
//! - **`Instrument`**: Anything else raised by a simulator.
//!
//! By using `#[from]`, `DaqError` converts from figment errors with `?`, and because it
//! implements `std::error::Error` it also flows into `anyhow::Result` at the capability
//! trait boundary.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Primary error type for the simulated instruments.
#[derive(Error, Debug)]
pub enum DaqError {
    /// A value was rejected by a controller and the caller must be told.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration values parsed but failed validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Configuration file or environment could not be extracted.
    #[error("Configuration error: {0}")]
    Figment(#[from] figment::Error),

    /// Simulated connection failure (serial address, open/close state).
    #[error("Communication error: {0}")]
    Communication(String),

    /// No device registered under this id.
    #[error("Unknown device '{0}'")]
    UnknownDevice(String),

    /// Generic simulator failure.
    #[error("Instrument error: {0}")]
    Instrument(String),
}

impl DaqError {
    /// Whether the surrounding adapter can surface this as a status message and carry on.
    ///
    /// Configuration problems require a restart; everything else leaves the controller
    /// in a usable state.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DaqError::Configuration(_) | DaqError::Figment(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_argument_is_recoverable() {
        let err = DaqError::InvalidArgument("negative wavelength".into());
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "Invalid argument: negative wavelength");
    }

    #[test]
    fn configuration_error_is_not_recoverable() {
        let err = DaqError::Configuration("duplicate id".into());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn converts_into_anyhow() {
        fn fails() -> anyhow::Result<()> {
            Err(DaqError::Communication("Invalid Address".into()))?;
            Ok(())
        }
        let err = fails().unwrap_err();
        assert!(err.to_string().contains("Invalid Address"));
        assert!(err.downcast_ref::<DaqError>().is_some());
    }
}
