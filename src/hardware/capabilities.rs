//! Atomic Hardware Capabilities
//!
//! This module defines fine-grained capability traits that simulated instruments
//! implement. Instead of one trait per instrument, each device exposes the specific
//! capabilities it supports:
//!
//! - The monochromator implements: `Movable + Readable + SpectrumSource + Settable`
//! - Each beam steering axis implements: `Movable`
//! - The multimeter implements: `Readable + Settable`
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//! - Focuses on ONE thing
//!
//! # Example
//!
//! ```rust,ignore
//! // Generic scan over any movable with any detector
//! async fn line_scan<M, R>(axis: &M, detector: &R, points: &[f64]) -> Result<Vec<f64>>
//! where
//!     M: Movable,
//!     R: Readable,
//! {
//!     let mut readings = Vec::with_capacity(points.len());
//!     for &p in points {
//!         axis.move_abs(p).await?;
//!         axis.wait_settled().await?;
//!         readings.push(detector.read().await?);
//!     }
//!     Ok(readings)
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;

/// Capability: Motion Control
///
/// Devices that can move to positions (monochromator wavelength, steering actuators).
///
/// # Contract
/// - Positions are in device-native units (nm for the monochromator)
/// - `move_abs` and `move_rel` initiate motion but may return before completion
/// - `wait_settled` blocks until motion completes
/// - `position` returns current position (may be approximate during motion)
///
/// # Thread Safety
/// - All methods are async and require `&self` (immutable reference)
/// - Interior mutability (Mutex/RwLock) should be used for state
#[async_trait]
pub trait Movable: Send + Sync {
    /// Move to absolute position
    ///
    /// # Returns
    /// - Ok(()) if motion initiated successfully
    /// - Err if position is out of range
    async fn move_abs(&self, position: f64) -> Result<()>;

    /// Move relative to current position
    ///
    /// # Returns
    /// - Ok(()) if motion initiated successfully
    /// - Err if the device rejects the move
    async fn move_rel(&self, distance: f64) -> Result<()>;

    /// Get current position
    ///
    /// May be approximate if device is currently moving.
    async fn position(&self) -> Result<f64>;

    /// Wait for motion to settle
    ///
    /// Should have internal timeout to prevent infinite blocking.
    ///
    /// # Returns
    /// - Ok(()) when settled
    /// - Err on timeout
    async fn wait_settled(&self) -> Result<()>;

    /// Stop motion immediately
    ///
    /// # Default Implementation
    /// Returns an error indicating stop is not supported.
    async fn stop(&self) -> Result<()> {
        anyhow::bail!("Stop not supported by this device")
    }

    /// Move to the device's reference position
    ///
    /// # Default Implementation
    /// Returns an error indicating homing is not supported.
    async fn home(&self) -> Result<()> {
        anyhow::bail!("Home not supported by this device")
    }
}

/// Capability: Scalar Readout
///
/// Devices that produce single scalar values (photodiode behind a monochromator,
/// voltmeters, a single detector pixel).
///
/// # Contract
/// - `read()` performs measurement and returns value
/// - Units are device-specific (document in implementation)
#[async_trait]
pub trait Readable: Send + Sync {
    /// Read current value
    async fn read(&self) -> Result<f64>;
}

/// Capability: Spectrum Acquisition
///
/// Devices with a dispersive element and a linear detector.
///
/// # Contract
/// - `wavelength_axis()` and `acquire_spectrum()` return vectors of equal length
/// - Acquisition never waits for motion; spectra taken mid-move reflect the
///   instantaneous central wavelength
#[async_trait]
pub trait SpectrumSource: Send + Sync {
    /// Wavelength of each detector pixel, in nm
    async fn wavelength_axis(&self) -> Result<Vec<f64>>;

    /// Intensity of each detector pixel
    async fn acquire_spectrum(&self) -> Result<Vec<f64>>;

    /// Number of detector pixels
    fn pixel_count(&self) -> usize;
}

/// Capability: Settable (Configurable Parameters)
///
/// Devices that have parameters which can be set and optionally queried.
///
/// # Contract
/// - `set_value()` sets the parameter to a new value.
/// - `get_value()` queries the current value of the parameter.
/// - Values are represented as `serde_json::Value` to allow flexibility (f64, i64, bool, string, enum).
/// - Methods take `&self` (not `&mut self`) to allow use with `Arc<dyn Settable>`.
///   Implementations should use interior mutability (e.g., `RwLock`) for state changes.
#[async_trait]
pub trait Settable: Send + Sync {
    /// Set a named parameter to a new value.
    async fn set_value(&self, name: &str, value: serde_json::Value) -> Result<()>;

    /// Get the current value of a named parameter.
    async fn get_value(&self, name: &str) -> Result<serde_json::Value> {
        anyhow::bail!("Get value for '{}' not supported by this device", name)
    }

    /// Names accepted by `set_value` / `get_value`.
    fn parameter_names(&self) -> &'static [&'static str] {
        &[]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Mock implementations for testing

    struct MockStage {
        position: std::sync::Mutex<f64>,
    }

    #[async_trait]
    impl Movable for MockStage {
        async fn move_abs(&self, position: f64) -> Result<()> {
            *self.position.lock().unwrap() = position;
            Ok(())
        }

        async fn move_rel(&self, distance: f64) -> Result<()> {
            *self.position.lock().unwrap() += distance;
            Ok(())
        }

        async fn position(&self) -> Result<f64> {
            Ok(*self.position.lock().unwrap())
        }

        async fn wait_settled(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_movable_trait() {
        let stage = MockStage {
            position: std::sync::Mutex::new(0.0),
        };

        stage.move_abs(10.0).await.unwrap();
        assert_eq!(stage.position().await.unwrap(), 10.0);

        stage.move_rel(5.0).await.unwrap();
        assert_eq!(stage.position().await.unwrap(), 15.0);

        stage.wait_settled().await.unwrap();
    }

    #[tokio::test]
    async fn test_movable_defaults_bail() {
        let stage = MockStage {
            position: std::sync::Mutex::new(0.0),
        };
        assert!(stage.stop().await.is_err());
        let err = stage.home().await.unwrap_err();
        assert!(err.to_string().contains("Home not supported"));
    }

    struct FixedSettings;

    #[async_trait]
    impl Settable for FixedSettings {
        async fn set_value(&self, name: &str, _value: serde_json::Value) -> Result<()> {
            anyhow::bail!("unknown parameter '{name}'")
        }
    }

    #[tokio::test]
    async fn test_settable_default_get_bails() {
        let s = FixedSettings;
        assert!(s.get_value("gain").await.is_err());
        assert!(s.parameter_names().is_empty());
    }
}
