//! Async capability adapters for the simulated instruments.
//!
//! The simulators in this crate are plain synchronous state machines. The types here
//! wrap them in `tokio::sync::RwLock` and implement the capability traits, which is
//! the only surface the registry and the CLI talk to.
//!
//! # Available Adapters
//!
//! - `MockMonochromator` - Spectrometer as `Movable + Readable + SpectrumSource + Settable`
//! - `MockBeamSteering` - 0D detector (`Readable`) plus one `Movable` per actuator
//! - `MockMultimeter` - Keithley 2110 as `Readable + Settable`
//!
//! All waiting uses `tokio::time::sleep`, never `std::thread::sleep`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration, Instant};
use tracing::debug;

use crate::error::DaqError;
use crate::hardware::beam_steering::{
    BeamAxis, BeamData, BeamSteeringConfig, BeamSteeringController, DataDim,
};
use crate::hardware::capabilities::{Movable, Readable, Settable, SpectrumSource};
use crate::hardware::clock::{Clock, SystemClock};
use crate::hardware::motion::MoveMode;
use crate::hardware::multimeter::{Keithley2110, MultimeterConfig};
use crate::hardware::spectrometer::{Spectrometer, SpectrometerConfig};
use crate::measurement_types::{DataPoint, ImageData, SpectrumData};

/// Default upper bound on `wait_settled`.
const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between position checks in `wait_settled`.
const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

fn number(name: &str, value: &Value) -> Result<f64, DaqError> {
    value.as_f64().ok_or_else(|| {
        DaqError::InvalidArgument(format!("'{name}' expects a number, got {value}"))
    })
}

fn text<'a>(name: &str, value: &'a Value) -> Result<&'a str, DaqError> {
    value.as_str().ok_or_else(|| {
        DaqError::InvalidArgument(format!("'{name}' expects a string, got {value}"))
    })
}

fn unknown_parameter(name: &str) -> anyhow::Error {
    DaqError::InvalidArgument(format!("unknown parameter '{name}'")).into()
}

// =============================================================================
// MockMonochromator - Spectrometer adapter
// =============================================================================

/// Spectrometer exposed through the capability traits.
///
/// `wait_settled` polls until the wavelength is within the configured settle
/// tolerance of the target. The simulator itself never flags a move as complete.
///
/// # Example
///
/// ```rust,ignore
/// let mono = MockMonochromator::new("mono", SpectrometerConfig::default())?;
/// mono.move_abs(532.0).await?;
/// mono.wait_settled().await?;
/// let spectrum = mono.acquire_spectrum().await?;
/// ```
#[derive(Debug, Clone)]
pub struct MockMonochromator {
    id: String,
    inner: Arc<RwLock<Spectrometer>>,
    pixel_count: usize,
    settle_tolerance: f64,
    settle_timeout: Duration,
}

impl MockMonochromator {
    /// Parameter names accepted by [`Settable`].
    pub const PARAMETERS: &'static [&'static str] = &[
        "grating",
        "amplitude",
        "noise_level",
        "peak_width",
        "peak_center",
        "tau",
    ];

    /// Create an adapter around a spectrometer driven by the system clock.
    pub fn new(id: impl Into<String>, config: SpectrometerConfig) -> Result<Self> {
        Self::with_clock(id, config, SystemClock::shared())
    }

    /// Create an adapter around a spectrometer reading time from `clock`.
    pub fn with_clock(
        id: impl Into<String>,
        config: SpectrometerConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let settle_tolerance = config.settle_tolerance_nm;
        let spectro = Spectrometer::with_clock(config, clock)?;
        Ok(Self {
            id: id.into(),
            pixel_count: spectro.pixel_count(),
            inner: Arc::new(RwLock::new(spectro)),
            settle_tolerance,
            settle_timeout: DEFAULT_SETTLE_TIMEOUT,
        })
    }

    /// Override the `wait_settled` timeout.
    pub fn with_settle_timeout(mut self, timeout: Duration) -> Self {
        self.settle_timeout = timeout;
        self
    }

    /// Device id used for channel names.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Shared handle to the underlying simulator.
    pub fn spectrometer(&self) -> Arc<RwLock<Spectrometer>> {
        Arc::clone(&self.inner)
    }

    /// Whether a move is in progress.
    pub async fn is_moving(&self) -> bool {
        self.inner.read().await.is_moving()
    }

    /// Spectrum with its axis and metadata, as a measurement record.
    pub async fn read_spectrum_data(&self) -> SpectrumData {
        let channel = format!("{}_spectrum", self.id);
        self.inner.read().await.read_spectrum_data(&channel)
    }

    /// Photodiode reading as a measurement record.
    pub async fn read_data_point(&self) -> DataPoint {
        let value = self.inner.read().await.read_single_point();
        DataPoint::now(format!("{}_intensity", self.id), value, "counts")
    }

    /// Evaluate the synthetic response at arbitrary wavelengths.
    pub async fn spectral_response(&self, wavelengths: &Value) -> Result<Value> {
        let response = self.inner.read().await.spectral_response_json(wavelengths)?;
        Ok(serde_json::to_value(response)?)
    }

    async fn command(&self, value: f64, mode: MoveMode) -> Result<()> {
        self.inner.write().await.command_wavelength(value, mode)?;
        debug!(device = %self.id, value, ?mode, "Monochromator move");
        Ok(())
    }
}

#[async_trait]
impl Movable for MockMonochromator {
    async fn move_abs(&self, position: f64) -> Result<()> {
        self.command(position, MoveMode::Absolute).await
    }

    async fn move_rel(&self, distance: f64) -> Result<()> {
        self.command(distance, MoveMode::Relative).await
    }

    async fn position(&self) -> Result<f64> {
        Ok(self.inner.read().await.current_wavelength())
    }

    async fn wait_settled(&self) -> Result<()> {
        let deadline = Instant::now() + self.settle_timeout;
        loop {
            let (moving, gap) = {
                let s = self.inner.read().await;
                (
                    s.is_moving(),
                    (s.current_wavelength() - s.target_wavelength()).abs(),
                )
            };
            if !moving || gap <= self.settle_tolerance {
                debug!(device = %self.id, gap_nm = gap, "Monochromator settled");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(anyhow!(
                    "{}: not settled after {:?} ({gap:.3} nm from target)",
                    self.id,
                    self.settle_timeout
                ));
            }
            sleep(SETTLE_POLL_INTERVAL).await;
        }
    }

    async fn stop(&self) -> Result<()> {
        self.inner.write().await.stop();
        Ok(())
    }

    async fn home(&self) -> Result<()> {
        self.inner.write().await.find_reference()?;
        debug!(device = %self.id, "Monochromator moving to reference");
        Ok(())
    }
}

#[async_trait]
impl Readable for MockMonochromator {
    async fn read(&self) -> Result<f64> {
        Ok(self.inner.read().await.read_single_point())
    }
}

#[async_trait]
impl SpectrumSource for MockMonochromator {
    async fn wavelength_axis(&self) -> Result<Vec<f64>> {
        let s = self.inner.read().await;
        Ok(s.wavelength_axis(s.pixel_count()))
    }

    async fn acquire_spectrum(&self) -> Result<Vec<f64>> {
        Ok(self.inner.read().await.read_spectrum())
    }

    fn pixel_count(&self) -> usize {
        self.pixel_count
    }
}

#[async_trait]
impl Settable for MockMonochromator {
    async fn set_value(&self, name: &str, value: Value) -> Result<()> {
        let mut s = self.inner.write().await;
        let accepted = match name {
            "grating" => s.set_grating(text(name, &value)?),
            "amplitude" => s.set_amplitude(number(name, &value)?),
            "noise_level" => s.set_noise_level(number(name, &value)?),
            "peak_width" => s.set_peak_width(number(name, &value)?),
            "peak_center" => s.set_peak_center(number(name, &value)?),
            "tau" => {
                s.set_tau(number(name, &value)?)?;
                true
            }
            _ => return Err(unknown_parameter(name)),
        };
        if !accepted {
            debug!(device = %self.id, name, %value, "Setting ignored");
        }
        Ok(())
    }

    async fn get_value(&self, name: &str) -> Result<Value> {
        let s = self.inner.read().await;
        Ok(match name {
            "grating" => json!(s.grating().name()),
            "amplitude" => json!(s.amplitude()),
            "noise_level" => json!(s.noise_level()),
            "peak_width" => json!(s.peak_width()),
            "peak_center" => json!(s.peak_center()),
            "tau" => json!(s.tau()),
            _ => return Err(unknown_parameter(name)),
        })
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        Self::PARAMETERS
    }
}

// =============================================================================
// MockBeamSteering - Beam steering adapter
// =============================================================================

/// Beam steering rig exposed through the capability traits.
///
/// The rig itself is `Readable` (detector value at the probe pixel); each actuator
/// is a separate `Movable` obtained with [`MockBeamSteering::axis`].
#[derive(Debug, Clone)]
pub struct MockBeamSteering {
    id: String,
    inner: Arc<RwLock<BeamSteeringController>>,
}

impl MockBeamSteering {
    /// Create an adapter around a new beam steering controller.
    pub fn new(id: impl Into<String>, config: BeamSteeringConfig) -> Result<Self> {
        Ok(Self {
            id: id.into(),
            inner: Arc::new(RwLock::new(BeamSteeringController::new(config)?)),
        })
    }

    /// Device id used for channel names.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Movable handle for one actuator.
    pub fn axis(&self, axis: BeamAxis) -> BeamSteeringAxis {
        BeamSteeringAxis {
            axis,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Acquire a frame reduced to `dim`.
    pub async fn acquire(&self, dim: DataDim) -> BeamData {
        self.inner.write().await.data_output(dim)
    }

    /// Acquire a full frame as a measurement record.
    pub async fn acquire_image(&self) -> ImageData {
        let frame = self.inner.write().await.acquire_frame();
        ImageData::from_rows(format!("{}_frame", self.id), &frame, "counts")
    }
}

#[async_trait]
impl Readable for MockBeamSteering {
    async fn read(&self) -> Result<f64> {
        match self.acquire(DataDim::Data0D).await {
            BeamData::Scalar(v) => Ok(v),
            other => Err(anyhow!("{}: expected a scalar readout, got {other:?}", self.id)),
        }
    }
}

/// One actuator of a [`MockBeamSteering`] rig.
///
/// Moves are instantaneous, so `wait_settled` returns immediately.
#[derive(Debug, Clone)]
pub struct BeamSteeringAxis {
    axis: BeamAxis,
    inner: Arc<RwLock<BeamSteeringController>>,
}

impl BeamSteeringAxis {
    /// Which actuator this handle drives.
    pub fn axis(&self) -> BeamAxis {
        self.axis
    }
}

#[async_trait]
impl Movable for BeamSteeringAxis {
    async fn move_abs(&self, position: f64) -> Result<()> {
        self.inner.write().await.move_abs(self.axis, position);
        Ok(())
    }

    async fn move_rel(&self, distance: f64) -> Result<()> {
        self.inner.write().await.move_rel(self.axis, distance);
        Ok(())
    }

    async fn position(&self) -> Result<f64> {
        Ok(self.inner.read().await.check_position(self.axis))
    }

    async fn wait_settled(&self) -> Result<()> {
        Ok(())
    }

    async fn home(&self) -> Result<()> {
        self.move_abs(0.0).await
    }
}

// =============================================================================
// MockMultimeter - Keithley 2110 adapter
// =============================================================================

/// Keithley 2110 exposed through the capability traits.
///
/// Construction opens the connection on the configured address; [`MockMultimeter::close`]
/// releases it.
#[derive(Debug, Clone)]
pub struct MockMultimeter {
    id: String,
    inner: Arc<RwLock<Keithley2110>>,
}

impl MockMultimeter {
    /// Parameter names accepted by [`Settable`].
    pub const PARAMETERS: &'static [&'static str] = &["function", "range_index"];

    /// Create the meter and open it on `config.address`.
    pub fn new(id: impl Into<String>, config: &MultimeterConfig) -> Result<Self> {
        Ok(Self {
            id: id.into(),
            inner: Arc::new(RwLock::new(Keithley2110::from_config(config)?)),
        })
    }

    /// Device id used for channel names.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Close the connection. Further reads fail.
    pub async fn close(&self) {
        self.inner.write().await.close_communication();
    }

    /// Whether the connection is open.
    pub async fn is_open(&self) -> bool {
        self.inner.read().await.is_open()
    }

    /// Reading as a measurement record.
    pub async fn read_data_point(&self) -> Result<DataPoint> {
        let meter = self.inner.read().await;
        let value = meter.get_reading()?;
        Ok(DataPoint::now(
            format!("{}_reading", self.id),
            value,
            meter.function().unit(),
        ))
    }
}

#[async_trait]
impl Readable for MockMultimeter {
    async fn read(&self) -> Result<f64> {
        Ok(self.inner.read().await.get_reading()?)
    }
}

#[async_trait]
impl Settable for MockMultimeter {
    async fn set_value(&self, name: &str, value: Value) -> Result<()> {
        let mut meter = self.inner.write().await;
        match name {
            "function" => {
                meter.set_function(text(name, &value)?);
            }
            "range_index" => {
                let index = value.as_u64().ok_or_else(|| {
                    DaqError::InvalidArgument(format!(
                        "'range_index' expects a non-negative integer, got {value}"
                    ))
                })?;
                meter.set_range(index as usize)?;
            }
            _ => return Err(unknown_parameter(name)),
        }
        Ok(())
    }

    async fn get_value(&self, name: &str) -> Result<Value> {
        let meter = self.inner.read().await;
        Ok(match name {
            "function" => json!(meter.function().name()),
            "range_index" => json!(meter.range_index()),
            "range" => json!(meter.range()),
            "unit" => json!(meter.function().unit()),
            _ => return Err(unknown_parameter(name)),
        })
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        Self::PARAMETERS
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::clock::ManualClock;

    fn mono() -> (MockMonochromator, ManualClock) {
        let clock = ManualClock::new();
        let config = SpectrometerConfig {
            seed: Some(42),
            ..Default::default()
        };
        let mono = MockMonochromator::with_clock("mono", config, Arc::new(clock.clone()))
            .unwrap()
            .with_settle_timeout(Duration::from_millis(50));
        (mono, clock)
    }

    #[tokio::test]
    async fn test_monochromator_move_and_settle() {
        let (mono, clock) = mono();
        assert_eq!(mono.position().await.unwrap(), 632.0);

        mono.move_abs(532.0).await.unwrap();
        assert!(mono.is_moving().await);

        // Time is frozen, so the move cannot settle
        assert!(mono.wait_settled().await.is_err());

        clock.advance_secs(2.0);
        mono.wait_settled().await.unwrap();
        assert!((mono.position().await.unwrap() - 532.0).abs() <= 0.1);
    }

    #[tokio::test]
    async fn test_monochromator_negative_target() {
        let (mono, _) = mono();
        let err = mono.move_abs(-5.0).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DaqError>(),
            Some(DaqError::InvalidArgument(_))
        ));
        mono.move_rel(-5.0).await.unwrap();
    }

    #[tokio::test]
    async fn test_monochromator_stop_and_home() {
        let (mono, clock) = mono();
        mono.move_abs(700.0).await.unwrap();
        clock.advance_secs(0.1);
        mono.stop().await.unwrap();
        let frozen = mono.position().await.unwrap();
        clock.advance_secs(5.0);
        assert_eq!(mono.position().await.unwrap(), frozen);
        mono.wait_settled().await.unwrap();

        mono.home().await.unwrap();
        clock.advance_secs(5.0);
        assert!((mono.position().await.unwrap() - 600.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_monochromator_settings() {
        let (mono, _) = mono();

        mono.set_value("grating", json!("G1200")).await.unwrap();
        assert_eq!(mono.get_value("grating").await.unwrap(), json!("G1200"));

        // Unknown gratings and non-positive amplitudes are ignored, not errors
        mono.set_value("grating", json!("G9999")).await.unwrap();
        assert_eq!(mono.get_value("grating").await.unwrap(), json!("G1200"));
        mono.set_value("amplitude", json!(-1.0)).await.unwrap();
        assert_eq!(mono.get_value("amplitude").await.unwrap(), json!(10.0));

        assert!(mono.set_value("tau", json!(0.0)).await.is_err());
        assert!(mono.set_value("amplitude", json!("loud")).await.is_err());
        assert!(mono.set_value("gain", json!(1.0)).await.is_err());
        assert!(mono.get_value("gain").await.is_err());
        assert_eq!(mono.parameter_names().len(), 6);
    }

    #[tokio::test]
    async fn test_monochromator_spectrum() {
        let (mono, _) = mono();
        let axis = mono.wavelength_axis().await.unwrap();
        let spectrum = mono.acquire_spectrum().await.unwrap();
        assert_eq!(axis.len(), mono.pixel_count());
        assert_eq!(spectrum.len(), 256);

        let data = mono.read_spectrum_data().await;
        assert_eq!(data.channel, "mono_spectrum");
        assert_eq!(data.metadata.unwrap()["grating"], "G300");

        let single = mono.spectral_response(&json!(532.0)).await.unwrap();
        assert!(single.as_f64().unwrap() >= 10.0);
        assert!(mono.spectral_response(&json!("x")).await.is_err());
    }

    #[tokio::test]
    async fn test_beam_steering_axes_share_state() {
        let rig = MockBeamSteering::new(
            "beam",
            BeamSteeringConfig {
                seed: Some(5),
                ..Default::default()
            },
        )
        .unwrap();
        let h = rig.axis(BeamAxis::H);
        let theta = rig.axis(BeamAxis::Theta);

        h.move_abs(100.0).await.unwrap();
        h.move_rel(-40.0).await.unwrap();
        theta.move_abs(45.0).await.unwrap();
        h.wait_settled().await.unwrap();

        assert_eq!(h.position().await.unwrap(), 60.0);
        assert_eq!(rig.axis(BeamAxis::Theta).position().await.unwrap(), 45.0);
        assert_eq!(rig.axis(BeamAxis::V).position().await.unwrap(), 0.0);

        h.home().await.unwrap();
        assert_eq!(h.position().await.unwrap(), 0.0);

        let v = rig.read().await.unwrap();
        assert!(v >= 10.0, "spot centered on probe should read full height, got {v}");

        let img = rig.acquire_image().await;
        assert_eq!((img.width, img.height), (256, 256));
    }

    #[tokio::test]
    async fn test_multimeter_adapter() {
        let config = MultimeterConfig {
            seed: Some(9),
            ..Default::default()
        };
        let dmm = MockMultimeter::new("dmm", &config).unwrap();
        assert!(dmm.is_open().await);

        dmm.set_value("range_index", json!(3)).await.unwrap();
        let v = dmm.read().await.unwrap();
        assert!((0.0..100.0).contains(&v));

        dmm.set_value("function", json!("curr_dc")).await.unwrap();
        assert_eq!(dmm.get_value("function").await.unwrap(), json!("curr_dc"));
        assert_eq!(dmm.get_value("range").await.unwrap(), json!(1e-4));

        // Unknown functions are ignored
        dmm.set_value("function", json!("ohms")).await.unwrap();
        assert_eq!(dmm.get_value("function").await.unwrap(), json!("curr_dc"));

        assert!(dmm.set_value("range_index", json!(-1)).await.is_err());

        let point = dmm.read_data_point().await.unwrap();
        assert_eq!(point.unit, "A");

        dmm.close().await;
        assert!(dmm.read().await.is_err());
    }
}
