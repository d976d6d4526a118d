//! Simulated scanning spectrometer.
//!
//! Models a monochromator whose central wavelength is driven by a first-order actuator
//! (see [`SettlingModel`]) and a linear detector behind a selectable grating. Spectra
//! are synthesized as a single Gaussian line plus uniform noise, so the simulator can
//! stand in for real hardware in scans and acquisition tests.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut spectro = Spectrometer::new(SpectrometerConfig::default())?;
//! spectro.command_wavelength(532.0, MoveMode::Absolute)?;
//! let axis = spectro.wavelength_axis(spectro.pixel_count());
//! let intensities = spectro.read_spectrum();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::{AppResult, DaqError};
use crate::hardware::clock::{Clock, SystemClock};
use crate::hardware::motion::{MoveMode, SettlingModel};
use crate::hardware::peak::gauss1d;
use crate::hardware::rng::MockRng;
use crate::measurement_types::SpectrumData;

/// Upper bound applied to the peak amplitude.
pub const MAX_AMPLITUDE: f64 = 100.0;

// =============================================================================
// Grating
// =============================================================================

/// Installed diffraction gratings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Grating {
    /// 300 lines/mm
    #[default]
    G300,
    /// 1200 lines/mm
    G1200,
}

impl Grating {
    /// Every installed grating.
    pub const ALL: [Grating; 2] = [Grating::G300, Grating::G1200];

    /// Detector dispersion in nm per pixel.
    pub fn dispersion_nm_per_px(self) -> f64 {
        match self {
            Grating::G300 => 0.7,
            Grating::G1200 => 0.175,
        }
    }

    /// Name as used in settings ("G300", "G1200").
    pub fn name(self) -> &'static str {
        match self {
            Grating::G300 => "G300",
            Grating::G1200 => "G1200",
        }
    }

    /// Look up a grating by name. Exact match only.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.name() == name)
    }
}

impl fmt::Display for Grating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Static configuration of a simulated spectrometer.
///
/// Loaded from the `[instruments.config]` table of a `spectrometer` entry; every field
/// has a default so an empty table is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrometerConfig {
    /// Detector pixel count
    pub pixel_count: usize,
    /// Central wavelength at power-on, in nm
    pub initial_wavelength_nm: f64,
    /// Target of the reference (home) move, in nm
    pub reference_wavelength_nm: f64,
    /// Residual distance to target after one `tau`
    pub motion_epsilon: f64,
    /// Settling time constant in seconds
    pub tau_s: f64,
    /// Grating selected at power-on
    pub grating: Grating,
    /// Peak height in counts
    pub amplitude: f64,
    /// Upper bound of the uniform noise added to every sample
    pub noise_level: f64,
    /// Width parameter of the Gaussian line, in nm
    pub peak_width_nm: f64,
    /// Wavelength of the synthetic spectral line, in nm
    pub peak_center_nm: f64,
    /// Distance to target below which the async adapter reports a move as settled
    pub settle_tolerance_nm: f64,
    /// Fixed seed for reproducible noise. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for SpectrometerConfig {
    fn default() -> Self {
        Self {
            pixel_count: 256,
            initial_wavelength_nm: 632.0,
            reference_wavelength_nm: 600.0,
            motion_epsilon: 0.01,
            tau_s: 1.0,
            grating: Grating::G300,
            amplitude: 10.0,
            noise_level: 0.1,
            peak_width_nm: 20.0,
            peak_center_nm: 532.0,
            settle_tolerance_nm: 0.1,
            seed: None,
        }
    }
}

impl SpectrometerConfig {
    /// Check the invariants the controller relies on.
    pub fn validate(&self) -> AppResult<()> {
        let positive = [
            ("tau_s", self.tau_s),
            ("motion_epsilon", self.motion_epsilon),
            ("noise_level", self.noise_level),
            ("peak_width_nm", self.peak_width_nm),
            ("settle_tolerance_nm", self.settle_tolerance_nm),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(DaqError::Configuration(format!(
                    "spectrometer {name} must be positive, got {value}"
                )));
            }
        }
        if self.settle_tolerance_nm < self.motion_epsilon {
            return Err(DaqError::Configuration(format!(
                "spectrometer settle_tolerance_nm ({}) must not be below motion_epsilon ({})",
                self.settle_tolerance_nm, self.motion_epsilon
            )));
        }
        if self.pixel_count == 0 {
            return Err(DaqError::Configuration(
                "spectrometer pixel_count must be at least 1".into(),
            ));
        }
        if !(self.amplitude > 0.0 && self.amplitude <= MAX_AMPLITUDE) {
            return Err(DaqError::Configuration(format!(
                "spectrometer amplitude must be in (0, {MAX_AMPLITUDE}], got {}",
                self.amplitude
            )));
        }
        if self.initial_wavelength_nm < 0.0 || self.reference_wavelength_nm < 0.0 {
            return Err(DaqError::Configuration(
                "spectrometer wavelengths must not be negative".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Spectral input/output
// =============================================================================

/// Wavelengths at which to evaluate the spectral response.
#[derive(Debug, Clone, PartialEq)]
pub enum SpectralInput {
    /// One wavelength
    Scalar(f64),
    /// Ordered sequence of wavelengths
    Vector(Vec<f64>),
}

impl From<f64> for SpectralInput {
    fn from(value: f64) -> Self {
        SpectralInput::Scalar(value)
    }
}

impl From<Vec<f64>> for SpectralInput {
    fn from(values: Vec<f64>) -> Self {
        SpectralInput::Vector(values)
    }
}

impl TryFrom<&serde_json::Value> for SpectralInput {
    type Error = DaqError;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(SpectralInput::Scalar)
                .ok_or_else(|| DaqError::InvalidArgument(format!("{n} is not a finite number"))),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_f64().ok_or_else(|| {
                        DaqError::InvalidArgument(format!(
                            "spectral input must contain only numbers, found {item}"
                        ))
                    })
                })
                .collect::<AppResult<Vec<f64>>>()
                .map(SpectralInput::Vector),
            other => Err(DaqError::InvalidArgument(format!(
                "spectral input must be a number or an array of numbers, got {other}"
            ))),
        }
    }
}

/// Result of [`Spectrometer::spectral_response`], shaped like its input.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SpectralResponse {
    /// Response to a single wavelength
    Scalar(f64),
    /// Response to each wavelength in order
    Vector(Vec<f64>),
}

impl SpectralResponse {
    /// Flatten into a vector of intensities.
    pub fn into_vec(self) -> Vec<f64> {
        match self {
            SpectralResponse::Scalar(v) => vec![v],
            SpectralResponse::Vector(v) => v,
        }
    }
}

// =============================================================================
// Spectrometer
// =============================================================================

/// Simulated spectrometer controller.
///
/// Mutating operations take `&mut self`; reads take `&self` and never block. Wrap the
/// controller in a lock to share it (see `MockMonochromator`).
#[derive(Debug)]
pub struct Spectrometer {
    config: SpectrometerConfig,
    grating: Grating,
    motion: SettlingModel,
    amplitude: f64,
    noise_level: f64,
    peak_width: f64,
    peak_center: f64,
    clock: Arc<dyn Clock>,
    rng: MockRng,
}

impl Spectrometer {
    /// Create a spectrometer driven by the system clock.
    ///
    /// # Errors
    /// `Configuration` if `config` fails validation.
    pub fn new(config: SpectrometerConfig) -> AppResult<Self> {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Create a spectrometer reading time from `clock`.
    ///
    /// # Errors
    /// `Configuration` if `config` fails validation.
    pub fn with_clock(config: SpectrometerConfig, clock: Arc<dyn Clock>) -> AppResult<Self> {
        config.validate()?;
        let motion = SettlingModel::at_rest(
            config.initial_wavelength_nm,
            config.tau_s,
            config.motion_epsilon,
        )?;
        Ok(Self {
            grating: config.grating,
            motion,
            amplitude: config.amplitude,
            noise_level: config.noise_level,
            peak_width: config.peak_width_nm,
            peak_center: config.peak_center_nm,
            rng: MockRng::new(config.seed),
            clock,
            config,
        })
    }

    /// Configuration the controller was built from.
    pub fn config(&self) -> &SpectrometerConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Motion
    // -------------------------------------------------------------------------

    /// Start moving the central wavelength.
    ///
    /// In [`MoveMode::Absolute`] `value` is the destination and must be finite and not
    /// negative. In [`MoveMode::Relative`] the destination is the current wavelength
    /// plus `value`; that sum must be finite but is not range-checked, so a large
    /// negative offset may target a negative wavelength.
    ///
    /// # Errors
    /// `InvalidArgument` for a negative or non-finite absolute target, or a non-finite
    /// relative offset. The current move is left untouched.
    pub fn command_wavelength(&mut self, value: f64, mode: MoveMode) -> AppResult<()> {
        let now = self.clock.now();
        let target = match mode {
            MoveMode::Absolute => {
                if !(value >= 0.0 && value.is_finite()) {
                    return Err(DaqError::InvalidArgument(format!(
                        "wavelength must be finite and not negative, got {value} nm"
                    )));
                }
                value
            }
            MoveMode::Relative => {
                let target = self.motion.position_at(now) + value;
                if !(value.is_finite() && target.is_finite()) {
                    return Err(DaqError::InvalidArgument(format!(
                        "relative move must be finite, got {value} nm"
                    )));
                }
                target
            }
        };
        self.motion.start(target, now);
        debug!(
            target_nm = target,
            from_nm = self.motion.start_position(),
            alpha = self.motion.decay_constant(),
            "Spectrometer move commanded"
        );
        Ok(())
    }

    /// True central wavelength right now.
    pub fn current_wavelength(&self) -> f64 {
        self.motion.position_at(self.clock.now())
    }

    /// Destination of the most recent move.
    pub fn target_wavelength(&self) -> f64 {
        self.motion.target()
    }

    /// True from a move command until [`Spectrometer::stop`].
    pub fn is_moving(&self) -> bool {
        self.motion.is_moving()
    }

    /// Decay constant of the most recent move.
    pub fn decay_constant(&self) -> f64 {
        self.motion.decay_constant()
    }

    /// Halt where the actuator is now.
    pub fn stop(&mut self) {
        let now = self.clock.now();
        self.motion.stop(now);
        debug!(at_nm = self.motion.position_at(now), "Spectrometer stopped");
    }

    /// Move to the reference wavelength.
    pub fn find_reference(&mut self) -> AppResult<()> {
        self.command_wavelength(self.config.reference_wavelength_nm, MoveMode::Absolute)
    }

    /// Settling time constant in seconds.
    pub fn tau(&self) -> f64 {
        self.motion.tau()
    }

    /// Change the settling time constant. Takes effect on the move in flight.
    ///
    /// # Errors
    /// `InvalidArgument` if `tau` is not strictly positive.
    pub fn set_tau(&mut self, tau: f64) -> AppResult<()> {
        self.motion.set_tau(tau)
    }

    // -------------------------------------------------------------------------
    // Grating
    // -------------------------------------------------------------------------

    /// Selected grating.
    pub fn grating(&self) -> Grating {
        self.grating
    }

    /// Select a grating by name. Unknown names leave the selection unchanged.
    ///
    /// Returns whether the name was accepted.
    pub fn set_grating(&mut self, name: &str) -> bool {
        match Grating::from_name(name) {
            Some(grating) => {
                self.set_grating_kind(grating);
                true
            }
            None => {
                debug!(name, current = %self.grating, "Ignoring unknown grating");
                false
            }
        }
    }

    /// Select a grating.
    pub fn set_grating_kind(&mut self, grating: Grating) {
        if grating != self.grating {
            debug!(from = %self.grating, to = %grating, "Grating changed");
        }
        self.grating = grating;
    }

    /// Detector pixel count.
    pub fn pixel_count(&self) -> usize {
        self.config.pixel_count
    }

    /// Wavelength of each of `n` pixels, centered on the current wavelength.
    ///
    /// `axis[i] = (i - n/2) * dispersion + current_wavelength()`
    pub fn wavelength_axis(&self, n: usize) -> Vec<f64> {
        let center = self.current_wavelength();
        let dispersion = self.grating.dispersion_nm_per_px();
        let half = n as f64 / 2.0;
        (0..n)
            .map(|i| (i as f64 - half) * dispersion + center)
            .collect()
    }

    // -------------------------------------------------------------------------
    // Peak parameters
    // -------------------------------------------------------------------------

    /// Peak height.
    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    /// Set the peak height, clamped to 100. Non-positive values are ignored.
    pub fn set_amplitude(&mut self, amplitude: f64) -> bool {
        if !(amplitude > 0.0) {
            debug!(amplitude, "Ignoring non-positive amplitude");
            return false;
        }
        self.amplitude = amplitude.min(MAX_AMPLITUDE);
        true
    }

    /// Noise upper bound.
    pub fn noise_level(&self) -> f64 {
        self.noise_level
    }

    /// Set the noise upper bound. Non-positive values are ignored.
    pub fn set_noise_level(&mut self, noise: f64) -> bool {
        if !(noise > 0.0) {
            debug!(noise, "Ignoring non-positive noise level");
            return false;
        }
        self.noise_level = noise;
        true
    }

    /// Line width parameter in nm.
    pub fn peak_width(&self) -> f64 {
        self.peak_width
    }

    /// Set the line width. Non-positive values are ignored.
    pub fn set_peak_width(&mut self, width: f64) -> bool {
        if !(width > 0.0) {
            debug!(width, "Ignoring non-positive peak width");
            return false;
        }
        self.peak_width = width;
        true
    }

    /// Line center in nm.
    pub fn peak_center(&self) -> f64 {
        self.peak_center
    }

    /// Move the synthetic line. Non-finite values are ignored.
    pub fn set_peak_center(&mut self, center: f64) -> bool {
        if !center.is_finite() {
            return false;
        }
        self.peak_center = center;
        true
    }

    // -------------------------------------------------------------------------
    // Acquisition
    // -------------------------------------------------------------------------

    fn noiseless(&self, wavelength: f64) -> f64 {
        self.amplitude * gauss1d(wavelength, self.peak_center, self.peak_width)
    }

    /// Synthetic intensity at each requested wavelength.
    ///
    /// Noise is drawn independently for every sample.
    pub fn spectral_response(&self, input: &SpectralInput) -> SpectralResponse {
        match input {
            SpectralInput::Scalar(w) => {
                SpectralResponse::Scalar(self.noiseless(*w) + self.noise_level * self.rng.next_f64())
            }
            SpectralInput::Vector(ws) => {
                let noise = self.rng.uniform_vec(ws.len());
                SpectralResponse::Vector(
                    ws.iter()
                        .zip(noise)
                        .map(|(w, u)| self.noiseless(*w) + self.noise_level * u)
                        .collect(),
                )
            }
        }
    }

    /// Evaluate the response for a JSON number or array of numbers.
    ///
    /// # Errors
    /// `InvalidArgument` for any other JSON value.
    pub fn spectral_response_json(&self, input: &serde_json::Value) -> AppResult<SpectralResponse> {
        let input = SpectralInput::try_from(input)?;
        Ok(self.spectral_response(&input))
    }

    /// Photodiode reading at the current wavelength.
    pub fn read_single_point(&self) -> f64 {
        match self.spectral_response(&SpectralInput::Scalar(self.current_wavelength())) {
            SpectralResponse::Scalar(v) => v,
            SpectralResponse::Vector(v) => v.first().copied().unwrap_or(0.0),
        }
    }

    /// Detector readout over the full pixel axis. Usable mid-move.
    pub fn read_spectrum(&self) -> Vec<f64> {
        let axis = self.wavelength_axis(self.pixel_count());
        self.spectral_response(&SpectralInput::Vector(axis)).into_vec()
    }

    /// Detector readout together with its wavelength axis.
    pub fn read_spectrum_data(&self, channel: &str) -> SpectrumData {
        let wavelengths_nm = self.wavelength_axis(self.pixel_count());
        let intensities = self
            .spectral_response(&SpectralInput::Vector(wavelengths_nm.clone()))
            .into_vec();
        SpectrumData {
            timestamp: chrono::Utc::now(),
            channel: channel.to_string(),
            unit: "counts".to_string(),
            wavelengths_nm,
            intensities,
            metadata: Some(serde_json::json!({
                "grating": self.grating.name(),
                "dispersion_nm_per_px": self.grating.dispersion_nm_per_px(),
                "moving": self.is_moving(),
            })),
        }
    }
}
