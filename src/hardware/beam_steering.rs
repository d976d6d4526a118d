//! Simulated beam steering rig.
//!
//! Three actuators (`H`, `V`, `Theta`) steer a Gaussian spot across a 2D detector.
//! `H` and `V` translate the spot by `coupling` pixels per actuator unit, `Theta`
//! rotates it (degrees). Actuator moves are instantaneous.
//!
//! Each acquisition renders a fresh noisy frame; when drift is enabled the spot
//! offset creeps by a fixed step per frame, which is what a feedback loop on top of
//! this simulator is supposed to correct.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::{AppResult, DaqError};
use crate::hardware::peak::gauss2d;
use crate::hardware::rng::MockRng;

/// Per-frame offset creep when drift is enabled, in pixels (x, y).
const DRIFT_STEP: (f64, f64) = (0.1, 0.05);

/// Beam steering actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BeamAxis {
    /// Horizontal translation
    H,
    /// Vertical translation
    V,
    /// Rotation of the spot, degrees
    Theta,
}

impl BeamAxis {
    /// All actuators in index order.
    pub const ALL: [BeamAxis; 3] = [BeamAxis::H, BeamAxis::V, BeamAxis::Theta];

    fn index(self) -> usize {
        match self {
            BeamAxis::H => 0,
            BeamAxis::V => 1,
            BeamAxis::Theta => 2,
        }
    }

    /// Axis label.
    pub fn name(self) -> &'static str {
        match self {
            BeamAxis::H => "H",
            BeamAxis::V => "V",
            BeamAxis::Theta => "Theta",
        }
    }

    /// Look up an axis by label.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }
}

impl fmt::Display for BeamAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Direction along which a frame is averaged into a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Integration {
    /// Average over rows, giving one value per column
    #[default]
    Vertical,
    /// Average over columns, giving one value per row
    Horizontal,
}

/// Requested dimensionality of a readout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDim {
    /// Single pixel at the configured probe position
    Data0D,
    /// Frame averaged along one direction
    Data1D(Integration),
    /// Full frame
    Data2D,
}

/// Readout produced by [`BeamSteeringController::data_output`].
#[derive(Debug, Clone, PartialEq)]
pub enum BeamData {
    /// 0D value
    Scalar(f64),
    /// 1D profile
    Profile(Vec<f64>),
    /// 2D frame, indexed `[y][x]`
    Image(Vec<Vec<f64>>),
}

/// Static configuration of the beam steering simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeamSteeringConfig {
    /// Detector width in pixels
    pub nx: usize,
    /// Detector height in pixels
    pub ny: usize,
    /// Spot x position with `H = 0`
    pub offset_x: f64,
    /// Spot y position with `V = 0`
    pub offset_y: f64,
    /// Spot displacement in pixels per actuator unit
    pub coupling: f64,
    /// Spot width along x
    pub width_x: f64,
    /// Spot width along y
    pub width_y: f64,
    /// Spot peak height
    pub amplitude: f64,
    /// Upper bound of the per-pixel uniform noise
    pub noise_level: f64,
    /// Let the spot creep between frames
    pub drift: bool,
    /// Pixel `(x, y)` sampled for 0D readouts
    pub probe: (usize, usize),
    /// Actuator positions at power-on, in `H, V, Theta` order
    pub initial_positions: [f64; 3],
    /// Fixed seed for reproducible noise
    pub seed: Option<u64>,
}

impl Default for BeamSteeringConfig {
    fn default() -> Self {
        Self {
            nx: 256,
            ny: 256,
            offset_x: 128.0,
            offset_y: 128.0,
            coupling: 0.01,
            width_x: 10.0,
            width_y: 50.0,
            amplitude: 10.0,
            noise_level: 0.1,
            drift: false,
            probe: (128, 128),
            initial_positions: [0.0; 3],
            seed: None,
        }
    }
}

impl BeamSteeringConfig {
    /// Check the invariants the controller relies on.
    pub fn validate(&self) -> AppResult<()> {
        if self.nx == 0 || self.ny == 0 {
            return Err(DaqError::Configuration(
                "beam steering detector must be at least 1x1".into(),
            ));
        }
        if self.probe.0 >= self.nx || self.probe.1 >= self.ny {
            return Err(DaqError::Configuration(format!(
                "beam steering probe {:?} lies outside the {}x{} detector",
                self.probe, self.nx, self.ny
            )));
        }
        if !(self.width_x > 0.0 && self.width_y > 0.0) {
            return Err(DaqError::Configuration(
                "beam steering spot widths must be positive".into(),
            ));
        }
        if self.noise_level < 0.0 {
            return Err(DaqError::Configuration(
                "beam steering noise_level must not be negative".into(),
            ));
        }
        Ok(())
    }
}

/// Simulated beam steering controller.
#[derive(Debug)]
pub struct BeamSteeringController {
    config: BeamSteeringConfig,
    positions: [f64; 3],
    offset: (f64, f64),
    rng: MockRng,
}

impl BeamSteeringController {
    /// Build a controller from its configuration.
    ///
    /// # Errors
    /// `Configuration` if `config` fails validation.
    pub fn new(config: BeamSteeringConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self {
            positions: config.initial_positions,
            offset: (config.offset_x, config.offset_y),
            rng: MockRng::new(config.seed),
            config,
        })
    }

    /// Configuration the controller was built from.
    pub fn config(&self) -> &BeamSteeringConfig {
        &self.config
    }

    /// Current position of `axis`.
    pub fn check_position(&self, axis: BeamAxis) -> f64 {
        self.positions[axis.index()]
    }

    /// Move `axis` to `position`.
    pub fn move_abs(&mut self, axis: BeamAxis, position: f64) {
        self.positions[axis.index()] = position;
        debug!(%axis, position, "Beam steering move");
    }

    /// Move `axis` by `delta`.
    pub fn move_rel(&mut self, axis: BeamAxis, delta: f64) {
        let target = self.check_position(axis) + delta;
        self.move_abs(axis, target);
    }

    /// Enable or disable drift between frames.
    pub fn set_drift(&mut self, drift: bool) {
        self.config.drift = drift;
    }

    /// Current spot offset with all actuators at zero.
    pub fn offset(&self) -> (f64, f64) {
        self.offset
    }

    /// Where the spot is centered for the current actuator positions.
    pub fn spot_center(&self) -> (f64, f64) {
        let c = self.config.coupling;
        (
            self.offset.0 + c * self.check_position(BeamAxis::H),
            self.offset.1 + c * self.check_position(BeamAxis::V),
        )
    }

    /// Pixel coordinates along x.
    pub fn x_axis(&self) -> Vec<f64> {
        (0..self.config.nx).map(|i| i as f64).collect()
    }

    /// Pixel coordinates along y.
    pub fn y_axis(&self) -> Vec<f64> {
        (0..self.config.ny).map(|i| i as f64).collect()
    }

    /// Render a new frame, indexed `[y][x]`, applying drift first if enabled.
    pub fn acquire_frame(&mut self) -> Vec<Vec<f64>> {
        if self.config.drift {
            self.offset.0 += DRIFT_STEP.0;
            self.offset.1 += DRIFT_STEP.1;
        }
        let (x0, y0) = self.spot_center();
        let spot = gauss2d(
            &self.x_axis(),
            x0,
            self.config.width_x,
            &self.y_axis(),
            y0,
            self.config.width_y,
            self.check_position(BeamAxis::Theta),
        );
        let amp = self.config.amplitude;
        let noise = self.config.noise_level;
        spot.into_iter()
            .map(|row| {
                let u = self.rng.uniform_vec(row.len());
                row.into_iter()
                    .zip(u)
                    .map(|(g, u)| amp * g + noise * u)
                    .collect()
            })
            .collect()
    }

    /// Render a frame and reduce it to the requested dimensionality.
    pub fn data_output(&mut self, dim: DataDim) -> BeamData {
        let frame = self.acquire_frame();
        reduce(frame, dim, self.config.probe)
    }
}

fn reduce(frame: Vec<Vec<f64>>, dim: DataDim, probe: (usize, usize)) -> BeamData {
    match dim {
        DataDim::Data0D => {
            let (x, y) = probe;
            BeamData::Scalar(frame.get(y).and_then(|row| row.get(x)).copied().unwrap_or(0.0))
        }
        DataDim::Data1D(Integration::Vertical) => {
            let rows = frame.len().max(1) as f64;
            let width = frame.first().map_or(0, Vec::len);
            let mut profile = vec![0.0; width];
            for row in &frame {
                for (acc, v) in profile.iter_mut().zip(row) {
                    *acc += v;
                }
            }
            BeamData::Profile(profile.into_iter().map(|s| s / rows).collect())
        }
        DataDim::Data1D(Integration::Horizontal) => BeamData::Profile(
            frame
                .iter()
                .map(|row| row.iter().sum::<f64>() / row.len().max(1) as f64)
                .collect(),
        ),
        DataDim::Data2D => BeamData::Image(frame),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config() -> BeamSteeringConfig {
        BeamSteeringConfig {
            nx: 64,
            ny: 48,
            offset_x: 32.0,
            offset_y: 24.0,
            width_x: 4.0,
            width_y: 6.0,
            probe: (32, 24),
            seed: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_moves_per_axis() {
        let mut ctrl = BeamSteeringController::new(BeamSteeringConfig::default()).unwrap();
        for axis in BeamAxis::ALL {
            assert_eq!(ctrl.check_position(axis), 0.0);
        }
        ctrl.move_abs(BeamAxis::H, 100.0);
        ctrl.move_rel(BeamAxis::H, -30.0);
        ctrl.move_rel(BeamAxis::Theta, 15.0);
        assert_eq!(ctrl.check_position(BeamAxis::H), 70.0);
        assert_eq!(ctrl.check_position(BeamAxis::V), 0.0);
        assert_eq!(ctrl.check_position(BeamAxis::Theta), 15.0);
    }

    #[test]
    fn test_axis_names() {
        assert_eq!(BeamAxis::from_name("Theta"), Some(BeamAxis::Theta));
        assert_eq!(BeamAxis::from_name("X"), None);
        assert_eq!(BeamAxis::V.to_string(), "V");
    }

    #[test]
    fn test_spot_follows_actuators() {
        let mut ctrl = BeamSteeringController::new(quiet_config()).unwrap();
        ctrl.move_abs(BeamAxis::H, 500.0);
        ctrl.move_abs(BeamAxis::V, -300.0);
        assert_eq!(ctrl.spot_center(), (37.0, 21.0));

        let frame = ctrl.acquire_frame();
        assert_eq!(frame.len(), 48);
        assert_eq!(frame[0].len(), 64);
        assert!(frame[21][37] >= 10.0);
        assert!(frame[21][37] > frame[21][30]);
    }

    #[test]
    fn test_data_dimensions() {
        let mut ctrl = BeamSteeringController::new(quiet_config()).unwrap();

        match ctrl.data_output(DataDim::Data0D) {
            BeamData::Scalar(v) => assert!((10.0..10.1).contains(&v), "got {v}"),
            other => panic!("unexpected {other:?}"),
        }
        match ctrl.data_output(DataDim::Data1D(Integration::Vertical)) {
            BeamData::Profile(p) => assert_eq!(p.len(), 64),
            other => panic!("unexpected {other:?}"),
        }
        match ctrl.data_output(DataDim::Data1D(Integration::Horizontal)) {
            BeamData::Profile(p) => assert_eq!(p.len(), 48),
            other => panic!("unexpected {other:?}"),
        }
        match ctrl.data_output(DataDim::Data2D) {
            BeamData::Image(img) => assert_eq!((img.len(), img[0].len()), (48, 64)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_reduce_means() {
        let frame = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        assert_eq!(
            reduce(frame.clone(), DataDim::Data1D(Integration::Vertical), (0, 0)),
            BeamData::Profile(vec![2.0, 3.0])
        );
        assert_eq!(
            reduce(frame.clone(), DataDim::Data1D(Integration::Horizontal), (0, 0)),
            BeamData::Profile(vec![1.5, 3.5])
        );
        assert_eq!(
            reduce(frame, DataDim::Data0D, (1, 0)),
            BeamData::Scalar(2.0)
        );
    }

    #[test]
    fn test_drift_moves_offset_per_frame() {
        let mut ctrl = BeamSteeringController::new(quiet_config()).unwrap();
        ctrl.acquire_frame();
        assert_eq!(ctrl.offset(), (32.0, 24.0));

        ctrl.set_drift(true);
        ctrl.acquire_frame();
        ctrl.acquire_frame();
        let (x, y) = ctrl.offset();
        assert!((x - 32.2).abs() < 1e-12);
        assert!((y - 24.1).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_probe_rejected() {
        let config = BeamSteeringConfig {
            probe: (300, 0),
            ..Default::default()
        };
        assert!(matches!(
            BeamSteeringController::new(config),
            Err(DaqError::Configuration(_))
        ));
    }
}
