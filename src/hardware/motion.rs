//! First-order settling model for simulated actuators.
//!
//! A commanded move relaxes exponentially toward its target:
//!
//! ```text
//! x(t) = exp(-alpha * (t - t0) / tau) * (x0 - target) + target
//! ```
//!
//! `alpha` is chosen per move so that one `tau` after the command the remaining
//! distance to target equals `epsilon`:
//!
//! ```text
//! alpha = |ln(epsilon / |x0 - target|)|      (gap != 0)
//! alpha = |ln(epsilon / 10)|                 (gap == 0)
//! ```
//!
//! The position is evaluated in closed form from the snapshot taken when the move
//! was commanded, never integrated step by step, so reading it has no side effects.
//! Arrival is not tracked here: the model keeps reporting "moving" until [`stop`] is
//! called, and deciding when a move is close enough belongs to the caller.
//!
//! [`stop`]: SettlingModel::stop

use crate::error::{AppResult, DaqError};

/// How a commanded value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveMode {
    /// Value is the destination.
    #[default]
    Absolute,
    /// Value is an offset from the current position.
    Relative,
}

/// Gap used in place of a zero gap when calibrating the decay constant.
const ZERO_GAP_REFERENCE: f64 = 10.0;

/// Decay constant that leaves `epsilon` of the gap after one time constant.
pub fn decay_constant_for(gap: f64, epsilon: f64) -> f64 {
    if gap != 0.0 {
        (epsilon / gap.abs()).ln().abs()
    } else {
        (epsilon / ZERO_GAP_REFERENCE).ln().abs()
    }
}

/// Closed-form exponential relaxation toward a target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SettlingModel {
    tau: f64,
    epsilon: f64,
    start_time: f64,
    start_position: f64,
    target: f64,
    decay_constant: f64,
    moving: bool,
    /// Position reported while not moving
    rest_position: f64,
}

impl SettlingModel {
    /// Create a model resting at `position`.
    ///
    /// # Errors
    /// `InvalidArgument` if `tau` or `epsilon` is not strictly positive.
    pub fn at_rest(position: f64, tau: f64, epsilon: f64) -> AppResult<Self> {
        validate_tau(tau)?;
        if !(epsilon > 0.0) {
            return Err(DaqError::InvalidArgument(format!(
                "motion epsilon must be positive, got {epsilon}"
            )));
        }
        Ok(Self {
            tau,
            epsilon,
            start_time: 0.0,
            start_position: position,
            target: position,
            decay_constant: decay_constant_for(0.0, epsilon),
            moving: false,
            rest_position: position,
        })
    }

    /// Position at time `now`.
    pub fn position_at(&self, now: f64) -> f64 {
        if !self.moving {
            return self.rest_position;
        }
        let elapsed = now - self.start_time;
        (-self.decay_constant * elapsed / self.tau).exp() * (self.start_position - self.target)
            + self.target
    }

    /// Begin a move toward `target` at time `now`.
    ///
    /// The start position is the position evaluated at `now`, so a move issued while
    /// another is in flight (or after a stop) continues from where the actuator
    /// actually is.
    pub fn start(&mut self, target: f64, now: f64) {
        let start_position = self.position_at(now);
        self.start_position = start_position;
        self.start_time = now;
        self.target = target;
        self.decay_constant = decay_constant_for(start_position - target, self.epsilon);
        self.moving = true;
    }

    /// Freeze the actuator where it is at `now`.
    pub fn stop(&mut self, now: f64) {
        self.rest_position = self.position_at(now);
        self.moving = false;
    }

    /// Change the time constant. Applies to the move in flight as well.
    ///
    /// # Errors
    /// `InvalidArgument` if `tau` is not strictly positive.
    pub fn set_tau(&mut self, tau: f64) -> AppResult<()> {
        validate_tau(tau)?;
        self.tau = tau;
        Ok(())
    }

    /// Characteristic settling time in seconds.
    pub fn tau(&self) -> f64 {
        self.tau
    }

    /// Residual fraction used to calibrate the decay constant.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Destination of the most recent move.
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Decay constant of the most recent move.
    pub fn decay_constant(&self) -> f64 {
        self.decay_constant
    }

    /// Time the most recent move was commanded.
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Position at the time the most recent move was commanded.
    pub fn start_position(&self) -> f64 {
        self.start_position
    }

    /// True from a move command until [`SettlingModel::stop`].
    pub fn is_moving(&self) -> bool {
        self.moving
    }
}

fn validate_tau(tau: f64) -> AppResult<()> {
    if tau > 0.0 && tau.is_finite() {
        Ok(())
    } else {
        Err(DaqError::InvalidArgument(format!(
            "tau must be strictly positive, got {tau}"
        )))
    }
}
