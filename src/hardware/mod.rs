//! Simulated Instruments
//!
//! Capability traits, the simulators behind them, and the registry that opens and
//! closes them.
//!
//! - `capabilities`: `Movable`, `Readable`, `SpectrumSource`, `Settable`
//! - `spectrometer`, `beam_steering`, `multimeter`: synchronous simulators
//! - `motion`, `peak`, `clock`, `rng`: building blocks shared by the simulators
//! - `mock`: async adapters implementing the capability traits
//! - `registry`: runtime device management

pub mod beam_steering;
pub mod capabilities;
pub mod clock;
pub mod mock;
pub mod motion;
pub mod multimeter;
pub mod peak;
pub mod registry;
pub mod rng;
pub mod spectrometer;

pub use capabilities::{Movable, Readable, Settable, SpectrumSource};
pub use clock::{Clock, ManualClock, SystemClock};
pub use motion::MoveMode;
pub use registry::{create_mock_registry, Capability, DeviceConfig, DeviceRegistry, DriverType};
pub use spectrometer::{Grating, Spectrometer, SpectrometerConfig};
