//! Device Registry for Runtime Instrument Management
//!
//! Central registry for opening, closing and looking up simulated instruments at
//! runtime. Registering a device corresponds to "open communication": the simulator
//! is constructed (and, for the multimeter, connected on its serial address).
//! Unregistering corresponds to "close communication" and discards it.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      DeviceRegistry                             │
//! │  ┌──────────────────┐ ┌──────────────────┐ ┌────────────────┐  │
//! │  │ MockMonochromator│ │ MockBeamSteering │ │ MockMultimeter │  │
//! │  └──────────────────┘ └──────────────────┘ └────────────────┘  │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                    Capability Traits                            │
//! │  Movable | Readable | SpectrumSource | Settable                 │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                    Simulators                                   │
//! │  Spectrometer | BeamSteeringController | Keithley2110           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use rust_daq_teaching::hardware::registry::{DeviceRegistry, DeviceConfig, DriverType};
//!
//! let mut registry = DeviceRegistry::new();
//! registry.register(DeviceConfig {
//!     id: "mono".into(),
//!     name: "Monochromator".into(),
//!     driver: DriverType::Spectrometer(Default::default()),
//! }).await?;
//!
//! if let Some(device) = registry.get_movable("mono") {
//!     device.move_abs(532.0).await?;
//! }
//! ```

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{InstrumentDefinition, SimConfig};
use crate::error::{AppResult, DaqError};
use crate::hardware::beam_steering::{BeamAxis, BeamSteeringConfig};
use crate::hardware::capabilities::{Movable, Readable, Settable, SpectrumSource};
use crate::hardware::clock::{Clock, SystemClock};
use crate::hardware::mock::{MockBeamSteering, MockMonochromator, MockMultimeter};
use crate::hardware::multimeter::MultimeterConfig;
use crate::hardware::spectrometer::SpectrometerConfig;

// =============================================================================
// Device Identification
// =============================================================================

/// Unique identifier for a registered device
///
/// Format: lowercase alphanumeric with underscores (e.g., "monochromator", "dmm")
pub type DeviceId = String;

/// Capabilities a device can have (for introspection)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Capability {
    /// Can move to positions
    Movable,
    /// Can read scalar values
    Readable,
    /// Produces spectra over a wavelength axis
    SpectrumSource,
    /// Has named parameters
    Settable,
}

// =============================================================================
// Driver Types (Configuration)
// =============================================================================

/// Driver configuration for instantiating a simulator
#[derive(Debug, Clone)]
pub enum DriverType {
    /// Scanning spectrometer / monochromator
    Spectrometer(SpectrometerConfig),
    /// Three-axis beam steering rig
    BeamSteering(BeamSteeringConfig),
    /// Keithley 2110 multimeter
    Multimeter(MultimeterConfig),
}

impl DriverType {
    /// Build the typed driver config for a configuration entry.
    ///
    /// # Errors
    /// `Configuration` for an unknown type, a malformed `config` table or a
    /// config that fails the driver's own validation.
    pub fn from_definition(def: &InstrumentDefinition) -> AppResult<Self> {
        fn parse<T: serde::de::DeserializeOwned>(def: &InstrumentDefinition) -> AppResult<T> {
            def.config.clone().try_into().map_err(|e| {
                DaqError::Configuration(format!("instrument '{}': {e}", def.id))
            })
        }

        let driver = match def.r#type.as_str() {
            "spectrometer" => DriverType::Spectrometer(parse(def)?),
            "beam_steering" => DriverType::BeamSteering(parse(def)?),
            "multimeter" => DriverType::Multimeter(parse(def)?),
            other => {
                return Err(DaqError::Configuration(format!(
                    "instrument '{}': unknown type '{other}'",
                    def.id
                )))
            }
        };
        driver.validate().map_err(|e| match e {
            DaqError::Configuration(msg) => {
                DaqError::Configuration(format!("instrument '{}': {msg}", def.id))
            }
            other => other,
        })?;
        Ok(driver)
    }

    /// Check the driver-level invariants.
    pub fn validate(&self) -> AppResult<()> {
        match self {
            DriverType::Spectrometer(c) => c.validate(),
            DriverType::BeamSteering(c) => c.validate(),
            DriverType::Multimeter(c) => c.validate(),
        }
    }

    /// Get the capabilities this driver type provides
    pub fn capabilities(&self) -> Vec<Capability> {
        match self {
            DriverType::Spectrometer(_) => vec![
                Capability::Movable,
                Capability::Readable,
                Capability::SpectrumSource,
                Capability::Settable,
            ],
            DriverType::BeamSteering(_) => vec![Capability::Movable, Capability::Readable],
            DriverType::Multimeter(_) => vec![Capability::Readable, Capability::Settable],
        }
    }

    /// Get driver type name as used in configuration
    pub fn driver_name(&self) -> &'static str {
        match self {
            DriverType::Spectrometer(_) => "spectrometer",
            DriverType::BeamSteering(_) => "beam_steering",
            DriverType::Multimeter(_) => "multimeter",
        }
    }
}

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for registering a device
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Unique identifier (e.g., "monochromator")
    pub id: DeviceId,
    /// Human-readable name
    pub name: String,
    /// Driver type and configuration
    pub driver: DriverType,
}

impl DeviceConfig {
    /// Build a device config from a configuration entry.
    pub fn from_definition(def: &InstrumentDefinition) -> AppResult<Self> {
        Ok(Self {
            id: def.id.clone(),
            name: def.display_name().to_string(),
            driver: DriverType::from_definition(def)?,
        })
    }
}

// =============================================================================
// Device Info (for introspection)
// =============================================================================

/// Information about a registered device (returned by list operations)
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    /// Unique identifier
    pub id: DeviceId,
    /// Human-readable name
    pub name: String,
    /// Driver type name (e.g., "spectrometer")
    pub driver_type: String,
    /// Capabilities this device supports
    pub capabilities: Vec<Capability>,
    /// Capability-specific metadata
    pub metadata: DeviceMetadata,
}

/// Capability-specific metadata for a device
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceMetadata {
    /// For Movable devices: position units (e.g., "nm")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_units: Option<String>,
    /// For Readable devices: measurement units (e.g., "counts", "V")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement_units: Option<String>,
    /// For SpectrumSource devices: detector pixel count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pixel_count: Option<usize>,
    /// For devices with several actuators: axis labels
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub axes: Vec<String>,
    /// For Settable devices: accepted parameter names
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
}

// =============================================================================
// Registered Device (Internal)
// =============================================================================

/// A registered device with its adapter handles and metadata
struct RegisteredDevice {
    config: DeviceConfig,
    movable: Option<Arc<dyn Movable>>,
    readable: Option<Arc<dyn Readable>>,
    spectrum_source: Option<Arc<dyn SpectrumSource>>,
    settable: Option<Arc<dyn Settable>>,
    /// Concrete handles for operations outside the capability traits
    monochromator: Option<MockMonochromator>,
    beam_steering: Option<MockBeamSteering>,
    multimeter: Option<MockMultimeter>,
    metadata: DeviceMetadata,
}

impl RegisteredDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.config.id.clone(),
            name: self.config.name.clone(),
            driver_type: self.config.driver.driver_name().to_string(),
            capabilities: self.config.driver.capabilities(),
            metadata: self.metadata.clone(),
        }
    }
}

// =============================================================================
// Device Registry
// =============================================================================

/// Central registry for simulated instruments
///
/// The DeviceRegistry is the primary interface for:
/// - Opening devices from configuration
/// - Accessing devices by capability
/// - Querying device information
pub struct DeviceRegistry {
    devices: HashMap<DeviceId, RegisteredDevice>,
    clock: Arc<dyn Clock>,
}

impl DeviceRegistry {
    /// Create a new empty device registry
    pub fn new() -> Self {
        Self::with_clock(SystemClock::shared())
    }

    /// Create a registry whose time-dependent simulators read `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            devices: HashMap::new(),
            clock,
        }
    }

    /// Register every enabled instrument of a configuration
    pub async fn from_config(config: &SimConfig) -> Result<Self> {
        let mut registry = Self::new();
        registry.register_all(config).await?;
        Ok(registry)
    }

    /// Register every enabled instrument of a configuration into this registry
    pub async fn register_all(&mut self, config: &SimConfig) -> Result<()> {
        for def in config.enabled_instruments() {
            self.register(DeviceConfig::from_definition(def)?).await?;
        }
        Ok(())
    }

    /// Register (open) a device
    ///
    /// # Errors
    /// Returns error if:
    /// - Device ID is already registered
    /// - The simulator rejects its configuration or fails to connect
    pub async fn register(&mut self, config: DeviceConfig) -> Result<()> {
        if self.devices.contains_key(&config.id) {
            return Err(anyhow!("Device '{}' is already registered", config.id));
        }

        let registered = self.instantiate_device(config)?;
        info!(
            device = %registered.config.id,
            driver = registered.config.driver.driver_name(),
            "Device opened"
        );
        self.devices.insert(registered.config.id.clone(), registered);
        Ok(())
    }

    /// Unregister (close) a device
    ///
    /// # Returns
    /// true if device was found and removed, false if not found
    pub async fn unregister(&mut self, id: &str) -> bool {
        let Some(device) = self.devices.remove(id) else {
            return false;
        };
        if let Some(meter) = &device.multimeter {
            meter.close().await;
        }
        info!(device = %id, "Device closed");
        true
    }

    /// Unregister every device
    pub async fn close_all(&mut self) {
        let ids: Vec<DeviceId> = self.devices.keys().cloned().collect();
        for id in ids {
            self.unregister(&id).await;
        }
    }

    /// List all registered devices, sorted by id
    pub fn list_devices(&self) -> Vec<DeviceInfo> {
        let mut devices: Vec<DeviceInfo> =
            self.devices.values().map(RegisteredDevice::info).collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    /// Get device info by ID
    pub fn get_device_info(&self, id: &str) -> Option<DeviceInfo> {
        self.devices.get(id).map(RegisteredDevice::info)
    }

    /// Get device info by ID, failing for ids that were never opened
    pub fn require(&self, id: &str) -> AppResult<DeviceInfo> {
        self.get_device_info(id)
            .ok_or_else(|| DaqError::UnknownDevice(id.to_string()))
    }

    /// Check if a device is registered
    pub fn contains(&self, id: &str) -> bool {
        self.devices.contains_key(id)
    }

    /// Get count of registered devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    // =========================================================================
    // Capability Access
    // =========================================================================

    /// Get a device as Movable (if it supports this capability)
    ///
    /// For a beam steering rig this is its `H` axis; use
    /// [`DeviceRegistry::get_beam_axis`] for the others.
    pub fn get_movable(&self, id: &str) -> Option<Arc<dyn Movable>> {
        self.devices.get(id).and_then(|d| d.movable.clone())
    }

    /// Get a device as Readable (if it supports this capability)
    pub fn get_readable(&self, id: &str) -> Option<Arc<dyn Readable>> {
        self.devices.get(id).and_then(|d| d.readable.clone())
    }

    /// Get a device as SpectrumSource (if it supports this capability)
    pub fn get_spectrum_source(&self, id: &str) -> Option<Arc<dyn SpectrumSource>> {
        self.devices.get(id).and_then(|d| d.spectrum_source.clone())
    }

    /// Get a device as Settable (if it supports this capability)
    pub fn get_settable(&self, id: &str) -> Option<Arc<dyn Settable>> {
        self.devices.get(id).and_then(|d| d.settable.clone())
    }

    /// One actuator of a beam steering rig
    pub fn get_beam_axis(&self, id: &str, axis: BeamAxis) -> Option<Arc<dyn Movable>> {
        self.devices
            .get(id)
            .and_then(|d| d.beam_steering.as_ref())
            .map(|rig| Arc::new(rig.axis(axis)) as Arc<dyn Movable>)
    }

    /// Concrete monochromator adapter
    pub fn get_monochromator(&self, id: &str) -> Option<MockMonochromator> {
        self.devices.get(id).and_then(|d| d.monochromator.clone())
    }

    /// Concrete beam steering adapter
    pub fn get_beam_steering(&self, id: &str) -> Option<MockBeamSteering> {
        self.devices.get(id).and_then(|d| d.beam_steering.clone())
    }

    /// Concrete multimeter adapter
    pub fn get_multimeter(&self, id: &str) -> Option<MockMultimeter> {
        self.devices.get(id).and_then(|d| d.multimeter.clone())
    }

    /// Get all devices that support a specific capability, sorted by id
    pub fn devices_with_capability(&self, capability: Capability) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self
            .devices
            .iter()
            .filter(|(_, d)| d.config.driver.capabilities().contains(&capability))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    // =========================================================================
    // Device Instantiation (Private)
    // =========================================================================

    fn instantiate_device(&self, config: DeviceConfig) -> Result<RegisteredDevice> {
        match &config.driver {
            DriverType::Spectrometer(cfg) => {
                let mono = MockMonochromator::with_clock(
                    config.id.clone(),
                    cfg.clone(),
                    Arc::clone(&self.clock),
                )?;
                let handle = Arc::new(mono.clone());
                Ok(RegisteredDevice {
                    movable: Some(handle.clone()),
                    readable: Some(handle.clone()),
                    spectrum_source: Some(handle.clone()),
                    settable: Some(handle),
                    monochromator: Some(mono),
                    beam_steering: None,
                    multimeter: None,
                    metadata: DeviceMetadata {
                        position_units: Some("nm".to_string()),
                        measurement_units: Some("counts".to_string()),
                        pixel_count: Some(cfg.pixel_count),
                        parameters: names(MockMonochromator::PARAMETERS),
                        ..Default::default()
                    },
                    config,
                })
            }

            DriverType::BeamSteering(cfg) => {
                let rig = MockBeamSteering::new(config.id.clone(), cfg.clone())?;
                Ok(RegisteredDevice {
                    movable: Some(Arc::new(rig.axis(BeamAxis::H))),
                    readable: Some(Arc::new(rig.clone())),
                    spectrum_source: None,
                    settable: None,
                    monochromator: None,
                    beam_steering: Some(rig),
                    multimeter: None,
                    metadata: DeviceMetadata {
                        measurement_units: Some("counts".to_string()),
                        axes: BeamAxis::ALL.iter().map(|a| a.name().to_string()).collect(),
                        ..Default::default()
                    },
                    config,
                })
            }

            DriverType::Multimeter(cfg) => {
                let meter = MockMultimeter::new(config.id.clone(), cfg)?;
                let handle = Arc::new(meter.clone());
                Ok(RegisteredDevice {
                    movable: None,
                    readable: Some(handle.clone()),
                    spectrum_source: None,
                    settable: Some(handle),
                    monochromator: None,
                    beam_steering: None,
                    multimeter: Some(meter),
                    // Units follow the live measurement function, see `get_value("unit")`
                    metadata: DeviceMetadata {
                        parameters: names(MockMultimeter::PARAMETERS),
                        ..Default::default()
                    },
                    config,
                })
            }
        }
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Create a DeviceRegistry with one of each simulator
///
/// - `monochromator`: spectrometer with default settings
/// - `beam`: beam steering rig
/// - `dmm`: Keithley 2110 on GPIB::16
pub async fn create_mock_registry() -> Result<DeviceRegistry> {
    let mut registry = DeviceRegistry::new();

    registry
        .register(DeviceConfig {
            id: "monochromator".into(),
            name: "Simulated Monochromator".into(),
            driver: DriverType::Spectrometer(SpectrometerConfig::default()),
        })
        .await?;

    registry
        .register(DeviceConfig {
            id: "beam".into(),
            name: "Simulated Beam Steering".into(),
            driver: DriverType::BeamSteering(BeamSteeringConfig::default()),
        })
        .await?;

    if let Err(e) = registry
        .register(DeviceConfig {
            id: "dmm".into(),
            name: "Keithley 2110 (simulated)".into(),
            driver: DriverType::Multimeter(MultimeterConfig::default()),
        })
        .await
    {
        warn!("Multimeter registration failed: {}", e);
    }

    Ok(registry)
}

// =============================================================================
// Tests
// =============================================================================
