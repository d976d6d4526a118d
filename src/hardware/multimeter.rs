//! Simulated Keithley 2110 digital multimeter.
//!
//! Mirrors the connection flow of a serial instrument (list resources, open on an
//! address, close) without any I/O. Readings are uniform random fractions of the
//! selected range.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::error::{AppResult, DaqError};
use crate::hardware::rng::MockRng;

/// Addresses the simulated bus answers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SerialAddress {
    /// GPIB primary address 16
    Gpib16,
    /// USB raw resource
    UsbRaw,
    /// Serial port COM7
    Com7,
}

impl SerialAddress {
    /// Every address on the bus.
    pub const ALL: [SerialAddress; 3] = [
        SerialAddress::Gpib16,
        SerialAddress::UsbRaw,
        SerialAddress::Com7,
    ];

    /// VISA-style resource name.
    pub fn name(self) -> &'static str {
        match self {
            SerialAddress::Gpib16 => "GPIB::16",
            SerialAddress::UsbRaw => "USB::120x::RAW",
            SerialAddress::Com7 => "COM7",
        }
    }

    /// Look up an address by resource name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }
}

impl fmt::Display for SerialAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Enumerates the resources on the simulated bus.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResourceManager;

impl ResourceManager {
    /// Create a resource manager.
    pub fn new() -> Self {
        Self
    }

    /// Names of all connectable resources.
    pub fn list_resources(&self) -> Vec<&'static str> {
        SerialAddress::ALL.iter().map(|a| a.name()).collect()
    }
}

/// Measurement function of the meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MeasurementFunction {
    /// DC voltage
    #[default]
    #[serde(rename = "volt_dc")]
    VoltDc,
    /// DC current
    #[serde(rename = "curr_dc")]
    CurrDc,
    /// No function selected
    #[serde(rename = "none")]
    Disabled,
}

const VOLT_RANGES: &[f64] = &[0.1, 1.0, 10.0, 100.0];
const CURR_RANGES: &[f64] = &[1e-4, 1e-5, 1e-2, 1e-1, 1.0];

impl MeasurementFunction {
    /// Every function.
    pub const ALL: [MeasurementFunction; 3] = [
        MeasurementFunction::VoltDc,
        MeasurementFunction::CurrDc,
        MeasurementFunction::Disabled,
    ];

    /// Settings name ("volt_dc", "curr_dc", "none").
    pub fn name(self) -> &'static str {
        match self {
            MeasurementFunction::VoltDc => "volt_dc",
            MeasurementFunction::CurrDc => "curr_dc",
            MeasurementFunction::Disabled => "none",
        }
    }

    /// SCPI mnemonic.
    pub fn scpi(self) -> &'static str {
        match self {
            MeasurementFunction::VoltDc => "VOLT:DC",
            MeasurementFunction::CurrDc => "CURR:DC",
            MeasurementFunction::Disabled => "NONE",
        }
    }

    /// Look up a function by settings name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Full-scale ranges selectable for this function.
    pub fn ranges(self) -> &'static [f64] {
        match self {
            MeasurementFunction::VoltDc => VOLT_RANGES,
            MeasurementFunction::CurrDc => CURR_RANGES,
            MeasurementFunction::Disabled => &[],
        }
    }

    /// Unit of readings.
    pub fn unit(self) -> &'static str {
        match self {
            MeasurementFunction::VoltDc => "V",
            MeasurementFunction::CurrDc => "A",
            MeasurementFunction::Disabled => "",
        }
    }
}

/// Static configuration of the multimeter simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultimeterConfig {
    /// Resource to open on registration
    pub address: String,
    /// Function at power-on
    pub function: MeasurementFunction,
    /// Range index at power-on
    pub range_index: usize,
    /// Fixed seed for reproducible readings
    pub seed: Option<u64>,
}

impl Default for MultimeterConfig {
    fn default() -> Self {
        Self {
            address: SerialAddress::Gpib16.name().to_string(),
            function: MeasurementFunction::VoltDc,
            range_index: 0,
            seed: None,
        }
    }
}

impl MultimeterConfig {
    /// Check the address and range against the simulated hardware.
    pub fn validate(&self) -> AppResult<()> {
        if SerialAddress::from_name(&self.address).is_none() {
            return Err(DaqError::Configuration(format!(
                "unknown multimeter address '{}'",
                self.address
            )));
        }
        let ranges = self.function.ranges();
        if !ranges.is_empty() && self.range_index >= ranges.len() {
            return Err(DaqError::Configuration(format!(
                "range_index {} out of bounds for {}",
                self.range_index,
                self.function.name()
            )));
        }
        Ok(())
    }
}

/// Simulated Keithley 2110.
#[derive(Debug)]
pub struct Keithley2110 {
    address: Option<SerialAddress>,
    function: MeasurementFunction,
    range_index: usize,
    rng: MockRng,
}

impl Default for Keithley2110 {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Keithley2110 {
    /// Create a closed meter in DC voltage mode on the lowest range.
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            address: None,
            function: MeasurementFunction::VoltDc,
            range_index: 0,
            rng: MockRng::new(seed),
        }
    }

    /// Create a meter from configuration and open it on the configured address.
    ///
    /// # Errors
    /// `Configuration` for an invalid config, `Communication` if opening fails.
    pub fn from_config(config: &MultimeterConfig) -> AppResult<Self> {
        config.validate()?;
        let mut meter = Self::new(config.seed);
        meter.function = config.function;
        meter.range_index = config.range_index;
        meter.open_communication(&config.address)?;
        Ok(meter)
    }

    /// Connect on `address`.
    ///
    /// # Errors
    /// `Communication` if already connected or if no device answers on `address`.
    pub fn open_communication(&mut self, address: &str) -> AppResult<()> {
        if self.address.is_some() {
            return Err(DaqError::Communication("Device already connected".into()));
        }
        let addr = SerialAddress::from_name(address)
            .ok_or_else(|| DaqError::Communication("Invalid Address".into()))?;
        self.address = Some(addr);
        debug!(address = %addr, "Keithley2110 connected");
        Ok(())
    }

    /// Disconnect. No-op if already closed.
    pub fn close_communication(&mut self) {
        if let Some(addr) = self.address.take() {
            debug!(address = %addr, "Keithley2110 disconnected");
        }
    }

    /// True while connected.
    pub fn is_open(&self) -> bool {
        self.address.is_some()
    }

    /// Address of the open connection.
    pub fn address(&self) -> Option<SerialAddress> {
        self.address
    }

    /// Active measurement function.
    pub fn function(&self) -> MeasurementFunction {
        self.function
    }

    /// Select a function by name. Unknown names are logged and ignored.
    ///
    /// Changing function resets the range to the first entry of the new table.
    pub fn set_function(&mut self, name: &str) -> bool {
        match MeasurementFunction::from_name(name) {
            Some(function) => {
                if function != self.function {
                    self.range_index = 0;
                }
                self.function = function;
                true
            }
            None => {
                warn!(requested = name, "The requested measurement cannot be set");
                false
            }
        }
    }

    /// Index into the active function's range table.
    pub fn range_index(&self) -> usize {
        self.range_index
    }

    /// Select a range of the active function.
    ///
    /// # Errors
    /// `InvalidArgument` if `index` is outside the active function's table.
    pub fn set_range(&mut self, index: usize) -> AppResult<()> {
        let ranges = self.function.ranges();
        if index >= ranges.len() {
            return Err(DaqError::InvalidArgument(format!(
                "range index {index} out of bounds for {} ({} ranges)",
                self.function.name(),
                ranges.len()
            )));
        }
        self.range_index = index;
        Ok(())
    }

    /// Full-scale value of the active range, if the function has one.
    pub fn range(&self) -> Option<f64> {
        self.function.ranges().get(self.range_index).copied()
    }

    /// Take a reading: a uniform fraction of the active range.
    ///
    /// # Errors
    /// `Communication` when closed, `Instrument` when no function is selected.
    pub fn get_reading(&self) -> AppResult<f64> {
        if !self.is_open() {
            return Err(DaqError::Communication("Device not connected".into()));
        }
        let range = self.range().ok_or_else(|| {
            DaqError::Instrument(format!(
                "no range available for function {}",
                self.function.scpi()
            ))
        })?;
        Ok(range * self.rng.next_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_list_resources() {
        let names = ResourceManager::new().list_resources();
        assert_eq!(names, vec!["GPIB::16", "USB::120x::RAW", "COM7"]);
    }

    #[test]
    fn test_open_close() {
        let mut meter = Keithley2110::new(Some(3));
        assert!(!meter.is_open());

        meter.open_communication("COM7").unwrap();
        assert!(meter.is_open());
        assert_eq!(meter.address(), Some(SerialAddress::Com7));

        let err = meter.open_communication("GPIB::16").unwrap_err();
        assert_eq!(err.to_string(), "Communication error: Device already connected");

        meter.close_communication();
        meter.close_communication();
        assert!(!meter.is_open());
    }

    #[test]
    fn test_invalid_address() {
        let mut meter = Keithley2110::default();
        let err = meter.open_communication("GPIB::99").unwrap_err();
        assert!(matches!(err, DaqError::Communication(ref m) if m == "Invalid Address"));
        assert!(!meter.is_open());
    }

    #[test]
    fn test_reading_requires_connection() {
        let meter = Keithley2110::new(Some(3));
        assert!(matches!(meter.get_reading(), Err(DaqError::Communication(_))));
    }

    #[test]
    fn test_reading_within_range() {
        let mut meter = Keithley2110::new(Some(3));
        meter.open_communication("GPIB::16").unwrap();
        meter.set_range(2).unwrap();
        for _ in 0..50 {
            let v = meter.get_reading().unwrap();
            assert!((0.0..10.0).contains(&v), "got {v}");
        }
    }

    #[test]
    fn test_set_function() {
        let mut meter = Keithley2110::default();
        assert_eq!(meter.function().scpi(), "VOLT:DC");

        assert!(!meter.set_function("resistance"));
        assert_eq!(meter.function(), MeasurementFunction::VoltDc);

        meter.set_range(3).unwrap();
        assert!(meter.set_function("curr_dc"));
        assert_eq!(meter.function().scpi(), "CURR:DC");
        assert_eq!(meter.range_index(), 0);
        assert_eq!(meter.range(), Some(1e-4));
        meter.set_range(4).unwrap();
        assert_eq!(meter.range(), Some(1.0));
        assert!(matches!(meter.set_range(5), Err(DaqError::InvalidArgument(_))));
    }

    #[test]
    #[traced_test]
    fn test_unknown_function_is_logged() {
        let mut meter = Keithley2110::default();
        assert!(!meter.set_function("frequency"));
        assert!(logs_contain("The requested measurement cannot be set"));
    }

    #[test]
    fn test_disabled_function_has_no_reading() {
        let mut meter = Keithley2110::new(Some(1));
        meter.open_communication("USB::120x::RAW").unwrap();
        assert!(meter.set_function("none"));
        assert_eq!(meter.range(), None);
        assert!(matches!(meter.get_reading(), Err(DaqError::Instrument(_))));
    }

    #[test]
    fn test_from_config() {
        let cfg: MultimeterConfig =
            toml::from_str("address = \"COM7\"\nfunction = \"curr_dc\"\nrange_index = 3").unwrap();
        let meter = Keithley2110::from_config(&cfg).unwrap();
        assert!(meter.is_open());
        assert_eq!(meter.range(), Some(1e-1));

        let bad = MultimeterConfig {
            address: "LPT1".into(),
            ..Default::default()
        };
        assert!(matches!(
            Keithley2110::from_config(&bad),
            Err(DaqError::Configuration(_))
        ));
    }
}
