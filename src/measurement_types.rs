//! Measurement records produced by the simulated instruments.
//!
//! The simulators return plain numbers and vectors; these types wrap them with a
//! channel name, unit and timestamp so the CLI (and anything else downstream) can
//! serialize them uniformly. One record per data dimensionality:
//!
//! * [`DataPoint`]: 0D reading (photodiode intensity, multimeter value)
//! * [`SpectrumData`]: 1D spectrum over a wavelength axis
//! * [`ImageData`]: 2D detector frame

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Single scalar measurement.
///
/// # Fields
/// * `channel` - Logical channel name (e.g., "monochromator_intensity")
/// * `value` - Measured numerical value
/// * `unit` - Physical unit of `value`
/// * `timestamp` - UTC time of the reading
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Channel name
    pub channel: String,
    /// Measured value
    pub value: f64,
    /// Physical unit
    pub unit: String,
    /// UTC timestamp
    pub timestamp: DateTime<Utc>,
}

impl DataPoint {
    /// Stamp a reading with the current time.
    pub fn now(channel: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            value,
            unit: unit.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Intensity spectrum sampled on a wavelength axis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpectrumData {
    /// UTC timestamp when spectrum was captured
    pub timestamp: DateTime<Utc>,
    /// Channel identifier (format: `{instrument_id}_{parameter}`)
    pub channel: String,
    /// Physical unit for intensity values
    pub unit: String,
    /// Wavelength of each pixel in nm
    pub wavelengths_nm: Vec<f64>,
    /// Intensity of each pixel, same length as `wavelengths_nm`
    pub intensities: Vec<f64>,
    /// Optional metadata (grating, central wavelength, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl SpectrumData {
    /// Number of pixels.
    pub fn len(&self) -> usize {
        self.intensities.len()
    }

    /// True if the spectrum has no pixels.
    pub fn is_empty(&self) -> bool {
        self.intensities.is_empty()
    }

    /// Wavelength and intensity of the brightest pixel.
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.wavelengths_nm
            .iter()
            .zip(&self.intensities)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(w, i)| (*w, *i))
    }
}

/// 2D detector frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    /// UTC timestamp when image was captured
    pub timestamp: DateTime<Utc>,
    /// Channel identifier (format: `{instrument_id}_{parameter}`)
    pub channel: String,
    /// Image width in pixels
    pub width: usize,
    /// Image height in pixels
    pub height: usize,
    /// Pixel data, row-major
    pub pixels: Vec<f64>,
    /// Physical unit for pixel values
    pub unit: String,
}

impl ImageData {
    /// Build a frame from rows indexed `[y][x]`.
    ///
    /// Rows shorter than the first one are padded with zeros.
    pub fn from_rows(channel: impl Into<String>, rows: &[Vec<f64>], unit: impl Into<String>) -> Self {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        let mut pixels = Vec::with_capacity(width * height);
        for row in rows {
            pixels.extend(row.iter().copied().take(width));
            pixels.extend(std::iter::repeat(0.0).take(width.saturating_sub(row.len())));
        }
        Self {
            timestamp: Utc::now(),
            channel: channel.into(),
            width,
            height,
            pixels,
            unit: unit.into(),
        }
    }

    /// Pixel at column `x`, row `y`.
    pub fn get(&self, x: usize, y: usize) -> Option<f64> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(y * self.width + x).copied()
    }

    /// Returns the total number of pixels (width × height).
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }
}

/// Any measurement an instrument can produce.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Measurement {
    /// 0D reading
    Scalar(DataPoint),
    /// 1D spectrum
    Spectrum(SpectrumData),
    /// 2D frame
    Image(ImageData),
}

impl Measurement {
    /// Channel the measurement was taken on.
    pub fn channel(&self) -> &str {
        match self {
            Measurement::Scalar(p) => &p.channel,
            Measurement::Spectrum(s) => &s.channel,
            Measurement::Image(i) => &i.channel,
        }
    }
}
