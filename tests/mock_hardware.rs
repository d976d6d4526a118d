//! Integration tests for the simulated instruments
//!
//! These tests drive the simulators only through the capability traits and the
//! registry, the way an acquisition loop would.

use rust_daq_teaching::hardware::beam_steering::{BeamAxis, BeamSteeringConfig};
use rust_daq_teaching::hardware::capabilities::{Movable, Readable, Settable, SpectrumSource};
use rust_daq_teaching::hardware::clock::ManualClock;
use rust_daq_teaching::hardware::mock::MockMonochromator;
use rust_daq_teaching::hardware::multimeter::MultimeterConfig;
use rust_daq_teaching::hardware::registry::{DeviceConfig, DeviceRegistry, DriverType};
use rust_daq_teaching::hardware::spectrometer::SpectrometerConfig;
use rust_daq_teaching::DaqError;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn seeded_spectrometer() -> SpectrometerConfig {
    SpectrometerConfig {
        seed: Some(1234),
        ..Default::default()
    }
}

async fn manual_registry() -> (DeviceRegistry, ManualClock) {
    let clock = ManualClock::new();
    let mut registry = DeviceRegistry::with_clock(Arc::new(clock.clone()));
    registry
        .register(DeviceConfig {
            id: "mono".into(),
            name: "Monochromator".into(),
            driver: DriverType::Spectrometer(seeded_spectrometer()),
        })
        .await
        .unwrap();
    registry
        .register(DeviceConfig {
            id: "beam".into(),
            name: "Beam steering".into(),
            driver: DriverType::BeamSteering(BeamSteeringConfig {
                seed: Some(7),
                ..Default::default()
            }),
        })
        .await
        .unwrap();
    (registry, clock)
}

/// Generic step scan over any movable/readable pair.
async fn step_scan<M, R>(axis: &M, detector: &R, points: &[f64]) -> anyhow::Result<Vec<f64>>
where
    M: Movable + ?Sized,
    R: Readable + ?Sized,
{
    let mut readings = Vec::with_capacity(points.len());
    for &p in points {
        axis.move_abs(p).await?;
        axis.wait_settled().await?;
        readings.push(detector.read().await?);
    }
    Ok(readings)
}

// =============================================================================
// Monochromator
// =============================================================================

#[tokio::test]
async fn test_trajectory_through_registry() {
    let (registry, clock) = manual_registry().await;
    let mono = registry.get_movable("mono").unwrap();

    mono.move_abs(500.0).await.unwrap();
    assert_eq!(mono.position().await.unwrap(), 632.0);

    let mut last = 632.0;
    for _ in 0..10 {
        clock.advance_secs(0.1);
        let w = mono.position().await.unwrap();
        assert!(w < last && w >= 500.0, "{w} after {last}");
        last = w;
    }
    // One tau after the command the residual is epsilon
    assert!((last - 500.01).abs() < 1e-9, "got {last}");
}

#[tokio::test]
async fn test_spectrum_follows_central_wavelength() {
    let (registry, clock) = manual_registry().await;
    let source = registry.get_spectrum_source("mono").unwrap();
    let mono = registry.get_movable("mono").unwrap();

    // Line at 532 nm is outside the window around 632 nm
    let axis = source.wavelength_axis().await.unwrap();
    assert!((axis[0] - (632.0 - 128.0 * 0.7)).abs() < 1e-9);

    mono.move_abs(532.0).await.unwrap();
    clock.advance_secs(10.0);

    let axis = source.wavelength_axis().await.unwrap();
    let spectrum = source.acquire_spectrum().await.unwrap();
    assert_eq!(axis.len(), spectrum.len());
    let center = axis.iter().position(|w| (w - 532.0).abs() < 1e-6).unwrap();
    assert_eq!(center, 128);
    assert!(spectrum[center] > 9.9);
    assert!(spectrum[0] < 1.0);
}

#[tokio::test]
async fn test_spectrum_grabbed_mid_move() {
    let (registry, clock) = manual_registry().await;
    let source = registry.get_spectrum_source("mono").unwrap();
    let mono = registry.get_movable("mono").unwrap();

    mono.move_abs(532.0).await.unwrap();
    clock.advance_secs(0.3);

    let w = mono.position().await.unwrap();
    assert!(w > 532.0 && w < 632.0, "got {w}");
    let axis = source.wavelength_axis().await.unwrap();
    assert_eq!(axis[128], w);
    assert_eq!(source.acquire_spectrum().await.unwrap().len(), 256);

    // Acquisition does not disturb the move
    clock.advance_secs(0.1);
    assert!(mono.position().await.unwrap() < w);
}

#[tokio::test]
async fn test_non_finite_moves_rejected() {
    let (registry, clock) = manual_registry().await;
    let mono = registry.get_movable("mono").unwrap();

    assert!(mono.move_abs(f64::NAN).await.is_err());
    assert!(mono.move_abs(f64::INFINITY).await.is_err());
    assert!(mono.move_rel(f64::NEG_INFINITY).await.is_err());
    assert_eq!(mono.position().await.unwrap(), 632.0);

    mono.move_abs(600.0).await.unwrap();
    clock.advance_secs(10.0);
    assert!((mono.position().await.unwrap() - 600.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_grating_change_narrows_axis() {
    let (registry, _clock) = manual_registry().await;
    let settings = registry.get_settable("mono").unwrap();
    let source = registry.get_spectrum_source("mono").unwrap();

    let wide = source.wavelength_axis().await.unwrap();
    settings.set_value("grating", json!("G1200")).await.unwrap();
    let narrow = source.wavelength_axis().await.unwrap();

    let span = |a: &[f64]| a[a.len() - 1] - a[0];
    assert!((span(&wide) / span(&narrow) - 4.0).abs() < 1e-9);

    // Unknown grating: silently ignored
    settings.set_value("grating", json!("G9999")).await.unwrap();
    assert_eq!(settings.get_value("grating").await.unwrap(), json!("G1200"));
}

#[tokio::test]
async fn test_stop_mid_move_then_resume() {
    let (registry, clock) = manual_registry().await;
    let mono = registry.get_movable("mono").unwrap();

    mono.move_abs(700.0).await.unwrap();
    clock.advance_secs(0.25);
    mono.stop().await.unwrap();
    let frozen = mono.position().await.unwrap();
    assert!(frozen > 632.0 && frozen < 700.0);

    clock.advance_secs(3.0);
    assert_eq!(mono.position().await.unwrap(), frozen);

    mono.move_rel(-10.0).await.unwrap();
    clock.advance_secs(10.0);
    assert!((mono.position().await.unwrap() - (frozen - 10.0)).abs() < 1e-6);
}

#[tokio::test]
async fn test_negative_targets() {
    let (registry, _clock) = manual_registry().await;
    let mono = registry.get_movable("mono").unwrap();

    let err = mono.move_abs(-5.0).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DaqError>(),
        Some(DaqError::InvalidArgument(_))
    ));

    // Relative moves are not range-checked
    mono.move_rel(-5.0).await.unwrap();
}

#[tokio::test]
async fn test_step_scan_finds_line() {
    // Real clock with a short settling time
    let config = SpectrometerConfig {
        tau_s: 0.02,
        seed: Some(99),
        ..Default::default()
    };
    let mono = MockMonochromator::new("mono", config)
        .unwrap()
        .with_settle_timeout(Duration::from_secs(5));

    let points: Vec<f64> = (0..9).map(|k| 492.0 + 10.0 * k as f64).collect();
    let start = Instant::now();
    let readings = step_scan(&mono, &mono, &points).await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));

    let (best, _) = readings
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .unwrap();
    assert_eq!(points[best], 532.0);
}

#[tokio::test]
async fn test_home_moves_to_reference() {
    let (registry, clock) = manual_registry().await;
    let mono = registry.get_movable("mono").unwrap();
    mono.home().await.unwrap();
    clock.advance_secs(5.0);
    mono.wait_settled().await.unwrap();
    assert!((mono.position().await.unwrap() - 600.0).abs() < 0.1);
}

// =============================================================================
// Beam steering
// =============================================================================

#[tokio::test]
async fn test_beam_steering_spot_moves_off_probe() {
    let (registry, _clock) = manual_registry().await;
    let detector = registry.get_readable("beam").unwrap();
    let h = registry.get_beam_axis("beam", BeamAxis::H).unwrap();

    let centered = detector.read().await.unwrap();
    assert!(centered >= 10.0);

    // 3000 units * 0.01 px/unit = 30 px, three widths away along x
    h.move_abs(3000.0).await.unwrap();
    let off = detector.read().await.unwrap();
    assert!(off < 1.0, "got {off}");

    let scan = step_scan(h.as_ref(), detector.as_ref(), &[0.0, 3000.0])
        .await
        .unwrap();
    assert!(scan[0] > scan[1]);
}

// =============================================================================
// Multimeter
// =============================================================================

#[tokio::test]
async fn test_multimeter_ranges_and_close() {
    let mut registry = DeviceRegistry::new();
    registry
        .register(DeviceConfig {
            id: "dmm".into(),
            name: "Keithley 2110".into(),
            driver: DriverType::Multimeter(MultimeterConfig {
                seed: Some(3),
                ..Default::default()
            }),
        })
        .await
        .unwrap();

    let settings = registry.get_settable("dmm").unwrap();
    let meter = registry.get_readable("dmm").unwrap();

    settings.set_value("range_index", json!(2)).await.unwrap();
    assert_eq!(settings.get_value("range").await.unwrap(), json!(10.0));
    for _ in 0..20 {
        let v = meter.read().await.unwrap();
        assert!((0.0..10.0).contains(&v));
    }

    assert_eq!(settings.get_value("unit").await.unwrap(), json!("V"));

    // Switching function resets the range to the first entry
    settings.set_value("function", json!("curr_dc")).await.unwrap();
    assert_eq!(settings.get_value("range_index").await.unwrap(), json!(0));
    assert_eq!(settings.get_value("unit").await.unwrap(), json!("A"));
    let info = registry.get_device_info("dmm").unwrap();
    assert_eq!(info.metadata.measurement_units, None);

    assert!(settings.set_value("range_index", json!(9)).await.is_err());

    settings.set_value("function", json!("none")).await.unwrap();
    assert!(meter.read().await.is_err());

    assert!(registry.unregister("dmm").await);
    assert!(meter.read().await.is_err());
}
