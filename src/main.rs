//! CLI Entry Point for the teaching instruments
//!
//! Drives the simulated instruments headlessly:
//! - List the devices opened from configuration
//! - Move, home and stop actuators
//! - Take single readings, spectra, beam frames and wavelength scans
//! - Get and set named parameters
//!
//! Every invocation opens the configured devices, runs one command and closes them;
//! no state survives between runs.
//!
//! # Usage
//!
//! ```bash
//! rust_daq_teaching devices
//! rust_daq_teaching move monochromator --to 532 --wait
//! rust_daq_teaching spectrum monochromator --json
//! rust_daq_teaching set monochromator grating '"G1200"'
//! rust_daq_teaching move beam --axis Theta --by 15
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use rust_daq_teaching::config::{SimConfig, DEFAULT_CONFIG_PATH};
use rust_daq_teaching::hardware::beam_steering::BeamAxis;
use rust_daq_teaching::hardware::multimeter::ResourceManager;
use rust_daq_teaching::hardware::{create_mock_registry, DeviceRegistry, Movable};
use rust_daq_teaching::logging;
use rust_daq_teaching::measurement_types::Measurement;

#[derive(Parser)]
#[command(name = "rust_daq_teaching")]
#[command(about = "Simulated spectrometer, beam steering and multimeter", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered devices and their capabilities
    Devices,

    /// List addresses the simulated serial bus answers on
    Resources,

    /// Move an actuator
    Move {
        /// Device id
        id: String,
        /// Absolute target
        #[arg(long, conflicts_with = "by", required_unless_present = "by")]
        to: Option<f64>,
        /// Relative offset
        #[arg(long, allow_negative_numbers = true)]
        by: Option<f64>,
        /// Beam steering axis (H, V, Theta)
        #[arg(long)]
        axis: Option<String>,
        /// Wait for the move to settle and report the final position
        #[arg(long)]
        wait: bool,
    },

    /// Move an actuator to its reference position
    Home {
        /// Device id
        id: String,
        /// Beam steering axis (H, V, Theta)
        #[arg(long)]
        axis: Option<String>,
    },

    /// Take a single scalar reading
    Read {
        /// Device id
        id: String,
    },

    /// Acquire a spectrum
    Spectrum {
        /// Device id
        id: String,
        /// Print the full record as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Acquire a beam steering frame
    Frame {
        /// Device id
        id: String,
        /// Print the full record as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Step the wavelength and take a reading at each point
    Scan {
        /// Device id
        id: String,
        /// First wavelength
        #[arg(long)]
        from: f64,
        /// Last wavelength (inclusive)
        #[arg(long)]
        to: f64,
        /// Step between points
        #[arg(long, default_value_t = 10.0)]
        step: f64,
    },

    /// Read a named parameter
    Get {
        /// Device id
        id: String,
        /// Parameter name
        name: String,
    },

    /// Set a named parameter to a JSON value
    Set {
        /// Device id
        id: String,
        /// Parameter name
        name: String,
        /// New value as JSON (e.g. 12.5 or '"G1200"')
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = SimConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    logging::init_from_config(&config)?;

    let mut registry = if config.enabled_instruments().is_empty() {
        info!("No instruments configured, using the default simulators");
        create_mock_registry().await?
    } else {
        DeviceRegistry::from_config(&config).await?
    };

    let result = run(&registry, cli.command).await;
    registry.close_all().await;
    result
}

async fn run(registry: &DeviceRegistry, command: Commands) -> Result<()> {
    match command {
        Commands::Devices => {
            for device in registry.list_devices() {
                println!(
                    "{:<16} {:<14} {:?}  {}",
                    device.id, device.driver_type, device.capabilities, device.name
                );
            }
            Ok(())
        }

        Commands::Resources => {
            for name in ResourceManager::new().list_resources() {
                println!("{name}");
            }
            Ok(())
        }

        Commands::Move {
            id,
            to,
            by,
            axis,
            wait,
        } => {
            let device = movable(registry, &id, axis.as_deref())?;
            match (to, by) {
                (Some(target), _) => device.move_abs(target).await?,
                (None, Some(delta)) => device.move_rel(delta).await?,
                (None, None) => return Err(anyhow!("either --to or --by is required")),
            }
            if wait {
                device.wait_settled().await?;
            }
            println!("{:.4}", device.position().await?);
            Ok(())
        }

        Commands::Home { id, axis } => {
            let device = movable(registry, &id, axis.as_deref())?;
            device.home().await?;
            device.wait_settled().await?;
            println!("{:.4}", device.position().await?);
            Ok(())
        }

        Commands::Read { id } => {
            let device = registry
                .get_readable(&id)
                .ok_or_else(|| missing(registry, &id, "readable"))?;
            println!("{}", device.read().await?);
            Ok(())
        }

        Commands::Spectrum { id, json } => {
            let mono = registry
                .get_monochromator(&id)
                .ok_or_else(|| missing(registry, &id, "a spectrometer"))?;
            let data = mono.read_spectrum_data().await;
            let range = data
                .wavelengths_nm
                .first()
                .copied()
                .zip(data.wavelengths_nm.last().copied());
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&Measurement::Spectrum(data))?
                );
            } else if let Some((first, last)) = range {
                println!("{} pixels, {first:.2} to {last:.2} nm", data.len());
                if let Some((w, i)) = data.peak() {
                    println!("peak {i:.3} at {w:.2} nm");
                }
            }
            Ok(())
        }

        Commands::Frame { id, json } => {
            let rig = registry
                .get_beam_steering(&id)
                .ok_or_else(|| missing(registry, &id, "a beam steering rig"))?;
            let frame = rig.acquire_image().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&Measurement::Image(frame))?);
            } else {
                let max = frame.pixels.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                println!("{}x{} frame, max {max:.3} {}", frame.width, frame.height, frame.unit);
            }
            Ok(())
        }

        Commands::Scan { id, from, to, step } => {
            if !(step > 0.0) {
                return Err(anyhow!("--step must be positive"));
            }
            let axis = movable(registry, &id, None)?;
            let detector = registry
                .get_readable(&id)
                .ok_or_else(|| missing(registry, &id, "readable"))?;
            let direction = if to >= from { 1.0 } else { -1.0 };
            let points = ((to - from).abs() / step).floor() as usize + 1;
            for k in 0..points {
                let target = from + direction * step * k as f64;
                axis.move_abs(target).await?;
                axis.wait_settled().await?;
                println!("{target:.3}\t{:.6}", detector.read().await?);
            }
            Ok(())
        }

        Commands::Get { id, name } => {
            let device = registry
                .get_settable(&id)
                .ok_or_else(|| missing(registry, &id, "settable"))?;
            println!("{}", device.get_value(&name).await?);
            Ok(())
        }

        Commands::Set { id, name, value } => {
            let device = registry
                .get_settable(&id)
                .ok_or_else(|| missing(registry, &id, "settable"))?;
            let value: serde_json::Value = serde_json::from_str(&value)
                .with_context(|| format!("parsing '{value}' as JSON"))?;
            device.set_value(&name, value).await?;
            println!("{}", device.get_value(&name).await?);
            Ok(())
        }
    }
}

fn movable(
    registry: &DeviceRegistry,
    id: &str,
    axis: Option<&str>,
) -> Result<std::sync::Arc<dyn Movable>> {
    let device = match axis {
        Some(name) => {
            let axis =
                BeamAxis::from_name(name).ok_or_else(|| anyhow!("unknown axis '{name}'"))?;
            registry.get_beam_axis(id, axis)
        }
        None => registry.get_movable(id),
    };
    device.ok_or_else(|| missing(registry, id, "movable"))
}

fn missing(registry: &DeviceRegistry, id: &str, what: &str) -> anyhow::Error {
    match registry.require(id) {
        Err(e) => e.into(),
        Ok(_) => anyhow!("'{id}' is not {what}"),
    }
}
