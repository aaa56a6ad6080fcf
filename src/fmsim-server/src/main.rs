// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod config;
mod output;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

use fmsim_app::{init_logging, ConfigFile};
use fmsim_core::DynResult;
use fmsim_engine::SimulatorEngine;

use config::ServerConfig;
use output::IqSink;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - FM/RDS multi-station simulator");

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Directory with station descriptors
    #[arg(short = 's', long = "stations", value_name = "DIR")]
    stations: Option<PathBuf>,
    /// Raw IQ output file (interleaved little-endian f32)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,
    /// Stop after this many seconds
    #[arg(short = 'd', long = "duration", value_name = "SECS")]
    duration: Option<u64>,
    /// Output sample rate in Hz (snapped to the nearest supported rate)
    #[arg(short = 'r', long = "sample-rate", value_name = "HZ")]
    sample_rate: Option<u32>,
    /// Receiver center frequency in Hz
    #[arg(short = 'f', long = "frequency", value_name = "HZ")]
    frequency: Option<f64>,
    /// Output gain in dB
    #[arg(short = 'g', long = "gain", value_name = "DB", allow_hyphen_values = true)]
    gain: Option<f32>,
    /// Do not add white noise
    #[arg(long = "no-noise")]
    no_noise: bool,
}

/// Fold command-line overrides into the loaded configuration.
fn apply_cli(cli: &Cli, cfg: &mut ServerConfig) {
    if let Some(dir) = &cli.stations {
        cfg.stations.dir = dir.clone();
    }
    if let Some(path) = &cli.output {
        cfg.output.path = Some(path.clone());
    }
    if let Some(secs) = cli.duration {
        cfg.output.duration_secs = Some(secs);
    }
    if let Some(rate) = cli.sample_rate {
        cfg.engine.sample_rate = rate;
    }
    if let Some(freq) = cli.frequency {
        cfg.engine.center_frequency_hz = freq;
    }
    if let Some(gain) = cli.gain {
        cfg.engine.gain_db = gain;
    }
    if cli.no_noise {
        cfg.engine.add_noise = false;
    }
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ServerConfig::example_combined_toml());
        return Ok(());
    }

    let (mut cfg, config_path) = if let Some(ref path) = cli.config {
        let cfg = ServerConfig::load_from_file(path)?;
        (cfg, Some(path.clone()))
    } else {
        ServerConfig::load_from_default_paths()?
    };
    apply_cli(&cli, &mut cfg);
    cfg.validate()
        .map_err(|e| format!("Invalid server configuration: {}", e))?;

    init_logging(cfg.general.log_level.as_deref());

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let engine = SimulatorEngine::new(cfg.engine.clone())?;
    let sink = Arc::new(IqSink::create(cfg.output.path.as_deref())?);
    let stations = engine.init(&cfg.stations.dir, sink.clone())?;
    if stations == 0 {
        warn!(
            "No stations loaded from {}, output carries noise only",
            cfg.stations.dir.display()
        );
    }
    info!(
        "Starting fmsim-server ({} stations, {:.3} MHz, {} Hz output)",
        stations,
        engine.center_frequency() / 1e6,
        engine.sample_rate()
    );
    if let Some(ref path) = cfg.output.path {
        info!("Writing IQ to {}", path.display());
    }
    engine.start()?;

    let reason = match cfg.output.duration_secs {
        Some(secs) => tokio::select! {
            res = signal::ctrl_c() => {
                res?;
                "Ctrl+C received"
            }
            _ = tokio::time::sleep(Duration::from_secs(secs)) => "Run time elapsed",
        },
        None => {
            signal::ctrl_c().await?;
            "Ctrl+C received"
        }
    };
    info!("{}, shutting down", reason);

    tokio::task::spawn_blocking(move || engine.stop()).await?;
    sink.finish()?;
    info!(
        "Delivered {} blocks ({} samples)",
        sink.blocks(),
        sink.samples()
    );
    Ok(())
}
