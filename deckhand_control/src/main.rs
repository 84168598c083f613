//! # Deckhand
//!
//! Starts a simulator-backed motion coordinator, scans the mounts, homes the
//! machine and reports the resulting state as JSON on stdout.

use clap::Parser;
use deckhand_common::config::{LogLevel, RobotConfig};
use deckhand_common::types::Mount;
use deckhand_control::HardwareControl;
use deckhand_hal::Simulator;
use deckhand_hal::modules::thermocycler::THERMOCYCLER_NAME;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Deckhand - liquid-handling motion engine
#[derive(Parser, Debug)]
#[command(name = "deckhand")]
#[command(version)]
#[command(about = "Motion and liquid-handling engine for a pipetting robot")]
struct Args {
    /// Robot settings TOML. Missing files fall back to defaults.
    #[arg(long, default_value = "config/robot.toml")]
    config: PathBuf,

    /// Pipette model on the left mount (simulated).
    #[arg(long, value_name = "MODEL")]
    left: Option<String>,

    /// Pipette model on the right mount (simulated).
    #[arg(long, value_name = "MODEL")]
    right: Option<String>,

    /// Attach a simulated thermocycler on this port.
    #[arg(long, value_name = "PORT")]
    thermocycler: Option<String>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let config = match RobotConfig::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {e}");
            process::exit(1);
        }
    };
    setup_tracing(&args, config.log_level);

    info!("Deckhand v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Loaded robot settings from {:?}", args.config);

    if let Err(e) = run(&args, config) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Deckhand shutdown complete");
}

fn run(args: &Args, config: RobotConfig) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let mut sim = Simulator::new().lenient();
        if let Some(port) = &args.thermocycler {
            sim = sim.with_module(THERMOCYCLER_NAME, port);
        }

        let mut require = BTreeMap::new();
        if let Some(model) = &args.left {
            require.insert(Mount::Left, model.clone());
        }
        if let Some(model) = &args.right {
            require.insert(Mount::Right, model.clone());
        }

        let hardware = HardwareControl::new(Arc::new(sim), config)?.with_settings_path(&args.config);
        hardware.cache_instruments(&require).await?;
        hardware.home(None).await?;
        hardware.discover_modules().await?;

        let mut positions = BTreeMap::new();
        for mount in Mount::ALL {
            let position = hardware.gantry_position(mount, None).await?;
            info!("{} mount at {}", mount, position);
            positions.insert(mount, position);
        }

        let status = json!({
            "firmware": hardware.fw_version(),
            "instruments": hardware.attached_instruments(),
            "positions": positions,
            "modules": hardware.attached_modules().await,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, log_level: LogLevel) {
    let level = if args.verbose {
        LogLevel::Debug
    } else {
        log_level
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
