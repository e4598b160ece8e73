//! # Rig Supervisor
//!
//! Daemon entry point: loads configuration, opens the PWM expander (or the
//! simulation backend), wires the motion core, arms the watchdog and runs
//! the periodic status push until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::time::interval;
use tracing::{error, info, warn};

use rig_common::config::RigConfig;
use rig_common::events::Event;
use rig_control::Rig;
use rig_hal::{Pca9685Driver, PwmDriver, SimDriver};

/// Status push cadence (2 Hz).
const STATUS_PUSH_INTERVAL: Duration = Duration::from_millis(500);

/// Animatronic servo rig supervisor.
#[derive(Debug, Parser)]
#[command(name = "rig", version, about)]
struct Args {
    /// Configuration file (TOML). Missing file falls back to defaults.
    #[arg(short, long, default_value = "rig.toml")]
    config: PathBuf,

    /// Use the simulation backend instead of the PCA9685.
    #[arg(long)]
    simulation: bool,

    /// Registry persistence file, overriding the configuration.
    #[arg(long)]
    registry: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt().compact().init();
    let args = Args::parse();

    let config = match RigConfig::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };

    let simulation = args.simulation || config.device.simulation;
    let driver: Box<dyn PwmDriver> = if simulation {
        info!("using simulation backend");
        Box::new(SimDriver::new())
    } else {
        match Pca9685Driver::new(
            config.device.i2c_bus,
            config.device.address,
            config.device.frequency_hz,
        ) {
            Ok(driver) => Box::new(driver),
            Err(e) => {
                error!(error = %e, "failed to open the PWM expander");
                std::process::exit(1);
            }
        }
    };

    let registry_path = args
        .registry
        .or(config.registry_path.clone())
        .unwrap_or_else(|| PathBuf::from("servo_config.json"));
    info!(registry = %registry_path.display(), "starting rig");

    let rig = Rig::new(driver, Some(registry_path));
    rig.start();
    if config.watchdog.enabled {
        rig.safety().watchdog_start(config.watchdog.timeout_ms, None);
    }

    run_until_interrupted(&rig).await;

    rig.cleanup();
    info!("rig supervisor exited");
}

/// Push status snapshots at 2 Hz until Ctrl-C.
async fn run_until_interrupted(rig: &Arc<Rig>) {
    let mut status_push = interval(STATUS_PUSH_INTERVAL);
    loop {
        tokio::select! {
            _ = status_push.tick() => {
                match serde_json::to_value(rig.status()) {
                    Ok(snapshot) => rig.events().emit(&Event::StatusUpdate { snapshot }),
                    Err(e) => warn!(error = %e, "status serialization failed"),
                }
            }
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "signal handler failed");
                }
                info!("interrupt received, shutting down");
                break;
            }
        }
    }
}
