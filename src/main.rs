use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use swerve_zenoh_runtime::config::{DriveConfig, MOTOR_ENABLED, MOTOR_PORT};
use swerve_zenoh_runtime::messages::RobotMode;
use swerve_zenoh_runtime::runtime::{self, BackendKind};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StartMode {
    Disabled,
    Autonomous,
    Teleop,
}

impl From<StartMode> for RobotMode {
    fn from(mode: StartMode) -> Self {
        match mode {
            StartMode::Disabled => RobotMode::Disabled,
            StartMode::Autonomous => RobotMode::Autonomous,
            StartMode::Teleop => RobotMode::Teleop,
        }
    }
}

/// Swerve drive runtime: zenoh motion commands in, steered wheels out
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// JSON drive configuration (built-in defaults when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run against simulated axes instead of the servo bus
    #[arg(long)]
    sim: bool,

    /// Serial port of the servo bus
    #[arg(long, default_value = MOTOR_PORT)]
    port: String,

    /// Mode to enter at startup; later changes arrive over zenoh
    #[arg(long, value_enum, default_value = "disabled")]
    mode: StartMode,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match DriveConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Config error: {}", e);
                std::process::exit(1);
            }
        },
        None => DriveConfig::default(),
    };

    let backend = if args.sim || !MOTOR_ENABLED {
        BackendKind::Simulated
    } else {
        BackendKind::Feetech { port: args.port }
    };
    info!("Backend: {:?}", backend);

    if let Err(e) = runtime::run(config, backend, args.mode.into()).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
