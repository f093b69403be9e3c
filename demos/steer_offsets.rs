// Steer offset finder: READ-ONLY, prints each steer servo's present position
//
// Point every wheel straight ahead by hand, then copy the printed ticks into the
// `zero_offset` of each module in the drive config.
//
// Usage: cargo run --example steer_offsets -- [config.json] [port]

use std::io::{self, Write};

use swerve_zenoh_runtime::config::{DriveConfig, MOTOR_PORT};
use swerve_zenoh_runtime::motor::feetech::{FeetechBus, OperatingMode, POSITION_RESOLUTION};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => DriveConfig::load(path)?,
        None => DriveConfig::default(),
    };
    let port = args.next().unwrap_or_else(|| MOTOR_PORT.to_string());

    println!("Steer offset finder (read-only)");
    println!("Serial port: {}", port);
    println!();

    let mut bus = FeetechBus::open(&port)?;

    print!("Align all wheels straight ahead, then press Enter...");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    println!();

    for (id, module) in config.modules.iter() {
        let servo = module.steer_id;
        print!("  {:?} (steer servo {}): ", id, servo);
        io::stdout().flush()?;

        if !bus.ping(servo)? {
            println!("NO RESPONSE");
            continue;
        }

        let mode = match bus.operating_mode(servo) {
            Ok(Some(OperatingMode::Velocity)) => "velocity",
            Ok(Some(OperatingMode::Position)) => "position",
            Ok(Some(OperatingMode::Pwm)) => "pwm",
            Ok(None) => "unknown",
            Err(e) => {
                println!("ERROR reading mode - {}", e);
                continue;
            }
        };

        match bus.position(servo) {
            Ok(ticks) => {
                let deg = ticks as f64 * 360.0 / POSITION_RESOLUTION as f64;
                let moving = bus.velocity(servo).map(|v| v != 0).unwrap_or(false);
                println!(
                    "zero_offset = {:4} ({:5.1}°, {} mode{})",
                    ticks,
                    deg,
                    mode,
                    if moving { ", MOVING" } else { "" }
                );
            }
            Err(e) => println!("ERROR reading position - {}", e),
        }
    }

    println!();
    println!("Current config offsets:");
    for (id, module) in config.modules.iter() {
        println!("  {:?}: {}", id, module.zero_offset);
    }

    Ok(())
}
