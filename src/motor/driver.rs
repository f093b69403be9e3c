// Feetech-backed swerve hardware
//
// All eight servos (one drive, one steer per module) share one serial bus. Motor
// outputs written during a cycle are queued and sent together in a single
// sync-write at the end of the cycle; steer positions are read on demand.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, info, warn};

use super::feetech::{FeetechBus, FeetechError, OperatingMode, POSITION_RESOLUTION};
use crate::config::{ConfigError, DriveConfig, SensorConfig};
use crate::runtime::{Backend, BackendResult};
use crate::swerve::hardware::{MotorOutput, TickEncoder, TickSource};
use crate::swerve::{ModuleId, ModuleSet, SwerveDrive, SwerveModule};

/// Goal velocity sent for a full-scale (1.0) output
pub const MAX_RAW: i16 = 3000;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error(transparent)]
    Bus(#[from] FeetechError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

struct BusState {
    bus: FeetechBus,
    pending: Vec<(u8, i16)>,
}

type SharedBus = Rc<RefCell<BusState>>;

/// Map an output in [-1, 1] to a raw goal velocity
pub fn output_to_raw(value: f64) -> i16 {
    (value.clamp(-1.0, 1.0) * MAX_RAW as f64).round() as i16
}

/// One servo used as a motor output
struct ServoOutput {
    bus: SharedBus,
    id: u8,
}

impl MotorOutput for ServoOutput {
    fn set(&mut self, value: f64) {
        self.bus.borrow_mut().pending.push((self.id, output_to_raw(value)));
    }
}

/// One servo's present-position register used as a tick counter
struct ServoPosition {
    bus: SharedBus,
    id: u8,
    last: i32,
}

impl TickSource for ServoPosition {
    fn read_ticks(&mut self) -> i32 {
        match self.bus.borrow_mut().bus.position(self.id) {
            Ok(ticks) => self.last = ticks as i32,
            // The last good reading is reused; the loop corrects on the next cycle
            Err(e) => warn!("Servo {} position read failed: {}", self.id, e),
        }
        self.last
    }
}

/// Swerve drive hardware on a Feetech servo bus
pub struct MotorDriver {
    bus: SharedBus,
    servo_ids: Vec<u8>,
}

impl MotorDriver {
    /// Open the bus, put every servo in velocity mode and wire up the drive.
    pub fn open(port: &str, config: &DriveConfig) -> Result<(SwerveDrive, MotorDriver), DriverError> {
        // Present position is always reported over one 4096-tick turn
        for (id, module) in config.modules.iter() {
            let readable = matches!(
                module.sensor,
                SensorConfig::Ticks { counts_per_rev } if counts_per_rev == POSITION_RESOLUTION as f64
            );
            if !readable {
                return Err(ConfigError::UnsupportedSensor {
                    module: id,
                    backend: "feetech",
                }
                .into());
            }
        }

        info!("Opening servo bus on {}", port);
        let bus = FeetechBus::open(port)?;
        let mut driver = MotorDriver {
            bus: Rc::new(RefCell::new(BusState {
                bus,
                pending: Vec::with_capacity(8),
            })),
            servo_ids: config
                .modules
                .iter()
                .flat_map(|(_, m)| [m.drive_id, m.steer_id])
                .collect(),
        };
        driver.initialize()?;

        let modules = ModuleSet::from_fn(|id| driver.build_module(id, config));
        let drive = SwerveDrive::new(config.geometry(), config.shaping, modules);
        Ok((drive, driver))
    }

    /// Disable torque, switch to velocity mode, re-enable torque
    fn initialize(&mut self) -> Result<(), FeetechError> {
        info!("Initializing servos {:?} for velocity control", self.servo_ids);
        let mut state = self.bus.borrow_mut();
        let bus = &mut state.bus;

        for &id in &self.servo_ids {
            if !bus.ping(id)? {
                warn!("Servo {} not responding to ping", id);
                return Err(FeetechError::Timeout { id });
            }
            debug!("Servo {} responding", id);
        }

        for &id in &self.servo_ids {
            bus.disable_torque(id)?;
            bus.set_operating_mode(id, OperatingMode::Velocity)?;
            bus.enable_torque(id)?;
        }

        info!("Servos initialized");
        Ok(())
    }

    fn build_module(&self, id: ModuleId, config: &DriveConfig) -> SwerveModule {
        let module = &config.modules[id];
        let encoder = TickEncoder::new(
            ServoPosition {
                bus: self.bus.clone(),
                id: module.steer_id,
                last: module.zero_offset as i32,
            },
            module.sensor.full_scale(),
        );

        SwerveModule::new(
            Box::new(encoder),
            Box::new(ServoOutput {
                bus: self.bus.clone(),
                id: module.drive_id,
            }),
            Box::new(ServoOutput {
                bus: self.bus.clone(),
                id: module.steer_id,
            }),
            module.calibration(),
            module.pid.build(config.loop_period()),
        )
    }

    /// Send every output queued since the last flush
    pub fn flush_outputs(&mut self) -> Result<(), FeetechError> {
        let mut state = self.bus.borrow_mut();
        let pending = std::mem::take(&mut state.pending);
        state.bus.sync_write_velocities(&pending)
    }

    /// Stop every servo immediately
    pub fn stop(&mut self) -> Result<(), FeetechError> {
        info!("Stopping all servos");
        let mut state = self.bus.borrow_mut();
        state.pending.clear();
        let zeros: Vec<(u8, i16)> = self.servo_ids.iter().map(|&id| (id, 0)).collect();
        state.bus.sync_write_velocities(&zeros)
    }
}

impl Backend for MotorDriver {
    fn end_cycle(&mut self, _dt: f64) -> BackendResult {
        self.flush_outputs()?;
        Ok(())
    }

    fn stop(&mut self) -> BackendResult {
        MotorDriver::stop(self)?;
        Ok(())
    }
}

impl Drop for MotorDriver {
    fn drop(&mut self) {
        // Try to stop servos when driver is dropped
        if let Err(e) = MotorDriver::stop(self) {
            warn!("Failed to stop servos on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_to_raw() {
        assert_eq!(output_to_raw(0.0), 0);
        assert_eq!(output_to_raw(1.0), MAX_RAW);
        assert_eq!(output_to_raw(-0.5), -1500);
        assert_eq!(output_to_raw(7.0), MAX_RAW);
        assert_eq!(output_to_raw(-7.0), -MAX_RAW);
    }

    #[test]
    fn test_analog_sensor_rejected_before_opening_port() {
        let mut config = DriveConfig::default();
        config.modules.rear_left.sensor = SensorConfig::Analog {
            full_scale_volts: 5.0,
        };

        let err = MotorDriver::open("/dev/does-not-exist", &config).err().unwrap();
        assert!(matches!(
            err,
            DriverError::Config(ConfigError::UnsupportedSensor {
                module: ModuleId::RearLeft,
                ..
            })
        ));
    }

    #[test]
    fn test_tick_resolution_must_match_servo() {
        let mut config = DriveConfig::default();
        config.modules.front_right.sensor = SensorConfig::Ticks {
            counts_per_rev: 1024.0,
        };

        let err = MotorDriver::open("/dev/does-not-exist", &config).err().unwrap();
        assert!(matches!(
            err,
            DriverError::Config(ConfigError::UnsupportedSensor {
                module: ModuleId::FrontRight,
                ..
            })
        ));
    }
}
