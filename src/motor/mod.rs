// Servo hardware for the swerve base
//
// Provides:
// - Feetech STS serial protocol implementation
// - Feetech-backed actuator outputs and steer encoders for the swerve core

mod driver;
pub mod feetech;

pub use driver::{DriverError, MAX_RAW, MotorDriver, output_to_raw};
pub use feetech::{FeetechBus, FeetechError};
