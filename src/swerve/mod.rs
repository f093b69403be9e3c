// Swerve drive core for a four-wheel, independently steered base
//
// Provides:
// - Inverse kinematics (chassis motion -> per-wheel speed and angle)
// - Per-wheel steering control (reverse optimization, wrapping PID, deadband)
// - Capability traits for actuators and angle sensors

mod drive;
pub mod hardware;
pub mod kinematics;
pub mod module;
pub mod pid;

pub use drive::{InputShaping, SwerveDrive, square_input};
pub use kinematics::{
    ChassisGeometry, ModuleCommand, ModuleId, ModuleSet, MotionRequest, inverse_kinematics,
    normalize,
};
pub use module::{ModuleCalibration, ModuleOutputs, ModuleState, SwerveModule};
pub use pid::PidController;
