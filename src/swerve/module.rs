// Per-wheel steering controller.
//
// `move_to` picks the target (possibly reversing the wheel to shorten steering
// travel), `execute` closes the loop on the steering angle and writes both
// actuators. Nothing is commanded until `execute`.

use tracing::{debug, trace, warn};

use super::hardware::{AngleSensor, MotorOutput, degrees_to_native, native_to_degrees};
use super::pid::PidController;

/// Angular error above which the wheel is flipped instead of turned
const REVERSE_THRESHOLD_DEG: f64 = 90.0;

/// Calibration fixed at startup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModuleCalibration {
    /// Sensor reading (native units) when the wheel points forward
    pub zero_offset: f64,
    /// Negate the drive output
    pub inverted: bool,
    /// Allow speed reversal to shorten steering travel
    pub allow_reverse: bool,
}

impl Default for ModuleCalibration {
    fn default() -> Self {
        Self {
            zero_offset: 0.0,
            inverted: false,
            allow_reverse: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Idle,
    Tracking,
}

/// Outputs written on the last `execute`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModuleOutputs {
    pub drive: f64,
    pub steer: f64,
}

pub struct SwerveModule {
    sensor: Box<dyn AngleSensor>,
    drive_motor: Box<dyn MotorOutput>,
    steer_motor: Box<dyn MotorOutput>,
    calibration: ModuleCalibration,
    pid: PidController,

    state: ModuleState,
    requested_speed: f64,
    requested_native: f64,
    last_outputs: ModuleOutputs,
}

impl SwerveModule {
    /// The PID is switched to continuous input over the sensor's full range here.
    pub fn new(
        sensor: Box<dyn AngleSensor>,
        drive_motor: Box<dyn MotorOutput>,
        steer_motor: Box<dyn MotorOutput>,
        calibration: ModuleCalibration,
        mut pid: PidController,
    ) -> Self {
        pid.enable_continuous_input(0.0, sensor.full_scale());

        Self {
            sensor,
            drive_motor,
            steer_motor,
            calibration,
            pid,
            state: ModuleState::Idle,
            requested_speed: 0.0,
            requested_native: calibration.zero_offset,
            last_outputs: ModuleOutputs::default(),
        }
    }

    /// Current wheel angle in [0, 360), relative to the calibrated zero
    pub fn current_angle_deg(&mut self) -> f64 {
        let full_scale = self.sensor.full_scale();
        let relative = (self.sensor.position_native() - self.calibration.zero_offset)
            .rem_euclid(full_scale);
        native_to_degrees(relative, full_scale).rem_euclid(360.0)
    }

    /// Request a wheel speed and absolute steering angle for the next `execute`.
    pub fn move_to(&mut self, speed: f64, angle_deg: f64) {
        let mut speed = speed;
        let mut angle = angle_deg.rem_euclid(360.0);

        if self.calibration.allow_reverse {
            let current = self.current_angle_deg();
            let error = shortest_angle_deg(angle - current);
            if error.abs() > REVERSE_THRESHOLD_DEG {
                debug!(
                    "Reversing wheel: target {:.1}° is {:.1}° from {:.1}°",
                    angle, error, current
                );
                speed = -speed;
                angle = (angle + 180.0).rem_euclid(360.0);
            }
        }

        self.requested_speed = speed;
        self.set_target_deg(angle);
        self.state = ModuleState::Tracking;
    }

    /// Run the steering loop once and command both actuators.
    pub fn execute(&mut self) {
        let measured = self.sensor.position_native();

        // A bad reading must not reach the PID memory; the next good one resumes tracking
        let steer = if !measured.is_finite() {
            warn!("Invalid steering sensor reading {}, holding steer", measured);
            0.0
        } else {
            let correction = self.pid.calculate(measured, self.requested_native);
            // Deadband: hold still once inside tolerance instead of dithering
            if self.pid.at_setpoint() {
                0.0
            } else {
                correction.clamp(-1.0, 1.0)
            }
        };

        let drive = if self.calibration.inverted {
            -self.requested_speed
        } else {
            self.requested_speed
        };

        trace!(
            "measured={:.1} target={:.1} steer={:.4} drive={:.3}",
            measured, self.requested_native, steer, drive
        );

        self.steer_motor.set(steer);
        self.drive_motor.set(drive);
        self.last_outputs = ModuleOutputs { drive, steer };
    }

    /// Return to the calibrated zero with no speed and empty PID memory.
    pub fn flush(&mut self) {
        self.requested_speed = 0.0;
        self.requested_native = self.calibration.zero_offset;
        self.pid.reset();
        self.state = ModuleState::Idle;
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// Speed that will be sent to the drive actuator, before inversion
    pub fn requested_speed(&self) -> f64 {
        self.requested_speed
    }

    /// Steering target in degrees relative to the calibrated zero
    pub fn requested_angle_deg(&self) -> f64 {
        let full_scale = self.sensor.full_scale();
        let relative = (self.requested_native - self.calibration.zero_offset).rem_euclid(full_scale);
        native_to_degrees(relative, full_scale)
    }

    pub fn last_outputs(&self) -> ModuleOutputs {
        self.last_outputs
    }

    fn set_target_deg(&mut self, angle_deg: f64) {
        let full_scale = self.sensor.full_scale();
        self.requested_native = (degrees_to_native(angle_deg, full_scale)
            + self.calibration.zero_offset)
            .rem_euclid(full_scale);
    }
}

/// Wrap an angle difference into (-180, 180].
pub fn shortest_angle_deg(delta: f64) -> f64 {
    let wrapped = delta.rem_euclid(360.0);
    if wrapped > 180.0 { wrapped - 360.0 } else { wrapped }
}
