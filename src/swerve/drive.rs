// Swerve drive coordinator
//
// Holds the chassis geometry and the four modules. Each cycle the host supplies a
// motion request, then calls `compute_and_dispatch`, which turns it into wheel
// commands, hands them to the modules and runs them. Requests and commands are
// consumed once: a cycle without a fresh `set_motion` drives every wheel to zero.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::kinematics::{
    ChassisGeometry, ModuleCommand, ModuleId, ModuleSet, MotionRequest, inverse_kinematics,
};
use super::module::SwerveModule;

/// Response shaping applied by the filtered setters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputShaping {
    /// Square each channel's magnitude, keeping its sign
    pub squared_inputs: bool,
    /// Gain on forward and strafe
    pub xy_multiplier: f64,
    /// Gain on rotation
    pub rotation_multiplier: f64,
}

impl Default for InputShaping {
    fn default() -> Self {
        Self {
            squared_inputs: true,
            xy_multiplier: 1.0,
            rotation_multiplier: 1.0,
        }
    }
}

impl InputShaping {
    fn translation(&self, value: f64) -> f64 {
        self.curve(value) * self.xy_multiplier
    }

    fn rotation(&self, value: f64) -> f64 {
        self.curve(value) * self.rotation_multiplier
    }

    fn curve(&self, value: f64) -> f64 {
        if self.squared_inputs {
            square_input(value)
        } else {
            value
        }
    }
}

/// Square the magnitude, keep the sign
pub fn square_input(value: f64) -> f64 {
    (value * value).copysign(value)
}

pub struct SwerveDrive {
    geometry: ChassisGeometry,
    shaping: InputShaping,
    modules: ModuleSet<SwerveModule>,

    requested: MotionRequest,
}

impl SwerveDrive {
    pub fn new(
        geometry: ChassisGeometry,
        shaping: InputShaping,
        modules: ModuleSet<SwerveModule>,
    ) -> Self {
        Self {
            geometry,
            shaping,
            modules,
            requested: MotionRequest::zero(),
        }
    }

    /// Set all three channels through the input shaping.
    ///
    /// No range check: oversized values are scaled down jointly at compute time.
    pub fn set_motion(&mut self, forward: f64, strafe: f64, rotate: f64) {
        self.set_forward(forward);
        self.set_strafe(strafe);
        self.set_rotate(rotate);
    }

    /// Set all three channels without shaping.
    pub fn set_raw_motion(&mut self, forward: f64, strafe: f64, rotate: f64) {
        self.requested = MotionRequest::new(forward, strafe, rotate);
    }

    pub fn set_forward(&mut self, forward: f64) {
        self.requested.forward = self.shaping.translation(forward);
    }

    pub fn set_strafe(&mut self, strafe: f64) {
        self.requested.strafe = self.shaping.translation(strafe);
    }

    pub fn set_rotate(&mut self, rotate: f64) {
        self.requested.rotate = self.shaping.rotation(rotate);
    }

    pub fn set_raw_forward(&mut self, forward: f64) {
        self.requested.forward = forward;
    }

    pub fn set_raw_strafe(&mut self, strafe: f64) {
        self.requested.strafe = strafe;
    }

    pub fn set_raw_rotate(&mut self, rotate: f64) {
        self.requested.rotate = rotate;
    }

    pub fn set_squared_inputs(&mut self, enabled: bool) {
        self.shaping.squared_inputs = enabled;
    }

    /// Discard the pending request and flush every module's controller.
    /// Call on every mode entry.
    pub fn reset(&mut self) {
        debug!("Flushing swerve drive");
        self.requested = MotionRequest::zero();
        for (_, module) in self.modules.iter_mut() {
            module.flush();
        }
    }

    /// Run one control cycle and return the commands that were dispatched.
    pub fn compute_and_dispatch(&mut self) -> ModuleSet<ModuleCommand> {
        let dispatched = inverse_kinematics(&self.geometry, self.requested);
        self.requested = MotionRequest::zero();

        for (id, module) in self.modules.iter_mut() {
            let cmd = dispatched[id];
            trace!(
                "{:?}: speed={:.3} angle={:.1}°",
                id, cmd.speed, cmd.angle_deg
            );
            module.move_to(cmd.speed, cmd.angle_deg);
        }

        for (_, module) in self.modules.iter_mut() {
            module.execute();
        }

        dispatched
    }

    /// The request that the next `compute_and_dispatch` will consume
    pub fn pending_request(&self) -> MotionRequest {
        self.requested
    }

    pub fn module(&self, id: ModuleId) -> &SwerveModule {
        &self.modules[id]
    }

    pub fn module_mut(&mut self, id: ModuleId) -> &mut SwerveModule {
        &mut self.modules[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriveConfig;
    use crate::sim::SimBackend;
    use crate::swerve::module::ModuleState;

    const EPS: f64 = 1e-9;

    fn sim_drive() -> (SwerveDrive, SimBackend) {
        let mut config = DriveConfig::default();
        for (_, module) in config.modules.iter_mut() {
            module.zero_offset = 0.0;
        }
        SimBackend::build(&config)
    }

    fn max_speed(commands: &ModuleSet<ModuleCommand>) -> f64 {
        commands
            .iter()
            .fold(0.0f64, |acc, (_, c)| acc.max(c.speed.abs()))
    }

    #[test]
    fn test_square_input_keeps_sign() {
        assert_eq!(square_input(0.5), 0.25);
        assert_eq!(square_input(-0.5), -0.25);
        assert_eq!(square_input(0.0), 0.0);
    }

    #[test]
    fn test_set_motion_shapes_inputs() {
        let (mut drive, _sim) = sim_drive();
        drive.shaping.xy_multiplier = 0.5;
        drive.shaping.rotation_multiplier = 2.0;

        drive.set_motion(0.5, -1.0, -0.5);
        let req = drive.pending_request();
        assert!((req.forward - 0.125).abs() < EPS);
        assert!((req.strafe + 0.5).abs() < EPS);
        assert!((req.rotate + 0.5).abs() < EPS);

        drive.set_squared_inputs(false);
        drive.set_motion(0.5, 0.0, 0.0);
        assert!((drive.pending_request().forward - 0.25).abs() < EPS);
    }

    #[test]
    fn test_raw_motion_bypasses_shaping() {
        let (mut drive, _sim) = sim_drive();
        drive.set_raw_motion(0.5, 3.0, -0.2);
        assert_eq!(drive.pending_request(), MotionRequest::new(0.5, 3.0, -0.2));

        drive.set_raw_strafe(0.1);
        assert_eq!(drive.pending_request().strafe, 0.1);
    }

    #[test]
    fn test_zero_motion_zero_speed() {
        let (mut drive, _sim) = sim_drive();
        drive.set_motion(0.0, 0.0, 0.0);
        let commands = drive.compute_and_dispatch();
        for (id, c) in commands.iter() {
            assert_eq!(c.speed, 0.0);
            assert_eq!(drive.module(id).last_outputs().drive, 0.0);
        }
    }

    #[test]
    fn test_speed_bound_after_dispatch() {
        let (mut drive, _sim) = sim_drive();
        drive.set_raw_motion(5.0, -3.0, 2.0);
        let commands = drive.compute_and_dispatch();
        assert!(max_speed(&commands) <= 1.0 + EPS);
        for (id, _) in commands.iter() {
            assert!(drive.module(id).last_outputs().drive.abs() <= 1.0 + EPS);
        }
    }

    #[test]
    fn test_consumed_once() {
        let (mut drive, _sim) = sim_drive();
        drive.set_raw_motion(1.0, 0.0, 0.0);
        let first = drive.compute_and_dispatch();
        assert!((max_speed(&first) - 1.0).abs() < EPS);

        let second = drive.compute_and_dispatch();
        for (id, c) in second.iter() {
            assert_eq!(c.speed, 0.0);
            assert_eq!(drive.module(id).requested_speed(), 0.0);
        }
    }

    #[test]
    fn test_pure_forward_dispatches_straight_ahead() {
        let (mut drive, _sim) = sim_drive();
        drive.set_raw_motion(0.8, 0.0, 0.0);
        drive.compute_and_dispatch();
        for id in ModuleId::ALL {
            let module = drive.module(id);
            assert!((module.requested_speed() - 0.8).abs() < EPS);
            assert!(module.requested_angle_deg().abs() < 1e-6);
            // Wheels already point forward, so steering holds still
            assert_eq!(module.last_outputs().steer, 0.0);
        }
    }

    #[test]
    fn test_reset_flushes_modules() {
        let (mut drive, _sim) = sim_drive();
        drive.set_raw_motion(0.0, 0.0, 1.0);
        drive.compute_and_dispatch();
        assert_eq!(drive.module(ModuleId::FrontLeft).state(), ModuleState::Tracking);

        drive.set_raw_motion(1.0, 1.0, 1.0);
        drive.reset();
        assert_eq!(drive.pending_request(), MotionRequest::zero());
        for id in ModuleId::ALL {
            assert_eq!(drive.module(id).state(), ModuleState::Idle);
            assert_eq!(drive.module(id).requested_speed(), 0.0);
        }
    }

    #[test]
    fn test_rotation_converges_in_sim() {
        let (mut drive, mut sim) = sim_drive();
        for _ in 0..400 {
            drive.set_raw_motion(0.0, 0.0, 0.5);
            drive.compute_and_dispatch();
            sim.step(0.02);
        }

        // Every wheel ends up on its tangent, either way round
        for id in ModuleId::ALL {
            let target = drive.module(id).requested_angle_deg();
            let actual = drive.module_mut(id).current_angle_deg();
            let error = crate::swerve::module::shortest_angle_deg(target - actual);
            assert!(error.abs() < 2.0, "{:?}: target {} actual {}", id, target, actual);
        }
    }
}
