// Simulated swerve hardware
//
// Each axis is a first-order model: the commanded output in [-1, 1] is a fraction
// of the axis' top rate. Steer axes integrate their position and wrap it over one
// revolution in the configured sensor's native units, so both tick and analog
// encodings can be exercised without a bus.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::info;

use crate::config::{DriveConfig, SensorConfig};
use crate::runtime::{Backend, BackendResult};
use crate::swerve::hardware::{
    AnalogEncoder, AngleSensor, MotorOutput, TickEncoder, TickSource, VoltageSource,
};
use crate::swerve::{ModuleId, ModuleSet, SwerveDrive, SwerveModule};

/// Steering top speed, revolutions per second at full output
const STEER_REVS_PER_SEC: f64 = 2.0;

#[derive(Debug)]
struct AxisState {
    position: f64,
    output: f64,
    full_scale: f64,
    max_rate: f64,
}

/// Shared handle to one simulated axis
#[derive(Debug, Clone)]
pub struct SimAxis(Rc<RefCell<AxisState>>);

impl SimAxis {
    pub fn new(position: f64, full_scale: f64) -> Self {
        Self(Rc::new(RefCell::new(AxisState {
            position: position.rem_euclid(full_scale),
            output: 0.0,
            full_scale,
            max_rate: STEER_REVS_PER_SEC * full_scale,
        })))
    }

    /// Advance the axis by `dt` seconds at its current output
    pub fn step(&self, dt: f64) {
        let mut axis = self.0.borrow_mut();
        let full_scale = axis.full_scale;
        axis.position = (axis.position + axis.output * axis.max_rate * dt).rem_euclid(full_scale);
    }

    pub fn position(&self) -> f64 {
        self.0.borrow().position
    }

    pub fn output(&self) -> f64 {
        self.0.borrow().output
    }
}

impl MotorOutput for SimAxis {
    fn set(&mut self, value: f64) {
        self.0.borrow_mut().output = value;
    }
}

impl TickSource for SimAxis {
    fn read_ticks(&mut self) -> i32 {
        self.position().round() as i32
    }
}

impl VoltageSource for SimAxis {
    fn read_volts(&mut self) -> f64 {
        self.position()
    }
}

/// Simulated drivetrain: one steer and one drive axis per module
pub struct SimBackend {
    steer: ModuleSet<SimAxis>,
    drive: ModuleSet<SimAxis>,
}

impl SimBackend {
    /// Wire a swerve drive to simulated axes. Every wheel starts pointing forward.
    pub fn build(config: &DriveConfig) -> (SwerveDrive, SimBackend) {
        let steer = ModuleSet::from_fn(|id| {
            let module = &config.modules[id];
            SimAxis::new(module.zero_offset, module.sensor.full_scale())
        });
        let drive = ModuleSet::from_fn(|_| SimAxis::new(0.0, 1.0));

        let modules = ModuleSet::from_fn(|id| {
            let module = &config.modules[id];
            let axis = steer[id].clone();
            let sensor: Box<dyn AngleSensor> = match module.sensor {
                SensorConfig::Ticks { counts_per_rev } => {
                    Box::new(TickEncoder::new(axis.clone(), counts_per_rev))
                }
                SensorConfig::Analog { full_scale_volts } => {
                    Box::new(AnalogEncoder::new(axis.clone(), full_scale_volts))
                }
            };

            SwerveModule::new(
                sensor,
                Box::new(drive[id].clone()),
                Box::new(axis),
                module.calibration(),
                module.pid.build(config.loop_period()),
            )
        });

        info!("Simulated swerve drive ready");
        let drive_train = SwerveDrive::new(config.geometry(), config.shaping, modules);
        (drive_train, SimBackend { steer, drive })
    }

    /// Advance every steer axis by `dt` seconds
    pub fn step(&mut self, dt: f64) {
        for (_, axis) in self.steer.iter() {
            axis.step(dt);
        }
    }

    pub fn steer_axis(&self, id: ModuleId) -> &SimAxis {
        &self.steer[id]
    }

    pub fn drive_axis(&self, id: ModuleId) -> &SimAxis {
        &self.drive[id]
    }
}

impl Backend for SimBackend {
    fn end_cycle(&mut self, dt: f64) -> BackendResult {
        self.step(dt);
        Ok(())
    }

    fn stop(&mut self) -> BackendResult {
        for (_, axis) in self.steer.iter_mut().chain(self.drive.iter_mut()) {
            axis.set(0.0);
        }
        Ok(())
    }
}
