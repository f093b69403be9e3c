// Loop timing, topics, hardware defaults and the startup drive configuration
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::swerve::hardware::{DEFAULT_COUNTS_PER_REV, DEFAULT_FULL_SCALE_VOLTS};
use crate::swerve::{
    ChassisGeometry, InputShaping, ModuleCalibration, ModuleId, ModuleSet, PidController,
};

// Runtime loop frequency (also the steering PID period)
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_MOTION: &str = "swerve/cmd/motion"; // forward/strafe/rotate
pub const TOPIC_CMD_MODE: &str = "swerve/cmd/mode"; // disabled/autonomous/teleop

// Serial port for the Feetech servo bus
pub const MOTOR_PORT: &str = "/dev/ttyUSB0";

// Enable hardware motor control (set to false for simulation/testing)
pub const MOTOR_ENABLED: bool = true;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Chassis dimensions must be positive, got half track {half_track_width}, half wheelbase {half_wheel_base}")]
    InvalidGeometry {
        half_track_width: f64,
        half_wheel_base: f64,
    },

    #[error("Module {module:?} sensor span must be positive, got {full_scale}")]
    InvalidSensorSpan {
        module: ModuleId,
        full_scale: f64,
    },

    #[error("Module {module:?} uses a sensor the {backend} backend cannot read")]
    UnsupportedSensor {
        module: ModuleId,
        backend: &'static str,
    },
}

/// Distances between wheel contact points, halved
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChassisConfig {
    pub half_track_width: f64,
    pub half_wheel_base: f64,
}

impl Default for ChassisConfig {
    fn default() -> Self {
        // 34.5" x 38" frame, in feet
        Self {
            half_track_width: (34.5 / 12.0) / 2.0,
            half_wheel_base: (38.0 / 12.0) / 2.0,
        }
    }
}

/// Steering angle sensor encoding
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorConfig {
    Ticks {
        #[serde(default = "default_counts_per_rev")]
        counts_per_rev: f64,
    },
    Analog {
        #[serde(default = "default_full_scale_volts")]
        full_scale_volts: f64,
    },
}

fn default_counts_per_rev() -> f64 {
    DEFAULT_COUNTS_PER_REV
}

fn default_full_scale_volts() -> f64 {
    DEFAULT_FULL_SCALE_VOLTS
}

impl SensorConfig {
    /// Native units in one revolution
    pub fn full_scale(&self) -> f64 {
        match *self {
            SensorConfig::Ticks { counts_per_rev } => counts_per_rev,
            SensorConfig::Analog { full_scale_volts } => full_scale_volts,
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig::Ticks {
            counts_per_rev: DEFAULT_COUNTS_PER_REV,
        }
    }
}

/// Steering loop gains; tolerances are in the sensor's native units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub position_tolerance: f64,
    pub velocity_tolerance: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 0.000083,
            ki: 0.0,
            kd: 0.0,
            position_tolerance: 0.8,
            velocity_tolerance: 0.8,
        }
    }
}

impl PidGains {
    pub fn build(&self, period: f64) -> PidController {
        let mut pid = PidController::new(self.kp, self.ki, self.kd, period);
        pid.set_tolerance(self.position_tolerance, self.velocity_tolerance);
        pid
    }
}

/// Wiring and calibration for one wheel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub drive_id: u8,
    pub steer_id: u8,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub zero_offset: f64,
    #[serde(default)]
    pub inverted: bool,
    #[serde(default = "default_allow_reverse")]
    pub allow_reverse: bool,
    #[serde(default)]
    pub pid: PidGains,
}

fn default_allow_reverse() -> bool {
    true
}

impl ModuleConfig {
    fn new(drive_id: u8, steer_id: u8) -> Self {
        Self {
            drive_id,
            steer_id,
            sensor: SensorConfig::default(),
            zero_offset: 0.0,
            inverted: false,
            allow_reverse: true,
            pid: PidGains::default(),
        }
    }

    pub fn calibration(&self) -> ModuleCalibration {
        ModuleCalibration {
            zero_offset: self.zero_offset,
            inverted: self.inverted,
            allow_reverse: self.allow_reverse,
        }
    }
}

fn default_modules() -> ModuleSet<ModuleConfig> {
    ModuleSet {
        front_left: ModuleConfig::new(6, 5),
        front_right: ModuleConfig {
            zero_offset: -527.0,
            ..ModuleConfig::new(8, 7)
        },
        rear_left: ModuleConfig::new(3, 4),
        rear_right: ModuleConfig::new(1, 2),
    }
}

/// Everything the drive needs at startup. Loaded once, never reloaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveConfig {
    #[serde(default)]
    pub chassis: ChassisConfig,
    #[serde(default)]
    pub shaping: InputShaping,
    #[serde(default = "default_modules")]
    pub modules: ModuleSet<ModuleConfig>,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            chassis: ChassisConfig::default(),
            shaping: InputShaping::default(),
            modules: default_modules(),
        }
    }
}

impl DriveConfig {
    /// Read and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: DriveConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ChassisConfig {
            half_track_width,
            half_wheel_base,
        } = self.chassis;
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(half_track_width) || !positive(half_wheel_base) {
            return Err(ConfigError::InvalidGeometry {
                half_track_width,
                half_wheel_base,
            });
        }

        // Offsets are not corrected here; a bad one only shows up as a steering bias
        for (id, module) in self.modules.iter() {
            let full_scale = module.sensor.full_scale();
            if !positive(full_scale) {
                return Err(ConfigError::InvalidSensorSpan {
                    module: id,
                    full_scale,
                });
            }
            if module.zero_offset.abs() >= full_scale {
                warn!(
                    "{:?}: zero offset {} outside sensor range (+/-{})",
                    id, module.zero_offset, full_scale
                );
            }
        }
        Ok(())
    }

    pub fn geometry(&self) -> ChassisGeometry {
        ChassisGeometry::new(self.chassis.half_track_width, self.chassis.half_wheel_base)
    }

    /// Control cycle period in seconds
    pub fn loop_period(&self) -> f64 {
        1.0 / LOOP_HZ as f64
    }
}
