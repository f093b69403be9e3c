// Message types received by the runtime

use serde::{Deserialize, Serialize};

// Motion request from teleop/scripts -> runtime, one channel per axis in [-1, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionCommand {
    pub forward: f64,
    pub strafe: f64,
    pub rotate: f64,
}

/// Competition-style robot modes. Entering any enabled mode flushes the drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotMode {
    Disabled,
    Autonomous,
    Teleop,
}

impl RobotMode {
    pub fn is_enabled(self) -> bool {
        self != RobotMode::Disabled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeCommand {
    pub mode: RobotMode,
}

/// Runtime health, tracked for log transitions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    Disabled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_command_wire_format() {
        let cmd: ModeCommand = serde_json::from_str(r#"{"mode":"teleop"}"#).unwrap();
        assert_eq!(cmd.mode, RobotMode::Teleop);
        assert!(cmd.mode.is_enabled());
        assert!(!RobotMode::Disabled.is_enabled());
    }

    #[test]
    fn test_motion_command_rejects_missing_channel() {
        assert!(serde_json::from_str::<MotionCommand>(r#"{"forward":0.5,"strafe":0.0}"#).is_err());
    }
}
