// Timeouts, topics, module geometry and default gains
use std::f64::consts::PI;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::swerve::gains::{GainProfile, GainProfiles, GainSet, OperatingMode};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topic prefix; full keys are "swerve/<module>/<suffix>"
pub const TOPIC_PREFIX: &str = "swerve";
pub const TOPIC_CMD: &str = "cmd"; // commands
pub const TOPIC_TELEMETRY: &str = "telemetry"; // state + position + faults
pub const TOPIC_HEALTH: &str = "state/health"; // health status
pub const TOPIC_ALERTS: &str = "alerts"; // raised alert messages
pub const TOPIC_TUNING: &str = "tuning"; // live tuning + debug numbers

pub const DEFAULT_MODULE_NAME: &str = "front_left";

// Device ids on the bus
pub const DRIVE_MOTOR_ID: u8 = 1;
pub const STEER_MOTOR_ID: u8 = 2;
pub const ANGLE_SENSOR_ID: u8 = 3;

// Drive rotor rotations per wheel rotation
pub const DRIVE_GEAR_RATIO: f64 = 6.12;
// 4 inch wheel
pub const WHEEL_CIRCUMFERENCE_M: f64 = 0.1016 * PI;

// Default gains
pub const DRIVE_GAINS_TELEOP: GainSet = GainSet::pid(0.25, 0.0, 0.0).with_v(0.125);
pub const STEER_GAINS_TELEOP: GainSet = GainSet::pid(45.0, 0.0, 0.8);
pub const DRIVE_GAINS_AUTO: GainSet = GainSet::pid(0.2, 0.02, 0.0).with_v(0.12);
pub const STEER_GAINS_AUTO: GainSet = GainSet::pid(50.0, 0.0, 1.0);

/// Error types for module configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be positive and finite, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("Motor id {id} is used by both drive and steer")]
    DuplicateDeviceId { id: u8 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Per-module configuration, loadable from JSON
///
/// Missing fields fall back to the constants above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    pub name: String,
    pub drive_id: u8,
    pub steer_id: u8,
    pub encoder_id: u8,
    pub drive_gear_ratio: f64,
    pub wheel_circumference: f64,
    pub initial_mode: OperatingMode,
    pub gains: GainProfiles,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_MODULE_NAME.to_string(),
            drive_id: DRIVE_MOTOR_ID,
            steer_id: STEER_MOTOR_ID,
            encoder_id: ANGLE_SENSOR_ID,
            drive_gear_ratio: DRIVE_GEAR_RATIO,
            wheel_circumference: WHEEL_CIRCUMFERENCE_M,
            initial_mode: OperatingMode::Autonomous,
            gains: GainProfiles {
                teleop: GainProfile {
                    drive: DRIVE_GAINS_TELEOP,
                    steer: STEER_GAINS_TELEOP,
                },
                autonomous: GainProfile {
                    drive: DRIVE_GAINS_AUTO,
                    steer: STEER_GAINS_AUTO,
                },
            },
        }
    }
}

impl ModuleConfig {
    /// Load and validate a JSON config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Geometry must be positive and the two motors need distinct ids
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("drive_gear_ratio", self.drive_gear_ratio),
            ("wheel_circumference", self.wheel_circumference),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositive { field, value });
            }
        }

        // Encoders live in their own id space
        if self.drive_id == self.steer_id {
            return Err(ConfigError::DuplicateDeviceId { id: self.drive_id });
        }
        Ok(())
    }

    /// Zenoh key for this module, e.g. "swerve/front_left/cmd"
    pub fn topic(&self, suffix: &str) -> String {
        format!("{}/{}/{}", TOPIC_PREFIX, self.name, suffix)
    }
}
