// Define message types for the module runtime

use serde::{Deserialize, Serialize};

use crate::swerve::angle::normalize_degrees;
use crate::swerve::faults::FaultState;
use crate::swerve::gains::{ActuatorRole, GainSet, OperatingMode};

/// Speed (m/s, signed) and heading (degrees, [0, 360)) of one module
///
/// A negative speed means the wheel drives backward relative to `angle`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleState {
    pub speed: f64,
    pub angle: f64,
}

impl ModuleState {
    /// Build a state, wrapping the angle into canonical range
    pub fn new(speed: f64, angle: f64) -> Self {
        Self {
            speed,
            angle: normalize_degrees(angle),
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

/// Accumulated wheel travel (m) and absolute heading (degrees, [0, 360))
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModulePosition {
    pub distance: f64,
    pub angle: f64,
}

// Commands from teleop/planner -> runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModuleCommand {
    /// Desired module state (angle may be any value, it is wrapped on receipt)
    Desired { speed: f64, angle: f64 },
    Stop,
    Mode { mode: OperatingMode },
    /// Write a live tuning value, e.g. key "Drive P"
    Tune { key: String, value: f64 },
    /// Stage a full gain set for a role
    Stage { role: ActuatorRole, gains: GainSet },
    /// Commit staged gains for a role (stages from the tuning table if nothing is staged)
    Commit { role: ActuatorRole },
    ResetDrivePosition,
}

/// Per-cycle telemetry published by the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleTelemetry {
    pub commanded: ModuleState,
    pub measured: ModuleState,
    pub position: ModulePosition,
    pub faults: FaultState,
    pub mode: OperatingMode,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    Fault,
}
