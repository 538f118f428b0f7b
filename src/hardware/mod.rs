// Hardware interface for one swerve module
//
// Provides:
// - Motor controller and absolute encoder capability traits
// - Simulated backend used by the runtime and tests
//
// Bus framing lives behind these traits and is not part of this crate.

pub mod sim;

use crate::swerve::gains::GainSet;

pub use sim::{SimEncoder, SimMotor};

/// Error types for actuator commands
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActuatorError {
    #[error("Device {id} is disconnected")]
    Disconnected { id: u8 },

    #[error("Device {id} rejected command: {reason}")]
    Rejected { id: u8, reason: String },
}

/// Closed-loop motor controller (drive or steer)
///
/// Units are rotor rotations and rotations/second, except for position
/// setpoints on a steer motor fused with its absolute encoder, which are in
/// mechanism rotations.
pub trait MotorController {
    /// Device id on the bus
    fn id(&self) -> u8;

    fn set_position_setpoint(&mut self, rotations: f64) -> Result<(), ActuatorError>;

    fn set_velocity_setpoint(&mut self, rotations_per_sec: f64) -> Result<(), ActuatorError>;

    /// Last reported rotor position; stale if the device is gone
    fn rotor_position(&self) -> f64;

    /// Last reported rotor velocity; stale if the device is gone
    fn rotor_velocity(&self) -> f64;

    /// Overwrite the accumulated rotor position
    fn set_rotor_position(&mut self, rotations: f64) -> Result<(), ActuatorError>;

    /// Push a complete gain set in one transaction
    fn apply_gains(&mut self, gains: &GainSet) -> Result<(), ActuatorError>;

    /// Neutral output
    fn stop(&mut self) -> Result<(), ActuatorError>;

    fn is_connected(&self) -> bool;
}

/// Absolute angle sensor
pub trait AbsoluteEncoder {
    fn id(&self) -> u8;

    /// Raw fractional rotation (1.0 = one turn); sign and magnitude are not bounded
    fn absolute_position(&self) -> f64;

    fn is_connected(&self) -> bool;
}
