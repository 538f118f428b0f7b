// Simulated swerve module hardware
//
// First-order motor dynamics good enough to close the loop in the runtime and
// in tests. Handles are cheap clones sharing one device, so a test can keep a
// handle to inject disconnects while the module owns another.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::{AbsoluteEncoder, ActuatorError, MotorController};
use crate::swerve::gains::GainSet;

/// Velocity loop time constant (seconds)
const VELOCITY_TAU_S: f64 = 0.05;

/// Position loop gain (1/s) and travel limit (rotations/s)
const POSITION_GAIN: f64 = 20.0;
const MAX_POSITION_RATE: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Control {
    Neutral,
    Position(f64),
    Velocity(f64),
}

#[derive(Debug)]
struct MotorSim {
    control: Control,
    // True physical state
    position: f64,
    velocity: f64,
    // What the device last reported on the bus
    reported_position: f64,
    reported_velocity: f64,
    gains: Option<GainSet>,
    gain_pushes: usize,
    connected: bool,
    continuous: bool,
    // Added to the mechanism position before closing the position loop
    feedback_offset: f64,
}

/// Simulated closed-loop motor controller
#[derive(Debug, Clone)]
pub struct SimMotor {
    id: u8,
    inner: Arc<Mutex<MotorSim>>,
}

impl SimMotor {
    /// Drive motor: plain rotor position, unbounded
    pub fn drive(id: u8) -> Self {
        Self::with_wrap(id, false)
    }

    /// Steer motor: position loop takes the short way around one mechanism turn
    pub fn steer(id: u8) -> Self {
        Self::with_wrap(id, true)
    }

    fn with_wrap(id: u8, continuous: bool) -> Self {
        Self {
            id,
            inner: Arc::new(Mutex::new(MotorSim {
                control: Control::Neutral,
                position: 0.0,
                velocity: 0.0,
                reported_position: 0.0,
                reported_velocity: 0.0,
                gains: None,
                gain_pushes: 0,
                connected: true,
                continuous,
                feedback_offset: 0.0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MotorSim> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advance the simulation by `dt` seconds
    pub fn step(&self, dt: f64) {
        let mut sim = self.lock();

        match sim.control {
            Control::Neutral => {
                sim.velocity *= (-dt / VELOCITY_TAU_S).exp();
            }
            Control::Velocity(target) => {
                let alpha = 1.0 - (-dt / VELOCITY_TAU_S).exp();
                sim.velocity += (target - sim.velocity) * alpha;
            }
            Control::Position(target) => {
                let mut error = target - (sim.position + sim.feedback_offset);
                if sim.continuous {
                    error -= error.round();
                }
                sim.velocity = (error * POSITION_GAIN).clamp(-MAX_POSITION_RATE, MAX_POSITION_RATE);
            }
        }
        sim.position += sim.velocity * dt;

        if sim.connected {
            sim.reported_position = sim.position;
            sim.reported_velocity = sim.velocity;
        }
    }

    /// Simulate the device dropping off (or returning to) the bus
    pub fn set_connected(&self, connected: bool) {
        debug!("Sim motor {} connected={}", self.id, connected);
        self.lock().connected = connected;
    }

    /// Force the physical state, e.g. to start a test mid-motion
    pub fn set_physical_state(&self, position: f64, velocity: f64) {
        let mut sim = self.lock();
        sim.position = position;
        sim.velocity = velocity;
        if sim.connected {
            sim.reported_position = position;
            sim.reported_velocity = velocity;
        }
    }

    /// True mechanism position, ignoring what the bus reports
    pub fn physical_position(&self) -> f64 {
        self.lock().position
    }

    pub fn position_setpoint(&self) -> Option<f64> {
        match self.lock().control {
            Control::Position(target) => Some(target),
            _ => None,
        }
    }

    pub fn velocity_setpoint(&self) -> Option<f64> {
        match self.lock().control {
            Control::Velocity(target) => Some(target),
            _ => None,
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.lock().control == Control::Neutral
    }

    /// Gains currently loaded on the device
    pub fn gains(&self) -> Option<GainSet> {
        self.lock().gains
    }

    /// Number of gain transactions received
    pub fn gain_pushes(&self) -> usize {
        self.lock().gain_pushes
    }

    fn command(&self, control: Control) -> Result<(), ActuatorError> {
        let mut sim = self.lock();
        if !sim.connected {
            return Err(ActuatorError::Disconnected { id: self.id });
        }
        sim.control = control;
        Ok(())
    }
}

impl MotorController for SimMotor {
    fn id(&self) -> u8 {
        self.id
    }

    fn set_position_setpoint(&mut self, rotations: f64) -> Result<(), ActuatorError> {
        if !rotations.is_finite() {
            return Err(ActuatorError::Rejected {
                id: self.id,
                reason: format!("non-finite position {}", rotations),
            });
        }
        self.command(Control::Position(rotations))
    }

    fn set_velocity_setpoint(&mut self, rotations_per_sec: f64) -> Result<(), ActuatorError> {
        if !rotations_per_sec.is_finite() {
            return Err(ActuatorError::Rejected {
                id: self.id,
                reason: format!("non-finite velocity {}", rotations_per_sec),
            });
        }
        self.command(Control::Velocity(rotations_per_sec))
    }

    fn rotor_position(&self) -> f64 {
        self.lock().reported_position
    }

    fn rotor_velocity(&self) -> f64 {
        self.lock().reported_velocity
    }

    fn set_rotor_position(&mut self, rotations: f64) -> Result<(), ActuatorError> {
        let mut sim = self.lock();
        if !sim.connected {
            return Err(ActuatorError::Disconnected { id: self.id });
        }
        sim.position = rotations;
        sim.reported_position = rotations;
        Ok(())
    }

    fn apply_gains(&mut self, gains: &GainSet) -> Result<(), ActuatorError> {
        let mut sim = self.lock();
        if !sim.connected {
            return Err(ActuatorError::Disconnected { id: self.id });
        }
        sim.gains = Some(*gains);
        sim.gain_pushes += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ActuatorError> {
        self.command(Control::Neutral)
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }
}

#[derive(Debug)]
struct EncoderSim {
    connected: bool,
    last_reading: f64,
}

/// Simulated absolute encoder mounted on a steer mechanism
#[derive(Debug, Clone)]
pub struct SimEncoder {
    id: u8,
    source: SimMotor,
    offset: f64,
    inner: Arc<Mutex<EncoderSim>>,
}

impl SimEncoder {
    /// Encoder reading the physical position of `steer`, shifted by `offset` rotations
    ///
    /// The steer position loop is remapped onto the encoder's frame, so
    /// setpoints derived from encoder angles land where the encoder reads them.
    pub fn following(id: u8, steer: &SimMotor, offset: f64) -> Self {
        steer.lock().feedback_offset = offset;
        Self {
            id,
            source: steer.clone(),
            offset,
            inner: Arc::new(Mutex::new(EncoderSim {
                connected: true,
                last_reading: steer.physical_position() + offset,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EncoderSim> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_connected(&self, connected: bool) {
        debug!("Sim encoder {} connected={}", self.id, connected);
        self.lock().connected = connected;
    }
}

impl AbsoluteEncoder for SimEncoder {
    fn id(&self) -> u8 {
        self.id
    }

    fn absolute_position(&self) -> f64 {
        let mut sim = self.lock();
        if sim.connected {
            sim.last_reading = self.source.physical_position() + self.offset;
        }
        sim.last_reading
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_velocity_loop_converges() {
        let mut motor = SimMotor::drive(1);
        motor.set_velocity_setpoint(10.0).unwrap();
        for _ in 0..100 {
            motor.step(0.02);
        }
        assert_abs_diff_eq!(motor.rotor_velocity(), 10.0, epsilon = 1e-3);
        assert!(motor.rotor_position() > 0.0);
    }

    #[test]
    fn test_steer_takes_short_way() {
        let mut steer = SimMotor::steer(2);
        steer.set_physical_state(0.95, 0.0);
        steer.set_position_setpoint(0.05).unwrap();
        steer.step(0.01);
        // Moving forward through the wrap, not back across the turn
        assert!(steer.rotor_velocity() > 0.0);
    }

    #[test]
    fn test_disconnected_motor_rejects_and_reports_stale() {
        let mut motor = SimMotor::drive(3);
        motor.set_physical_state(4.0, 1.0);
        motor.set_connected(false);

        assert_eq!(
            motor.set_velocity_setpoint(1.0),
            Err(ActuatorError::Disconnected { id: 3 })
        );
        motor.step(0.1);
        assert_eq!(motor.rotor_position(), 4.0);
        assert!(!motor.is_connected());
    }

    #[test]
    fn test_encoder_follows_steer_and_holds_when_disconnected() {
        let steer = SimMotor::steer(2);
        let encoder = SimEncoder::following(10, &steer, 0.25);
        steer.set_physical_state(0.1, 0.0);
        assert_abs_diff_eq!(encoder.absolute_position(), 0.35);

        encoder.set_connected(false);
        steer.set_physical_state(0.6, 0.0);
        assert_abs_diff_eq!(encoder.absolute_position(), 0.35);
    }

    #[test]
    fn test_offset_encoder_steer_settles_in_encoder_frame() {
        let mut steer = SimMotor::steer(2);
        let encoder = SimEncoder::following(10, &steer, 0.25);

        steer.set_position_setpoint(0.5).unwrap();
        for _ in 0..100 {
            steer.step(0.02);
        }

        assert_abs_diff_eq!(encoder.absolute_position(), 0.5, epsilon = 1e-3);
        assert_abs_diff_eq!(steer.physical_position(), 0.25, epsilon = 1e-3);
    }
}
