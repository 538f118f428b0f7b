// State estimation: raw sensor signals -> canonical module position and state

use tracing::trace;

use super::angle::rotations_to_degrees;
use crate::hardware::{AbsoluteEncoder, MotorController};
use crate::messages::{ModulePosition, ModuleState};

/// Converts drive rotor rotations to wheel travel and reads the absolute heading
///
/// Heading always comes from the absolute encoder, never from integration.
#[derive(Debug, Clone, Copy)]
pub struct StateEstimator {
    gear_ratio: f64,
    wheel_circumference: f64,
}

impl StateEstimator {
    /// `gear_ratio` is rotor rotations per wheel rotation; both values must be positive
    pub fn new(gear_ratio: f64, wheel_circumference: f64) -> Self {
        Self {
            gear_ratio,
            wheel_circumference,
        }
    }

    /// Rotor rotations -> metres
    pub fn rotations_to_distance(&self, rotations: f64) -> f64 {
        rotations / self.gear_ratio * self.wheel_circumference
    }

    /// Metres/second -> rotor rotations/second
    pub fn speed_to_rotor_velocity(&self, speed: f64) -> f64 {
        speed * self.gear_ratio / self.wheel_circumference
    }

    /// Sample the sensors into a fresh module position
    pub fn refresh<M, E>(&self, drive: &M, encoder: &E) -> ModulePosition
    where
        M: MotorController,
        E: AbsoluteEncoder,
    {
        let position = ModulePosition {
            distance: self.rotations_to_distance(drive.rotor_position()),
            angle: rotations_to_degrees(encoder.absolute_position()),
        };
        trace!(
            "Module position: distance={:.4} m, angle={:.2}°",
            position.distance, position.angle
        );
        position
    }

    /// Live speed and heading of the module
    pub fn current_state<M, E>(&self, drive: &M, encoder: &E) -> ModuleState
    where
        M: MotorController,
        E: AbsoluteEncoder,
    {
        ModuleState {
            speed: self.rotations_to_distance(drive.rotor_velocity()),
            angle: rotations_to_degrees(encoder.absolute_position()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{SimEncoder, SimMotor};
    use approx::assert_abs_diff_eq;

    const GEAR: f64 = 6.75;
    const CIRCUMFERENCE: f64 = 0.319;

    #[test]
    fn test_distance_scaling() {
        let estimator = StateEstimator::new(GEAR, CIRCUMFERENCE);
        let drive = SimMotor::drive(1);
        let steer = SimMotor::steer(2);
        let encoder = SimEncoder::following(3, &steer, 0.0);

        drive.set_physical_state(GEAR * 10.0, 0.0);
        let position = estimator.refresh(&drive, &encoder);
        assert_abs_diff_eq!(position.distance, 10.0 * CIRCUMFERENCE, epsilon = 1e-12);
    }

    #[test]
    fn test_distance_decreases_when_driven_backward() {
        let estimator = StateEstimator::new(GEAR, CIRCUMFERENCE);
        let drive = SimMotor::drive(1);
        let steer = SimMotor::steer(2);
        let encoder = SimEncoder::following(3, &steer, 0.0);

        drive.set_physical_state(-GEAR, 0.0);
        assert!(estimator.refresh(&drive, &encoder).distance < 0.0);
    }

    #[test]
    fn test_angle_normalized_from_any_raw_reading() {
        let estimator = StateEstimator::new(GEAR, CIRCUMFERENCE);
        let drive = SimMotor::drive(1);
        let steer = SimMotor::steer(2);
        let encoder = SimEncoder::following(3, &steer, 0.0);

        for (raw, expected) in [(0.25, 90.0), (-0.25, 270.0), (2.5, 180.0), (-3.0, 0.0)] {
            steer.set_physical_state(raw, 0.0);
            let position = estimator.refresh(&drive, &encoder);
            assert_abs_diff_eq!(position.angle, expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_current_state_speed_matches_distance_scaling() {
        let estimator = StateEstimator::new(GEAR, CIRCUMFERENCE);
        let drive = SimMotor::drive(1);
        let steer = SimMotor::steer(2);
        let encoder = SimEncoder::following(3, &steer, 0.0);

        drive.set_physical_state(0.0, -GEAR * 2.0);
        steer.set_physical_state(0.125, 0.0);

        let state = estimator.current_state(&drive, &encoder);
        assert_abs_diff_eq!(state.speed, -2.0 * CIRCUMFERENCE, epsilon = 1e-12);
        assert_abs_diff_eq!(state.angle, 45.0, epsilon = 1e-9);
    }

    #[test]
    fn test_speed_conversion_inverts() {
        let estimator = StateEstimator::new(GEAR, CIRCUMFERENCE);
        let rps = estimator.speed_to_rotor_velocity(1.5);
        assert_abs_diff_eq!(estimator.rotations_to_distance(rps), 1.5, epsilon = 1e-12);
    }
}
