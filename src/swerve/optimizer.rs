// Command optimization: pick the equivalent (speed, angle) pair that needs the least steering
//
// A wheel pointed backward and driven backward moves the robot exactly like one
// pointed forward and driven forward, so the steer motor never has to turn more
// than a quarter turn.

use super::angle::{normalize_degrees, shortest_delta};
use crate::messages::ModuleState;

/// Maximum steering travel before the command is mirrored
pub const MAX_STEER_TRAVEL_DEG: f64 = 90.0;

/// Optimize `desired` relative to the module's `current_angle`
///
/// Flips the speed sign and rotates the target by 180° only when the shortest
/// rotation exceeds 90°. Exactly 90° is left alone so the module does not
/// oscillate at the boundary. Pure: identical inputs give identical outputs.
pub fn optimize(desired: ModuleState, current_angle: f64) -> ModuleState {
    let delta = shortest_delta(current_angle, desired.angle);

    if delta.abs() > MAX_STEER_TRAVEL_DEG {
        ModuleState {
            speed: -desired.speed,
            angle: normalize_degrees(desired.angle + 180.0),
        }
    } else {
        ModuleState {
            speed: desired.speed,
            angle: normalize_degrees(desired.angle),
        }
    }
}
