// Swerve module control core
//
// Provides:
// - Wrapped-angle helpers and command optimization (shortest steering path)
// - State estimation from drive rotor and absolute encoder
// - Gain profiles per operating mode with stage/commit tuning
// - Connectivity fault monitoring
// - The SwerveModule facade tying them together per control cycle

pub mod angle;
pub mod estimator;
pub mod faults;
pub mod gains;
mod module;
pub mod optimizer;

pub use estimator::StateEstimator;
pub use faults::{ComponentId, FaultMonitor, FaultState};
pub use gains::{
    ActuatorRole, FeedforwardTerm, GainError, GainProfile, GainProfileStore, GainProfiles,
    GainSet, OperatingMode,
};
pub use module::{ModuleError, Setpoints, SwerveModule};
pub use optimizer::optimize;
