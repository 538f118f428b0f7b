// Swerve module facade
//
// Combines estimation, command optimization, gain profiles and fault
// monitoring into the per-cycle API the host loop calls.

use tracing::{debug, info, warn};

use super::estimator::StateEstimator;
use super::faults::{FaultMonitor, FaultState};
use super::gains::{ActuatorRole, GainError, GainProfileStore, GainSet, OperatingMode};
use super::optimizer::optimize;
use crate::config::{ConfigError, ModuleConfig};
use crate::hardware::{AbsoluteEncoder, ActuatorError, MotorController};
use crate::messages::{ModulePosition, ModuleState};
use crate::swerve::angle::degrees_to_rotations;
use crate::telemetry::{AlertSink, NumberTable};

/// Error types for module operations
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Actuator error: {0}")]
    Actuator(#[from] ActuatorError),

    #[error("Gain error: {0}")]
    Gain(#[from] GainError),
}

/// Last setpoints sent to the motors, in motor units
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Setpoints {
    /// Steer mechanism rotations
    pub steer_rotations: f64,
    /// Drive rotor rotations/second
    pub drive_rps: f64,
}

/// One drive/steer wheel unit with its absolute angle sensor
pub struct SwerveModule<M, E>
where
    M: MotorController,
    E: AbsoluteEncoder,
{
    name: String,
    drive: M,
    steer: M,
    encoder: E,
    estimator: StateEstimator,
    gains: GainProfileStore,
    faults: FaultMonitor,
    position: ModulePosition,
    state: ModuleState,
    setpoints: Setpoints,
}

impl<M, E> SwerveModule<M, E>
where
    M: MotorController,
    E: AbsoluteEncoder,
{
    /// Build a module and load its initial gain profile
    ///
    /// Only invalid configuration fails construction. A device that is
    /// offline at boot is logged, picked up by the fault monitor and gets its
    /// gains on the first cycle after it reconnects.
    pub fn new(config: &ModuleConfig, drive: M, steer: M, encoder: E) -> Result<Self, ModuleError> {
        config.validate()?;
        if drive.id() == steer.id() {
            return Err(ConfigError::DuplicateDeviceId { id: drive.id() }.into());
        }

        let mut module = Self {
            name: config.name.clone(),
            faults: FaultMonitor::new(drive.id(), steer.id(), encoder.id()),
            drive,
            steer,
            encoder,
            estimator: StateEstimator::new(config.drive_gear_ratio, config.wheel_circumference),
            gains: GainProfileStore::new(config.gains, config.initial_mode),
            position: ModulePosition::default(),
            state: ModuleState::zero(),
            setpoints: Setpoints::default(),
        };

        if let Err(e) = module.apply_profile(config.initial_mode) {
            warn!("Module {}: initial gains not loaded: {}", module.name, e);
        }
        info!(
            "Module {} ready (drive={}, steer={}, encoder={})",
            module.name,
            module.drive.id(),
            module.steer.id(),
            module.encoder.id()
        );
        Ok(module)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position sampled by the last refresh
    pub fn position(&self) -> ModulePosition {
        self.position
    }

    /// Last commanded (optimized) state
    pub fn state(&self) -> ModuleState {
        self.state
    }

    pub fn setpoints(&self) -> Setpoints {
        self.setpoints
    }

    pub fn mode(&self) -> OperatingMode {
        self.gains.active_mode()
    }

    pub fn gains(&self) -> &GainProfileStore {
        &self.gains
    }

    /// Sample the sensors and store the module position
    pub fn refresh(&mut self) -> ModulePosition {
        self.position = self.estimator.refresh(&self.drive, &self.encoder);
        self.position
    }

    /// Live speed and heading read from the hardware
    pub fn current_state(&self) -> ModuleState {
        self.estimator.current_state(&self.drive, &self.encoder)
    }

    /// Drive toward `desired`
    ///
    /// Refreshes the position first so the command is optimized against the
    /// heading at the start of this cycle. Both setpoints are always sent;
    /// if either send fails the first error is returned.
    pub fn set_desired_state(&mut self, desired: ModuleState) -> Result<ModuleState, ModuleError> {
        self.sync_gains();
        let position = self.refresh();
        let optimized = optimize(desired, position.angle);

        let setpoints = Setpoints {
            steer_rotations: degrees_to_rotations(optimized.angle),
            drive_rps: self.estimator.speed_to_rotor_velocity(optimized.speed),
        };
        debug!(
            "Module {}: desired={:?} current={:.2}° -> {:?}",
            self.name, desired, position.angle, optimized
        );

        let steer_result = self.steer.set_position_setpoint(setpoints.steer_rotations);
        let drive_result = self.drive.set_velocity_setpoint(setpoints.drive_rps);

        self.state = optimized;
        self.setpoints = setpoints;

        steer_result.and(drive_result)?;
        Ok(optimized)
    }

    /// Neutral output on both motors, bypassing optimization
    pub fn stop(&mut self) -> Result<(), ModuleError> {
        self.sync_gains();
        let steer_result = self.steer.stop();
        let drive_result = self.drive.stop();

        self.state = ModuleState::zero();
        self.setpoints = Setpoints::default();

        steer_result.and(drive_result)?;
        Ok(())
    }

    /// Load the gain profile for `mode` into both motors
    pub fn apply_profile(&mut self, mode: OperatingMode) -> Result<(), ModuleError> {
        self.gains.apply_profile(mode, &mut self.drive, &mut self.steer)?;
        Ok(())
    }

    // Reload gains that missed their push while a motor was offline
    fn sync_gains(&mut self) {
        if let Err(e) = self.gains.retry_pending(&mut self.drive, &mut self.steer) {
            warn!("Module {}: gain reload failed: {}", self.name, e);
        }
    }

    pub fn stage_tuning(&mut self, role: ActuatorRole, gains: GainSet) {
        self.gains.stage_tuning(role, gains);
    }

    /// Stage gains for `role` from the live tuning table
    pub fn stage_tuning_from<T: NumberTable + ?Sized>(&mut self, role: ActuatorRole, table: &T) {
        self.gains.stage_from_table(role, table);
    }

    /// Commit staged gains for `role`; `Ok(false)` if nothing was staged
    pub fn commit_tuning(&mut self, role: ActuatorRole) -> Result<bool, ModuleError> {
        let committed = match role {
            ActuatorRole::Drive => self.gains.commit_tuning(role, &mut self.drive)?,
            ActuatorRole::Steer => self.gains.commit_tuning(role, &mut self.steer)?,
        };
        Ok(committed)
    }

    /// Seed `table` with the active gains so they can be edited live
    pub fn publish_tuning_keys<T: NumberTable + ?Sized>(&self, table: &mut T) {
        self.gains.publish_tuning_keys(table);
    }

    /// Recompute connectivity faults and forward them to `sink`
    pub fn check_faults<A: AlertSink + ?Sized>(&self, sink: &mut A) -> FaultState {
        self.faults.check(&self.drive, &self.steer, &self.encoder, sink)
    }

    /// Zero the drive rotor position so distance restarts at 0
    pub fn reset_drive_position(&mut self) -> Result<(), ModuleError> {
        self.drive.set_rotor_position(0.0)?;
        self.position.distance = 0.0;
        info!("Module {}: drive position reset", self.name);
        Ok(())
    }

    /// Write actual vs. commanded values for dashboards
    pub fn publish_debug<T: NumberTable + ?Sized>(&self, table: &mut T) {
        let id = self.encoder.id();
        let measured = self.current_state();

        table.set(&format!("drive actual speed {}", id), self.drive.rotor_velocity());
        table.set(&format!("drive set speed {}", id), self.setpoints.drive_rps);
        table.set(&format!("steer actual angle {}", id), measured.angle);
        table.set(&format!("steer set angle {}", id), self.state.angle);
        table.set(&format!("module distance {}", id), self.position.distance);
    }
}
