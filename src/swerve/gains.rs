// Closed-loop gain profiles per actuator role and operating mode
//
// Gains change through exactly two paths: switching the operating mode, or
// staging a full gain set and committing it. A commit replaces the whole
// GainSet and pushes it in a single transaction, so neither the in-memory
// profile nor the motor ever holds a mix of old and new terms.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::hardware::{ActuatorError, MotorController};
use crate::telemetry::NumberTable;

/// Which motor of the module a gain set belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorRole {
    Drive,
    Steer,
}

impl ActuatorRole {
    pub const ALL: [ActuatorRole; 2] = [ActuatorRole::Drive, ActuatorRole::Steer];

    /// Prefix used for live tuning keys ("Drive P", "Steer D", ...)
    pub fn label(self) -> &'static str {
        match self {
            ActuatorRole::Drive => "Drive",
            ActuatorRole::Steer => "Steer",
        }
    }
}

/// Operating mode selecting which gain profile is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    Teleop,
    Autonomous,
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatingMode::Teleop => write!(f, "teleop"),
            OperatingMode::Autonomous => write!(f, "autonomous"),
        }
    }
}

/// Optional feedforward terms of a gain set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedforwardTerm {
    /// Velocity
    V,
    /// Static friction
    S,
    /// Gravity
    G,
}

impl FeedforwardTerm {
    pub const ALL: [FeedforwardTerm; 3] =
        [FeedforwardTerm::V, FeedforwardTerm::S, FeedforwardTerm::G];

    fn label(self) -> &'static str {
        match self {
            FeedforwardTerm::V => "V",
            FeedforwardTerm::S => "S",
            FeedforwardTerm::G => "G",
        }
    }
}

/// Error types for gain handling
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GainError {
    #[error("Feedforward term k{} is not configured", .term.label())]
    MissingFeedforward { term: FeedforwardTerm },

    #[error("Failed to push {role:?} gains: {source}")]
    Push {
        role: ActuatorRole,
        #[source]
        source: ActuatorError,
    },
}

/// PID gains plus optional feedforward terms
///
/// Values are not range-checked; whatever the caller supplies is applied.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GainSet {
    pub p: f64,
    pub i: f64,
    pub d: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub g: Option<f64>,
}

impl GainSet {
    pub const fn pid(p: f64, i: f64, d: f64) -> Self {
        Self {
            p,
            i,
            d,
            v: None,
            s: None,
            g: None,
        }
    }

    pub const fn with_v(mut self, v: f64) -> Self {
        self.v = Some(v);
        self
    }

    pub const fn with_s(mut self, s: f64) -> Self {
        self.s = Some(s);
        self
    }

    pub const fn with_g(mut self, g: f64) -> Self {
        self.g = Some(g);
        self
    }

    fn term(&self, term: FeedforwardTerm) -> Option<f64> {
        match term {
            FeedforwardTerm::V => self.v,
            FeedforwardTerm::S => self.s,
            FeedforwardTerm::G => self.g,
        }
    }

    fn term_mut(&mut self, term: FeedforwardTerm) -> &mut Option<f64> {
        match term {
            FeedforwardTerm::V => &mut self.v,
            FeedforwardTerm::S => &mut self.s,
            FeedforwardTerm::G => &mut self.g,
        }
    }

    /// Read a feedforward term; an unconfigured term is a caller bug
    pub fn feedforward(&self, term: FeedforwardTerm) -> Result<f64, GainError> {
        self.term(term).ok_or(GainError::MissingFeedforward { term })
    }
}

/// Gains for both motors of a module under one operating mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainProfile {
    pub drive: GainSet,
    pub steer: GainSet,
}

impl GainProfile {
    pub fn get(&self, role: ActuatorRole) -> &GainSet {
        match role {
            ActuatorRole::Drive => &self.drive,
            ActuatorRole::Steer => &self.steer,
        }
    }

    fn get_mut(&mut self, role: ActuatorRole) -> &mut GainSet {
        match role {
            ActuatorRole::Drive => &mut self.drive,
            ActuatorRole::Steer => &mut self.steer,
        }
    }
}

/// One profile per operating mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainProfiles {
    pub teleop: GainProfile,
    pub autonomous: GainProfile,
}

impl GainProfiles {
    pub fn get(&self, mode: OperatingMode) -> &GainProfile {
        match mode {
            OperatingMode::Teleop => &self.teleop,
            OperatingMode::Autonomous => &self.autonomous,
        }
    }

    fn get_mut(&mut self, mode: OperatingMode) -> &mut GainProfile {
        match mode {
            OperatingMode::Teleop => &mut self.teleop,
            OperatingMode::Autonomous => &mut self.autonomous,
        }
    }
}

fn tuning_key(role: ActuatorRole, term: &str) -> String {
    format!("{} {}", role.label(), term)
}

/// Owns the gain profiles of one module plus staged tuning
#[derive(Debug, Clone)]
pub struct GainProfileStore {
    profiles: GainProfiles,
    active_mode: OperatingMode,
    staged_drive: Option<GainSet>,
    staged_steer: Option<GainSet>,
    // Roles whose device has not yet received the active profile
    pending_drive: bool,
    pending_steer: bool,
}

impl GainProfileStore {
    /// Create a store; nothing is pushed until `apply_profile` is called
    pub fn new(profiles: GainProfiles, initial_mode: OperatingMode) -> Self {
        Self {
            profiles,
            active_mode: initial_mode,
            staged_drive: None,
            staged_steer: None,
            pending_drive: false,
            pending_steer: false,
        }
    }

    pub fn active_mode(&self) -> OperatingMode {
        self.active_mode
    }

    pub fn profiles(&self) -> &GainProfiles {
        &self.profiles
    }

    pub fn gains(&self, mode: OperatingMode, role: ActuatorRole) -> GainSet {
        *self.profiles.get(mode).get(role)
    }

    /// Gains currently in effect for `role`
    pub fn active_gains(&self, role: ActuatorRole) -> GainSet {
        self.gains(self.active_mode, role)
    }

    pub fn staged(&self, role: ActuatorRole) -> Option<GainSet> {
        match role {
            ActuatorRole::Drive => self.staged_drive,
            ActuatorRole::Steer => self.staged_steer,
        }
    }

    /// True while `role` still runs gains other than the active profile's
    pub fn is_pending(&self, role: ActuatorRole) -> bool {
        match role {
            ActuatorRole::Drive => self.pending_drive,
            ActuatorRole::Steer => self.pending_steer,
        }
    }

    fn pending_slot(&mut self, role: ActuatorRole) -> &mut bool {
        match role {
            ActuatorRole::Drive => &mut self.pending_drive,
            ActuatorRole::Steer => &mut self.pending_steer,
        }
    }

    fn staged_slot(&mut self, role: ActuatorRole) -> &mut Option<GainSet> {
        match role {
            ActuatorRole::Drive => &mut self.staged_drive,
            ActuatorRole::Steer => &mut self.staged_steer,
        }
    }

    /// Push the profile for `mode` to both motors and make it active
    ///
    /// Both pushes are attempted; the first failure is returned. A role whose
    /// push failed is marked pending and picked up by `retry_pending`.
    /// Staged tuning belongs to the previous mode and is discarded.
    pub fn apply_profile<D, S>(
        &mut self,
        mode: OperatingMode,
        drive: &mut D,
        steer: &mut S,
    ) -> Result<(), GainError>
    where
        D: MotorController,
        S: MotorController,
    {
        let profile = *self.profiles.get(mode);
        info!("Applying {} gain profile", mode);

        let drive_result = drive.apply_gains(&profile.drive).map_err(|source| GainError::Push {
            role: ActuatorRole::Drive,
            source,
        });
        let steer_result = steer.apply_gains(&profile.steer).map_err(|source| GainError::Push {
            role: ActuatorRole::Steer,
            source,
        });

        if self.staged_drive.is_some() || self.staged_steer.is_some() {
            warn!("Discarding staged tuning on switch to {}", mode);
        }
        self.staged_drive = None;
        self.staged_steer = None;
        self.active_mode = mode;
        self.pending_drive = drive_result.is_err();
        self.pending_steer = steer_result.is_err();

        drive_result.and(steer_result)
    }

    /// Push the active gains to every pending role whose device is back online
    ///
    /// Returns the roles that were brought up to date. Devices still offline
    /// stay pending without an error.
    pub fn retry_pending<D, S>(
        &mut self,
        drive: &mut D,
        steer: &mut S,
    ) -> Result<Vec<ActuatorRole>, GainError>
    where
        D: MotorController,
        S: MotorController,
    {
        let mut synced = Vec::new();
        let drive_result = self.retry_role(ActuatorRole::Drive, drive, &mut synced);
        let steer_result = self.retry_role(ActuatorRole::Steer, steer, &mut synced);
        drive_result.and(steer_result)?;
        Ok(synced)
    }

    fn retry_role<M: MotorController>(
        &mut self,
        role: ActuatorRole,
        motor: &mut M,
        synced: &mut Vec<ActuatorRole>,
    ) -> Result<(), GainError> {
        if !self.is_pending(role) || !motor.is_connected() {
            return Ok(());
        }
        let gains = self.active_gains(role);
        motor
            .apply_gains(&gains)
            .map_err(|source| GainError::Push { role, source })?;

        *self.pending_slot(role) = false;
        info!("Reloaded {} {:?} gains after reconnect", self.active_mode, role);
        synced.push(role);
        Ok(())
    }

    /// Record candidate gains for `role` without touching the motor
    pub fn stage_tuning(&mut self, role: ActuatorRole, gains: GainSet) {
        debug!("Staged {:?} gains: {:?}", role, gains);
        *self.staged_slot(role) = Some(gains);
    }

    /// Stage gains for `role` from live tuning keys
    ///
    /// Missing keys fall back to the currently staged (or active) value.
    /// Feedforward terms are read only if the current set configures them.
    pub fn stage_from_table<T: NumberTable + ?Sized>(&mut self, role: ActuatorRole, table: &T) {
        let current = self.staged(role).unwrap_or_else(|| self.active_gains(role));

        let mut gains = GainSet::pid(
            table.get(&tuning_key(role, "P"), current.p),
            table.get(&tuning_key(role, "I"), current.i),
            table.get(&tuning_key(role, "D"), current.d),
        );
        for term in FeedforwardTerm::ALL {
            if let Some(value) = current.term(term) {
                *gains.term_mut(term) = Some(table.get(&tuning_key(role, term.label()), value));
            }
        }

        self.stage_tuning(role, gains);
    }

    /// Apply the staged gains for `role` to the active profile and the motor
    ///
    /// Returns `Ok(false)` if nothing was staged. The motor receives the full
    /// set in one call; the in-memory profile changes only after that push
    /// succeeds, and a failed push leaves the staged gains in place.
    pub fn commit_tuning<M: MotorController>(
        &mut self,
        role: ActuatorRole,
        motor: &mut M,
    ) -> Result<bool, GainError> {
        let Some(gains) = self.staged(role) else {
            debug!("No staged {:?} gains to commit", role);
            return Ok(false);
        };

        motor
            .apply_gains(&gains)
            .map_err(|source| GainError::Push { role, source })?;

        let mode = self.active_mode;
        *self.profiles.get_mut(mode).get_mut(role) = gains;
        *self.staged_slot(role) = None;
        *self.pending_slot(role) = false;

        info!("Committed {:?} gains for {}: {:?}", role, mode, gains);
        Ok(true)
    }

    /// Seed the tuning table with the active gains for both roles
    pub fn publish_tuning_keys<T: NumberTable + ?Sized>(&self, table: &mut T) {
        for role in ActuatorRole::ALL {
            let gains = self.active_gains(role);
            table.set(&tuning_key(role, "P"), gains.p);
            table.set(&tuning_key(role, "I"), gains.i);
            table.set(&tuning_key(role, "D"), gains.d);
            for term in FeedforwardTerm::ALL {
                if let Some(value) = gains.term(term) {
                    table.set(&tuning_key(role, term.label()), value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::SimMotor;
    use crate::telemetry::NetworkTable;

    fn test_profiles() -> GainProfiles {
        GainProfiles {
            teleop: GainProfile {
                drive: GainSet::pid(0.5, 0.0, 0.01).with_v(0.12),
                steer: GainSet::pid(40.0, 0.0, 1.0),
            },
            autonomous: GainProfile {
                drive: GainSet::pid(0.8, 0.1, 0.02).with_v(0.11),
                steer: GainSet::pid(50.0, 0.0, 1.5),
            },
        }
    }

    #[test]
    fn test_feedforward_absent_is_error() {
        let gains = GainSet::pid(1.0, 0.0, 0.0).with_v(0.2);
        assert_eq!(gains.feedforward(FeedforwardTerm::V), Ok(0.2));
        assert_eq!(
            gains.feedforward(FeedforwardTerm::G),
            Err(GainError::MissingFeedforward {
                term: FeedforwardTerm::G
            })
        );
    }

    #[test]
    fn test_apply_profile_pushes_both_motors() {
        let mut store = GainProfileStore::new(test_profiles(), OperatingMode::Autonomous);
        let mut drive = SimMotor::drive(1);
        let mut steer = SimMotor::steer(2);

        store
            .apply_profile(OperatingMode::Teleop, &mut drive, &mut steer)
            .unwrap();

        assert_eq!(store.active_mode(), OperatingMode::Teleop);
        assert_eq!(drive.gains(), Some(test_profiles().teleop.drive));
        assert_eq!(steer.gains(), Some(test_profiles().teleop.steer));
        assert_eq!(drive.gain_pushes(), 1);
        assert_eq!(steer.gain_pushes(), 1);
    }

    #[test]
    fn test_apply_profile_reports_failed_push_but_tries_both() {
        let mut store = GainProfileStore::new(test_profiles(), OperatingMode::Autonomous);
        let mut drive = SimMotor::drive(1);
        let mut steer = SimMotor::steer(2);
        drive.set_connected(false);

        let result = store.apply_profile(OperatingMode::Teleop, &mut drive, &mut steer);

        assert!(matches!(
            result,
            Err(GainError::Push {
                role: ActuatorRole::Drive,
                ..
            })
        ));
        assert_eq!(steer.gains(), Some(test_profiles().teleop.steer));
        assert!(store.is_pending(ActuatorRole::Drive));
        assert!(!store.is_pending(ActuatorRole::Steer));
    }

    #[test]
    fn test_retry_pending_waits_for_reconnect() {
        let mut store = GainProfileStore::new(test_profiles(), OperatingMode::Autonomous);
        let mut drive = SimMotor::drive(1);
        let mut steer = SimMotor::steer(2);
        drive.set_connected(false);
        assert!(
            store
                .apply_profile(OperatingMode::Teleop, &mut drive, &mut steer)
                .is_err()
        );

        // Still offline: nothing to do, no error
        assert_eq!(store.retry_pending(&mut drive, &mut steer), Ok(vec![]));
        assert_eq!(drive.gains(), None);

        drive.set_connected(true);
        assert_eq!(
            store.retry_pending(&mut drive, &mut steer),
            Ok(vec![ActuatorRole::Drive])
        );
        assert_eq!(drive.gains(), Some(test_profiles().teleop.drive));
        assert!(!store.is_pending(ActuatorRole::Drive));

        // Up to date: no further pushes
        let pushes = drive.gain_pushes();
        assert_eq!(store.retry_pending(&mut drive, &mut steer), Ok(vec![]));
        assert_eq!(drive.gain_pushes(), pushes);
        assert_eq!(steer.gain_pushes(), 1);
    }

    #[test]
    fn test_stage_does_not_touch_motor() {
        let mut store = GainProfileStore::new(test_profiles(), OperatingMode::Teleop);
        let drive = SimMotor::drive(1);

        store.stage_tuning(ActuatorRole::Drive, GainSet::pid(9.0, 9.0, 9.0));

        assert_eq!(drive.gain_pushes(), 0);
        assert_eq!(store.active_gains(ActuatorRole::Drive), test_profiles().teleop.drive);
        assert_eq!(store.staged(ActuatorRole::Drive), Some(GainSet::pid(9.0, 9.0, 9.0)));
    }

    #[test]
    fn test_commit_applies_all_terms_together() {
        let mut store = GainProfileStore::new(test_profiles(), OperatingMode::Teleop);
        let mut steer = SimMotor::steer(2);
        let candidate = GainSet::pid(60.0, 0.5, 2.0).with_s(0.1);

        store.stage_tuning(ActuatorRole::Steer, candidate);
        let committed = store.commit_tuning(ActuatorRole::Steer, &mut steer).unwrap();

        assert!(committed);
        // Every term reads back the staged value, in memory and on the device
        let active = store.active_gains(ActuatorRole::Steer);
        assert_eq!(
            (active.p, active.i, active.d, active.s),
            (60.0, 0.5, 2.0, Some(0.1))
        );
        assert_eq!(steer.gains(), Some(candidate));
        assert_eq!(steer.gain_pushes(), 1);
        assert_eq!(store.staged(ActuatorRole::Steer), None);
        // Other mode untouched
        assert_eq!(
            store.gains(OperatingMode::Autonomous, ActuatorRole::Steer),
            test_profiles().autonomous.steer
        );
    }

    #[test]
    fn test_commit_without_staged_is_noop() {
        let mut store = GainProfileStore::new(test_profiles(), OperatingMode::Teleop);
        let mut drive = SimMotor::drive(1);
        assert_eq!(store.commit_tuning(ActuatorRole::Drive, &mut drive), Ok(false));
        assert_eq!(drive.gain_pushes(), 0);
    }

    #[test]
    fn test_failed_commit_keeps_old_gains_and_staging() {
        let mut store = GainProfileStore::new(test_profiles(), OperatingMode::Teleop);
        let mut drive = SimMotor::drive(1);
        drive.set_connected(false);
        store.stage_tuning(ActuatorRole::Drive, GainSet::pid(2.0, 0.0, 0.0));

        assert!(store.commit_tuning(ActuatorRole::Drive, &mut drive).is_err());
        assert_eq!(store.active_gains(ActuatorRole::Drive), test_profiles().teleop.drive);
        assert!(store.staged(ActuatorRole::Drive).is_some());

        drive.set_connected(true);
        assert_eq!(store.commit_tuning(ActuatorRole::Drive, &mut drive), Ok(true));
        assert_eq!(store.active_gains(ActuatorRole::Drive).p, 2.0);
    }

    #[test]
    fn test_mode_switch_discards_staged() {
        let mut store = GainProfileStore::new(test_profiles(), OperatingMode::Teleop);
        let mut drive = SimMotor::drive(1);
        let mut steer = SimMotor::steer(2);
        store.stage_tuning(ActuatorRole::Drive, GainSet::pid(2.0, 0.0, 0.0));

        store
            .apply_profile(OperatingMode::Autonomous, &mut drive, &mut steer)
            .unwrap();

        assert_eq!(store.staged(ActuatorRole::Drive), None);
    }

    #[test]
    fn test_table_round_trip_through_tuning_keys() {
        let mut store = GainProfileStore::new(test_profiles(), OperatingMode::Teleop);
        let mut table = NetworkTable::new();
        store.publish_tuning_keys(&mut table);

        assert_eq!(table.get("Drive P", -1.0), 0.5);
        assert_eq!(table.get("Drive V", -1.0), 0.12);
        assert_eq!(table.get("Steer P", -1.0), 40.0);
        // Steer has no velocity feedforward configured
        assert!(!table.contains("Steer V"));

        table.set("Drive P", 0.75);
        table.set("Drive V", 0.2);
        table.set("Steer V", 3.0);
        store.stage_from_table(ActuatorRole::Drive, &table);
        store.stage_from_table(ActuatorRole::Steer, &table);

        let drive = store.staged(ActuatorRole::Drive).unwrap();
        assert_eq!(drive, GainSet::pid(0.75, 0.0, 0.01).with_v(0.2));
        let steer = store.staged(ActuatorRole::Steer).unwrap();
        assert_eq!(steer.v, None);
    }
}
