// 50 Hz module loop with command watchdog
// The loop is the periodic scheduler for the module: every tick it refreshes the
// module, sends the latest desired state (or stops it when commands go stale),
// checks faults and publishes telemetry.

use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::{
    CMD_TIMEOUT, LOOP_HZ, ModuleConfig, TOPIC_ALERTS, TOPIC_CMD, TOPIC_HEALTH, TOPIC_TELEMETRY,
    TOPIC_TUNING,
};
use crate::hardware::{SimEncoder, SimMotor};
use crate::messages::{ModuleCommand, ModuleState, ModuleTelemetry, RuntimeHealth};
use crate::swerve::{FaultState, ModuleError, SwerveModule};
use crate::telemetry::{AlertBoard, NetworkTable, NumberTable};

pub struct Runtime {
    module: SwerveModule<SimMotor, SimEncoder>,
    // Handles on the simulated plant, stepped once per cycle
    drive: SimMotor,
    steer: SimMotor,
    latest_cmd: Option<ModuleState>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
    faults: FaultState,
    tuning: NetworkTable,
    alerts: AlertBoard,
}

impl Runtime {
    /// Build a runtime driving a simulated module
    pub fn simulated(config: &ModuleConfig) -> Result<Self, ModuleError> {
        let drive = SimMotor::drive(config.drive_id);
        let steer = SimMotor::steer(config.steer_id);
        let encoder = SimEncoder::following(config.encoder_id, &steer, 0.0);
        let module = SwerveModule::new(config, drive.clone(), steer.clone(), encoder)?;

        let mut tuning = NetworkTable::new();
        module.publish_tuning_keys(&mut tuning);

        Ok(Self {
            module,
            drive,
            steer,
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
            faults: FaultState::default(),
            tuning,
            alerts: AlertBoard::new(),
        })
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn module(&self) -> &SwerveModule<SimMotor, SimEncoder> {
        &self.module
    }

    pub fn tuning(&self) -> &NetworkTable {
        &self.tuning
    }

    pub fn alerts(&self) -> &AlertBoard {
        &self.alerts
    }

    /// Process incoming command
    pub fn on_command(&mut self, cmd: ModuleCommand, now: Instant) {
        debug!("Received command: {:?}", &cmd);
        let result = match cmd {
            ModuleCommand::Desired { speed, angle } => {
                self.latest_cmd = Some(ModuleState::new(speed, angle));
                self.cmd_received_at = now;
                Ok(())
            }
            ModuleCommand::Stop => {
                self.latest_cmd = None;
                self.module.stop()
            }
            ModuleCommand::Mode { mode } => self.module.apply_profile(mode).map(|()| {
                // Tuning keys follow the profile now in effect
                self.module.publish_tuning_keys(&mut self.tuning);
            }),
            ModuleCommand::Tune { key, value } => {
                self.tuning.set(&key, value);
                Ok(())
            }
            ModuleCommand::Stage { role, gains } => {
                self.module.stage_tuning(role, gains);
                Ok(())
            }
            ModuleCommand::Commit { role } => {
                if self.module.gains().staged(role).is_none() {
                    self.module.stage_tuning_from(role, &self.tuning);
                }
                self.module.commit_tuning(role).map(|committed| {
                    // Keep the table in step so a later commit re-stages these gains
                    if committed {
                        self.module.publish_tuning_keys(&mut self.tuning);
                    }
                })
            }
            ModuleCommand::ResetDrivePosition => self.module.reset_drive_position(),
        };

        if let Err(e) = result {
            warn!("Command failed: {}", e);
        }
    }

    /// Run one control period ending at `now`, simulating `dt` seconds of plant motion
    pub fn cycle(&mut self, now: Instant, dt: f64) -> ModuleTelemetry {
        let cmd_age = now.saturating_duration_since(self.cmd_received_at);
        let stale = cmd_age > CMD_TIMEOUT || self.latest_cmd.is_none();

        // 1. Refresh + command (watchdog stops the module on stale input)
        if stale {
            if self.health == RuntimeHealth::Ok {
                warn!("Command stale ({:?} old), stopping module", cmd_age);
            }
            self.module.refresh();
            if let Err(e) = self.module.stop() {
                debug!("Stop failed: {}", e);
            }
        } else if let Some(desired) = self.latest_cmd {
            // Transient send failures are retried by the next cycle
            if let Err(e) = self.module.set_desired_state(desired) {
                debug!("Setpoint send failed: {}", e);
            }
        }

        // 2. Advance the simulated hardware
        self.drive.step(dt);
        self.steer.step(dt);

        // 3. Faults
        self.faults = self.module.check_faults(&mut self.alerts);

        self.health = if self.faults.any() {
            RuntimeHealth::Fault
        } else if stale {
            RuntimeHealth::CmdStale
        } else {
            RuntimeHealth::Ok
        };

        self.module.publish_debug(&mut self.tuning);

        ModuleTelemetry {
            commanded: self.module.state(),
            measured: self.module.current_state(),
            position: self.module.position(),
            faults: self.faults,
            mode: self.module.mode(),
        }
    }
}

pub async fn run(config: ModuleConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut runtime = Runtime::simulated(&config)?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let topic_cmd = config.topic(TOPIC_CMD);
    let subscriber = session.declare_subscriber(topic_cmd.clone()).await?;
    let pub_telemetry = session.declare_publisher(config.topic(TOPIC_TELEMETRY)).await?;
    let pub_health = session.declare_publisher(config.topic(TOPIC_HEALTH)).await?;
    let pub_alerts = session.declare_publisher(config.topic(TOPIC_ALERTS)).await?;
    let pub_tuning = session.declare_publisher(config.topic(TOPIC_TUNING)).await?;

    let period = Duration::from_millis(1000 / LOOP_HZ);
    let mut tick = interval(period);

    info!(
        "Module {} started: {}Hz loop, {}ms watchdog timeout, {} gains",
        config.name,
        LOOP_HZ,
        CMD_TIMEOUT.as_millis(),
        runtime.module().mode()
    );
    info!("Subscribed to: {}", topic_cmd);

    loop {
        tick.tick().await;
        let now = Instant::now();

        // 1. Drain all pending commands (non-blocking), apply in order
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<ModuleCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd, now),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }

        // 2. Control cycle
        let telemetry = runtime.cycle(now, period.as_secs_f64());

        // 3. Publish
        pub_telemetry.put(serde_json::to_string(&telemetry)?).await?;
        pub_health.put(serde_json::to_string(&runtime.health())?).await?;
        pub_alerts
            .put(serde_json::to_string(&runtime.alerts().active_messages())?)
            .await?;
        pub_tuning.put(serde_json::to_string(runtime.tuning())?).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swerve::{ActuatorRole, GainSet, OperatingMode};

    const DT: f64 = 0.02;

    fn runtime() -> Runtime {
        Runtime::simulated(&ModuleConfig::default()).unwrap()
    }

    #[test]
    fn test_starts_stale_and_stopped() {
        let mut rt = runtime();
        let telemetry = rt.cycle(Instant::now(), DT);
        assert_eq!(rt.health(), RuntimeHealth::CmdStale);
        assert_eq!(telemetry.commanded, ModuleState::zero());
        assert!(rt.drive.is_neutral());
    }

    #[test]
    fn test_fresh_command_drives_module() {
        let mut rt = runtime();
        let start = Instant::now();
        rt.on_command(
            ModuleCommand::Desired {
                speed: 1.0,
                angle: 30.0,
            },
            start,
        );

        let telemetry = rt.cycle(start + Duration::from_millis(20), DT);

        assert_eq!(rt.health(), RuntimeHealth::Ok);
        assert_eq!(telemetry.commanded, ModuleState::new(1.0, 30.0));
        assert!(rt.drive.velocity_setpoint().is_some());
    }

    #[test]
    fn test_watchdog_stops_after_timeout() {
        let mut rt = runtime();
        let start = Instant::now();
        rt.on_command(
            ModuleCommand::Desired {
                speed: 1.0,
                angle: 30.0,
            },
            start,
        );
        rt.cycle(start, DT);

        let late = start + CMD_TIMEOUT + Duration::from_millis(1);
        let telemetry = rt.cycle(late, DT);

        assert_eq!(rt.health(), RuntimeHealth::CmdStale);
        assert_eq!(telemetry.commanded, ModuleState::zero());
        assert!(rt.drive.is_neutral());
        assert!(rt.steer.is_neutral());
    }

    #[test]
    fn test_fault_health_and_alerts() {
        let mut rt = runtime();
        let start = Instant::now();
        rt.on_command(
            ModuleCommand::Desired {
                speed: 0.5,
                angle: 0.0,
            },
            start,
        );

        rt.drive.set_connected(false);
        let telemetry = rt.cycle(start, DT);

        assert_eq!(rt.health(), RuntimeHealth::Fault);
        assert!(telemetry.faults.drive);
        assert!(!telemetry.faults.steer);
        assert_eq!(rt.alerts().active_messages(), vec!["Disconnected drive motor 1."]);
    }

    #[test]
    fn test_mode_switch_republishes_tuning_keys() {
        let mut rt = runtime();
        let now = Instant::now();
        rt.on_command(
            ModuleCommand::Mode {
                mode: OperatingMode::Teleop,
            },
            now,
        );

        let teleop = ModuleConfig::default().gains.teleop;
        assert_eq!(rt.module().mode(), OperatingMode::Teleop);
        assert_eq!(rt.tuning().get("Steer P", -1.0), teleop.steer.p);
        assert_eq!(rt.steer.gains(), Some(teleop.steer));
    }

    #[test]
    fn test_tune_then_commit_uses_table() {
        let mut rt = runtime();
        let now = Instant::now();
        rt.on_command(
            ModuleCommand::Tune {
                key: "Steer P".to_string(),
                value: 55.0,
            },
            now,
        );
        rt.on_command(
            ModuleCommand::Commit {
                role: ActuatorRole::Steer,
            },
            now,
        );

        assert_eq!(rt.steer.gains().map(|g| g.p), Some(55.0));
    }

    #[test]
    fn test_staged_gains_take_priority_over_table() {
        let mut rt = runtime();
        let now = Instant::now();
        let staged = GainSet::pid(0.9, 0.0, 0.0).with_v(0.1);
        rt.on_command(
            ModuleCommand::Tune {
                key: "Drive P".to_string(),
                value: 5.0,
            },
            now,
        );
        rt.on_command(
            ModuleCommand::Stage {
                role: ActuatorRole::Drive,
                gains: staged,
            },
            now,
        );
        rt.on_command(
            ModuleCommand::Commit {
                role: ActuatorRole::Drive,
            },
            now,
        );

        assert_eq!(rt.drive.gains(), Some(staged));
    }

    #[test]
    fn test_repeated_commit_keeps_committed_gains() {
        let mut rt = runtime();
        let now = Instant::now();
        let staged = GainSet::pid(0.9, 0.0, 0.0).with_v(0.1);
        rt.on_command(
            ModuleCommand::Stage {
                role: ActuatorRole::Drive,
                gains: staged,
            },
            now,
        );
        rt.on_command(
            ModuleCommand::Commit {
                role: ActuatorRole::Drive,
            },
            now,
        );
        assert_eq!(rt.tuning().get("Drive P", -1.0), 0.9);
        assert_eq!(rt.tuning().get("Drive V", -1.0), 0.1);

        rt.on_command(
            ModuleCommand::Commit {
                role: ActuatorRole::Drive,
            },
            now,
        );

        assert_eq!(rt.drive.gains(), Some(staged));
        assert_eq!(rt.module().gains().active_gains(ActuatorRole::Drive), staged);
    }

    #[test]
    fn test_reset_drive_position_command() {
        let mut rt = runtime();
        let start = Instant::now();
        rt.on_command(
            ModuleCommand::Desired {
                speed: 1.0,
                angle: 0.0,
            },
            start,
        );
        for i in 0..10 {
            rt.cycle(start + Duration::from_millis(20 * i), DT);
        }
        assert!(rt.drive.physical_position() > 0.0);

        rt.on_command(ModuleCommand::ResetDrivePosition, start);
        assert_eq!(rt.module().position().distance, 0.0);
    }
}
