// Connectivity fault monitoring for the module's three devices
//
// Flags are recomputed from the live connectivity query on every check:
// no debounce, no latching.

use serde::{Deserialize, Serialize};

use crate::hardware::{AbsoluteEncoder, MotorController};
use crate::telemetry::{Alert, AlertSink};

/// Monitored device of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentId {
    DriveMotor,
    SteerMotor,
    AngleSensor,
}

impl ComponentId {
    pub fn label(self) -> &'static str {
        match self {
            ComponentId::DriveMotor => "drive motor",
            ComponentId::SteerMotor => "turn motor",
            ComponentId::AngleSensor => "angle sensor",
        }
    }
}

/// One fault flag per device (true = disconnected)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FaultState {
    pub drive: bool,
    pub steer: bool,
    pub sensor: bool,
}

impl FaultState {
    pub fn get(&self, component: ComponentId) -> bool {
        match component {
            ComponentId::DriveMotor => self.drive,
            ComponentId::SteerMotor => self.steer,
            ComponentId::AngleSensor => self.sensor,
        }
    }

    pub fn any(&self) -> bool {
        self.drive || self.steer || self.sensor
    }
}

pub struct FaultMonitor {
    drive_alert: Alert,
    steer_alert: Alert,
    sensor_alert: Alert,
}

impl FaultMonitor {
    pub fn new(drive_id: u8, steer_id: u8, encoder_id: u8) -> Self {
        Self {
            drive_alert: Alert::disconnected(ComponentId::DriveMotor, drive_id),
            steer_alert: Alert::disconnected(ComponentId::SteerMotor, steer_id),
            sensor_alert: Alert::disconnected(ComponentId::AngleSensor, encoder_id),
        }
    }

    pub fn alerts(&self) -> [&Alert; 3] {
        [&self.drive_alert, &self.steer_alert, &self.sensor_alert]
    }

    /// Query connectivity of every device and forward the flags to `sink`
    pub fn check<M, E, A>(&self, drive: &M, steer: &M, encoder: &E, sink: &mut A) -> FaultState
    where
        M: MotorController,
        E: AbsoluteEncoder,
        A: AlertSink + ?Sized,
    {
        let faults = FaultState {
            drive: !drive.is_connected(),
            steer: !steer.is_connected(),
            sensor: !encoder.is_connected(),
        };

        sink.set_active(&self.drive_alert, faults.drive);
        sink.set_active(&self.steer_alert, faults.steer);
        sink.set_active(&self.sensor_alert, faults.sensor);

        faults
    }
}
