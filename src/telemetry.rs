// Outbound telemetry and live tuning inputs
//
// NumberTable is a best-effort key/value store of numbers (dashboard-style).
// AlertSink receives one boolean per monitored component.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{error, info};

use crate::swerve::faults::ComponentId;

/// Key/value numeric store used for live tuning and debug output
pub trait NumberTable {
    /// Read `key`, or `default` if it was never set
    fn get(&self, key: &str, default: f64) -> f64;

    fn set(&mut self, key: &str, value: f64);
}

/// In-memory table, published as a JSON object by the runtime
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct NetworkTable {
    values: BTreeMap<String, f64>,
}

impl NetworkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl NumberTable for NetworkTable {
    fn get(&self, key: &str, default: f64) -> f64 {
        self.values.get(key).copied().unwrap_or(default)
    }

    fn set(&mut self, key: &str, value: f64) {
        self.values.insert(key.to_string(), value);
    }
}

/// Receiver for per-component alert flags
pub trait AlertSink {
    fn set_active(&mut self, alert: &Alert, active: bool);
}

/// A named alert for one monitored device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub component: ComponentId,
    pub device_id: u8,
    pub message: String,
}

impl Alert {
    pub fn disconnected(component: ComponentId, device_id: u8) -> Self {
        Self {
            component,
            device_id,
            message: format!("Disconnected {} {}.", component.label(), device_id),
        }
    }
}

/// Alert sink that remembers which alerts are raised and logs transitions
#[derive(Debug, Clone, Default, Serialize)]
pub struct AlertBoard {
    active: BTreeMap<String, bool>,
}

impl AlertBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self, message: &str) -> bool {
        self.active.get(message).copied().unwrap_or(false)
    }

    /// Messages of all currently raised alerts
    pub fn active_messages(&self) -> Vec<&str> {
        self.active
            .iter()
            .filter(|(_, active)| **active)
            .map(|(message, _)| message.as_str())
            .collect()
    }
}

impl AlertSink for AlertBoard {
    fn set_active(&mut self, alert: &Alert, active: bool) {
        let previous = self.active.insert(alert.message.clone(), active);
        match (previous.unwrap_or(false), active) {
            (false, true) => error!("{}", alert.message),
            (true, false) => info!("Cleared: {}", alert.message),
            _ => {}
        }
    }
}
