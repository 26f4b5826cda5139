use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::MaintenanceId;

/// Notification payload handed to the delivery collaborator (e-mail, push, chat).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceAlert {
    pub template: String,
    pub maintenance_id: MaintenanceId,
    pub details: BTreeMap<String, String>,
}

impl MaintenanceAlert {
    pub fn new(template: &str, maintenance_id: &MaintenanceId) -> Self {
        Self {
            template: template.to_string(),
            maintenance_id: maintenance_id.clone(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }
}

/// Outbound notification hook.
pub trait AlertPublisher: Send + Sync {
    fn publish(&self, alert: MaintenanceAlert) -> Result<(), AlertError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("alert transport unavailable: {0}")]
    Transport(String),
}

/// Alerts go out after the state change has committed, so a delivery failure is logged
/// and never surfaces to the caller.
pub(crate) fn dispatch<A: AlertPublisher + ?Sized>(alerts: &A, alert: MaintenanceAlert) {
    let template = alert.template.clone();
    let maintenance_id = alert.maintenance_id.clone();
    if let Err(error) = alerts.publish(alert) {
        warn!(%maintenance_id, %template, %error, "maintenance alert delivery failed");
    }
}

/// Publisher that keeps every alert in memory; used by the demo server and tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingAlertPublisher {
    events: Arc<Mutex<Vec<MaintenanceAlert>>>,
}

impl RecordingAlertPublisher {
    pub fn events(&self) -> Vec<MaintenanceAlert> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn templates(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|alert| alert.template)
            .collect()
    }
}

impl AlertPublisher for RecordingAlertPublisher {
    fn publish(&self, alert: MaintenanceAlert) -> Result<(), AlertError> {
        let mut guard = self
            .events
            .lock()
            .map_err(|_| AlertError::Transport("alert log lock poisoned".to_string()))?;
        guard.push(alert);
        Ok(())
    }
}
