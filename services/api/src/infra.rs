use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use upkeep::error::AppError;
use upkeep::workflows::maintenance::{
    InMemoryMaintenanceStore, MaintenanceService, RecordingAlertPublisher, StaticDirectory,
};

pub(crate) type ApiService =
    MaintenanceService<InMemoryMaintenanceStore, StaticDirectory, RecordingAlertPublisher>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Reference data for the running service: the CSV export when given, otherwise the demo set.
pub(crate) fn load_directory(path: Option<&Path>) -> Result<StaticDirectory, AppError> {
    match path {
        Some(path) => Ok(StaticDirectory::from_path(path)?),
        None => Ok(demo_directory()),
    }
}

pub(crate) fn demo_directory() -> StaticDirectory {
    StaticDirectory::default()
        .with_property("prop-harbor", "landlord-harbor")
        .with_apartment("prop-harbor", "apt-101")
        .with_apartment("prop-harbor", "apt-102")
        .with_property("prop-elm", "landlord-elm")
        .with_category("plumbing")
        .with_subcategory("plumbing", "leak")
        .with_category("electrical")
        .with_category("hvac")
}
