use crate::cli::ServeArgs;
use crate::infra::{load_directory, AppState};
use crate::routes::with_maintenance_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use upkeep::config::AppConfig;
use upkeep::error::AppError;
use upkeep::telemetry;
use upkeep::workflows::maintenance::{
    InMemoryMaintenanceStore, MaintenanceService, RecordingAlertPublisher,
};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let directory = load_directory(args.directory_csv.as_deref())?;
    let maintenance_service = Arc::new(MaintenanceService::new(
        Arc::new(InMemoryMaintenanceStore::default()),
        Arc::new(directory),
        Arc::new(RecordingAlertPublisher::default()),
        config.marketplace,
    ));

    let app = with_maintenance_routes(maintenance_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        vendor_job_limit = config.marketplace.vendor_job_limit,
        "maintenance marketplace ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
