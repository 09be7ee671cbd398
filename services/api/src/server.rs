use crate::cli::ServeArgs;
use crate::infra::{
    seed_sample_catalog, ApiService, AppState, InMemoryAnalyticsSink, InMemoryAtsStore,
    InMemoryNotificationOutbox,
};
use crate::routes::with_operational_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use internship_ats::config::AppConfig;
use internship_ats::error::AppError;
use internship_ats::telemetry;
use internship_ats::workflows::external_apply::ExternalApplyError;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

const SAMPLE_ATS_URL: &str = "https://ats.example.com/apply";

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

    let store = InMemoryAtsStore::default();
    let catalog = seed_sample_catalog(&store, SAMPLE_ATS_URL).map_err(ExternalApplyError::from)?;
    info!(
        employer_id = %catalog.employer,
        curated_listing = %catalog.curated_listing,
        immediate_listing = %catalog.immediate_listing,
        native_listing = %catalog.native_listing,
        "sample listings seeded"
    );

    let service: Arc<ApiService> = Arc::new(ApiService::new(
        Arc::new(store),
        Arc::new(InMemoryNotificationOutbox::default()),
        Arc::new(InMemoryAnalyticsSink::default()),
        config.notifications.clone(),
    ));

    let app = with_operational_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "internship ats service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
