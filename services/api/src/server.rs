use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use ta_allocation::config::AppConfig;
use ta_allocation::error::AppError;
use ta_allocation::store::MemoryStore;
use ta_allocation::telemetry;
use tracing::info;

use crate::cli::ServeArgs;
use crate::infra::{load_seed, AppState, MailQueue, Services};
use crate::routes::with_service_routes;

pub(crate) async fn run(args: ServeArgs) -> Result<(), AppError> {
    let ServeArgs { host, port, seed } = args;
    let mut config = AppConfig::load()?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let store = Arc::new(MemoryStore::from_seed(load_seed(seed.as_deref())?));
    let mail = MailQueue::spawn(config.allocation.mail_sender.clone());
    let services = Services::build(store, mail, &config.allocation);

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness.clone(),
        metrics: Arc::new(prometheus_handle),
        live: services.live.clone(),
    };

    let app = with_service_routes(&services)
        .layer(Extension(state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness.store(true, Ordering::Release);

    info!(
        environment = ?config.environment,
        %addr,
        commit_attempts = config.allocation.commit_attempts,
        "ta allocation service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
