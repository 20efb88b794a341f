use crate::cli::ServeArgs;
use crate::infra::{
    AppState, InMemoryObjectStorage, InMemorySubscriptions, InMemoryVerificationRepository,
    LoggingRegulatorNotifier, TextLayerOcr,
};
use crate::routes::with_verification_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use neurocare::config::AppConfig;
use neurocare::error::AppError;
use neurocare::telemetry;
use neurocare::workflows::verification::{
    AdminReviewService, Collaborators, EducatorVerificationService, SubscriptionGate,
    VerificationState,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) const DOCUMENT_BUCKET: &str = "verification-documents";

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

    let repository = Arc::new(InMemoryVerificationRepository::default());
    let collaborators = Collaborators::new(
        Arc::new(InMemoryObjectStorage::new(DOCUMENT_BUCKET)),
        Arc::new(TextLayerOcr),
        Arc::new(LoggingRegulatorNotifier::default()),
    );
    let verification = VerificationState {
        educators: Arc::new(EducatorVerificationService::new(
            repository.clone(),
            collaborators.clone(),
            config.verification.clone(),
        )),
        review: Arc::new(AdminReviewService::new(
            repository,
            collaborators,
            config.verification.clone(),
        )),
        gate: Arc::new(SubscriptionGate::new(
            Arc::new(InMemorySubscriptions::default()),
            config.subscriptions,
        )),
    };

    let app = with_verification_routes(verification)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        max_upload_bytes = config.verification.max_upload_bytes,
        regulator_dispatch = config.verification.regulator_dispatch,
        "educator verification service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
