use std::sync::Arc;

use hospital_scheduling::{
    config::Config,
    db,
    models::AppState,
    routes,
    scheduling::{
        Coordinator, ExamService, PgStore,
        collaborators::{PgDirectory, PgMedicalRecordSink, PgNotificationSink},
    },
};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::header;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let pool = db::connect_pg(&cfg).await?;

    let timeout_ms = u64::try_from(cfg.store_timeout.as_millis())?;
    let store = Arc::new(PgStore::new(pool.clone(), timeout_ms));
    let directory = Arc::new(PgDirectory::new(pool.clone()));
    let notifications = Arc::new(PgNotificationSink::new(pool.clone()));
    let records = Arc::new(PgMedicalRecordSink::new(pool.clone()));

    let coordinator = Coordinator::new(
        store.clone(),
        directory.clone(),
        directory.clone(),
        notifications.clone(),
    )
    .with_store_timeout(cfg.store_timeout);
    let exams = ExamService::new(
        store,
        directory.clone(),
        directory.clone(),
        notifications,
        records,
    )
    .with_store_timeout(cfg.store_timeout);

    let state = AppState {
        db: pool,
        coordinator,
        exams,
        patients: directory.clone(),
        professionals: directory,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
