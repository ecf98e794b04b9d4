use objstore_sync::config::AppConfig;
use objstore_sync::db::connection::create_pool;
use objstore_sync::db::migrate::migrate;
use objstore_sync::object_store::s3::S3ObjectStore;
use objstore_sync::services::recovery::resume_incomplete_jobs;
use objstore_sync::services::monitor::start_file_monitor;
use objstore_sync::state::AppState;
use objstore_sync::{db, routes};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AppConfig::from_env();
    tracing::info!("Starting upload orchestrator on port {}", config.port);

    let database_path = config.database_url.to_string_lossy().to_string();
    let pool = create_pool(&database_path);
    migrate(&pool, &config.database_url)?;

    let object_store = S3ObjectStore::new(
        &config.aws_region,
        config.aws_endpoint_url.as_deref(),
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
    )
    .await;

    let state = Arc::new(AppState::new(pool, config.clone(), Arc::new(object_store)));

    resume_incomplete_jobs(state.clone()).await;

    let cancel = CancellationToken::new();
    start_file_monitor(state.clone(), cancel.clone());

    let app = routes::create_router(state.clone());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    tracing::info!("Shutting down...");
    cancel.cancel();
    db::connection::close_pool(&state.db);
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }

    cancel.cancel();
}
