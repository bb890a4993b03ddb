//! Router, bootstrap and serve loop.

use crate::config::{Config, StoreKind};
use crate::routes::{banner, health, labels, not_found, verify};
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use facegate_core::{spawn_engine, BlobStore, EngineConfig, FsBlobStore, ObjectBlobStore, S3Settings, StoreError};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the router.
///
/// Routes:
/// - `/`, `/health`, `/ready`, `/api/status`: always answer
/// - `/loadimages`, `/api/load-labeled-descriptors`, `/api/verify-face`:
///   503 until the initial index is published
/// - `/api/reload`: once models are loaded
pub fn build_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/", get(banner))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/api/status", get(health::service_status))
        .route("/loadimages", post(labels::upload_labeled_image))
        .route("/api/load-labeled-descriptors", post(labels::upload_labeled_image))
        .route("/api/reload", post(labels::reload_index))
        .route("/api/verify-face", post(verify::verify_face))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the configured blob store.
pub fn open_store(config: &Config) -> Result<Arc<dyn BlobStore>, StoreError> {
    match config.store {
        StoreKind::Fs => Ok(Arc::new(FsBlobStore::new(&config.labels_dir))),
        StoreKind::S3 => {
            let settings = S3Settings {
                bucket: config.bucket.clone().unwrap_or_default(),
                prefix: config.prefix.clone(),
                region: config.s3_region.clone(),
                endpoint: config.s3_endpoint.clone(),
                allow_http: config.s3_allow_http,
            };
            Ok(Arc::new(ObjectBlobStore::s3(&settings)?))
        }
    }
}

/// Load the models off the async runtime, then build the initial index.
///
/// Failures land in the service phase; the listener keeps running.
pub async fn bootstrap(state: Arc<AppState>, engine: EngineConfig) {
    let loaded = tokio::task::spawn_blocking(move || spawn_engine(&engine)).await;
    let handle = match loaded {
        Ok(Ok(handle)) => handle,
        Ok(Err(e)) => return state.fail(format!("loading models: {e}")),
        Err(e) => return state.fail(format!("model loader panicked: {e}")),
    };

    if let Ok(version) = state.install(Arc::new(handle)).await {
        tracing::info!(version, "facegated ready");
    }
}

/// Start the daemon: bind immediately, bootstrap in the background,
/// serve until Ctrl+C or SIGTERM.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = config.socket_addr()?;
    let store = open_store(&config)?;
    tracing::info!(store = %store.describe(), threshold = config.match_threshold, "store opened");

    let state = Arc::new(AppState::new(&config, store));
    let app = build_router(state.clone(), config.max_upload_bytes());

    let engine = EngineConfig {
        detector_model: config.detector_model_path(),
        recognizer_model: config.recognizer_model_path(),
        workers: config.engine_workers,
    };
    tokio::spawn(bootstrap(state, engine));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, max_upload_mb = config.max_upload_mb, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("facegated shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
