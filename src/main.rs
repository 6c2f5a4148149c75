//! APKScan — APK malware analysis gateway
//!
//! Accepts an uploaded APK, hands it to an external classification engine
//! running as a separate process, keeps a per-run audit log of everything the
//! engine said, and returns the parsed classification.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        APKSCAN                             │
//! ├────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────────┐   ┌────────────────────┐  │
//! │  │  HTTP    │   │  Analysis    │   │  External Engine   │  │
//! │  │  Gateway │──▶│ Orchestrator │──▶│  (child process)   │  │
//! │  │  (Axum)  │   │              │   │                    │  │
//! │  └──────────┘   └──┬────────┬──┘   └────────────────────┘  │
//! │                    ▼        ▼                              │
//! │            ┌──────────┐ ┌──────────┐                       │
//! │            │ Artifact │ │  Audit   │                       │
//! │            │  Store   │ │   Logs   │                       │
//! │            └──────────┘ └──────────┘                       │
//! └────────────────────────────────────────────────────────────┘
//! ```

mod analysis;
mod config;
mod error;
mod handlers;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use analysis::{engine::EngineAdapter, runlog::RunLogger, store::ArtifactStore};

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "apkscan=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env();

    tracing::info!("APKScan gateway starting...");
    tracing::info!(
        "Engine: {} {}",
        config.engine_command,
        config.engine_args.join(" ")
    );

    // Provision runtime directories before anything touches them
    config
        .ensure_dirs()
        .expect("Failed to create upload/log directories");

    // Build application state
    let state = AppState {
        store: ArtifactStore::new(config.upload_dir.clone()),
        logger: RunLogger::new(config.log_dir.clone()),
        engine: EngineAdapter::new(config.engine_command.clone(), config.engine_args.clone()),
        config,
    };

    // Build router
    let app = create_router(state.clone());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: config::Config,
    pub store: ArtifactStore,
    pub logger: RunLogger,
    pub engine: EngineAdapter,
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    // SPA frontend: static assets with index.html as the catch-all fallback
    let static_files = ServeDir::new(&state.config.static_dir)
        .not_found_service(ServeFile::new(state.config.static_dir.join("index.html")));

    Router::new()
        .route("/health", get(handlers::health::check))
        .route("/analyze", post(handlers::analyze::analyze))
        .route("/logs", get(handlers::logs::list))
        .route("/logs/:filename", get(handlers::logs::read))
        .fallback_service(static_files)
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

// ============================================================================
// TESTS
// ============================================================================
