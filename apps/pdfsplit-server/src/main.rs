//! PDF splitter server
//!
//! REST API for working with uploaded PDFs:
//!
//! - Upload with signature check and metadata extraction
//! - Page text extraction
//! - Page selection split ("1-3,5,end") into a new downloadable PDF
//! - Batch split with per-file isolation and a ZIP of the results
//!
//! ## Storage
//!
//! Uploads and outputs live under one storage directory with generated
//! names. Files expire after a TTL and are removed by a background sweeper;
//! what is left is purged on shutdown unless told otherwise.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod config;
mod error;
mod services;
mod storage;

use api::{
    handle_batch_process, handle_batch_split, handle_document_info, handle_document_text,
    handle_download, handle_health, handle_split, handle_upload,
};
use config::{Args, ServerConfig};
use services::{BatchService, DocumentService, SplitService};
use storage::Storage;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub storage: Storage,
    pub documents: DocumentService,
    pub splitter: SplitService,
    pub batch: BatchService,
}

impl AppState {
    pub async fn new(config: ServerConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let storage = Storage::open(
            &config.storage_dir,
            config.ttl,
            config.max_upload_bytes,
        )
        .await?;

        let splitter = SplitService::new(storage.clone());
        let batch = BatchService::new(
            splitter.clone(),
            storage.clone(),
            config.batch_concurrency,
            config.max_batch_files,
        );

        Ok(AppState {
            documents: DocumentService::new(storage.clone()),
            config: Arc::new(config),
            storage,
            splitter,
            batch,
        })
    }
}

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let batch_limit = DefaultBodyLimit::max(state.config.batch_body_limit());
    let upload_limit = DefaultBodyLimit::max(state.config.upload_body_limit());

    Router::new()
        // Health check
        .route("/health", get(handle_health))
        // Documents
        .route("/upload", post(handle_upload))
        .route("/documents/:id", get(handle_document_info))
        .route("/documents/:id/text", get(handle_document_text))
        .route("/download/:filename", get(handle_download))
        // Processing
        .route("/split", post(handle_split))
        .route("/batch-split", post(handle_batch_split))
        .route(
            "/batch-process",
            post(handle_batch_process).layer(batch_limit),
        )
        // Apply middleware
        .layer(upload_limit)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from(args);
    info!("Starting PDF splitter server on {}:{}", config.host, config.port);

    let state = AppState::new(config).await?;
    let config = state.config.clone();
    let storage = state.storage.clone();
    let sweeper = storage.spawn_sweeper(config.sweep_interval);

    let app = build_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Storage directory: {}", storage.root().display());
    info!(
        "File TTL: {}s, upload limit: {} bytes, batch: {} files x {} concurrent",
        config.ttl.as_secs(),
        config.max_upload_bytes,
        config.max_batch_files,
        config.batch_concurrency
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    if config.purge_on_shutdown {
        let removed = storage.purge_all().await;
        info!("Removed {} stored files", removed);
    }
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
