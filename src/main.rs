//! Content Portal Backend
//!
//! REST backend for the portal admin: generic document collections, the tag
//! reference index and file uploads, persisted in SQLite.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod files;
mod models;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{Config, LogFormat};
use db::{DocumentStore, TagIndex};
use files::FileStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: DocumentStore,
    pub tags: TagIndex,
    pub files: FileStore,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    init_tracing(&config);

    tracing::info!("Starting Content Portal Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Upload directory: {:?}", config.upload_dir);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Warn if PSK is not configured
    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (PORTAL_API_PSK). Authentication is disabled!");
    }

    let store = DocumentStore::connect(&config.db_path).await?;
    let tags = TagIndex::new(store.clone(), config.tag_conflict);
    let files = FileStore::open(&config.upload_dir, config.max_upload_bytes, store.clone()).await?;

    let state = AppState {
        store: store.clone(),
        tags,
        files,
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    tracing::info!("Database closed");

    Ok(())
}

fn init_tracing(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();

    // Uploads carry their own limit; everything else keeps axum's default.
    let file_routes = Router::new()
        .route("/files", post(api::upload_file))
        .route("/files/{id}", get(api::get_file).delete(api::delete_file))
        .route("/files/{id}/raw", get(api::download_file))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes));

    // API routes
    let api_routes = Router::new()
        // Tags
        .route("/tags", get(api::get_tags))
        .route("/tags", post(api::create_tag))
        .route("/tags/{id}", put(api::update_tag))
        .route("/tags/{id}", delete(api::delete_tag))
        .route("/tags/{id}/references", delete(api::remove_reference))
        // References of one resource, kept off the `/tags/{id}` namespace
        .route("/tag-references", get(api::lookup_tags))
        .route("/tag-references", post(api::add_reference))
        .route("/tag-references", put(api::sync_tags))
        // Resources
        .route("/resources/{kind}", get(api::list_resources))
        .route("/resources/{kind}", post(api::create_resource))
        .route("/resources/{kind}/slug/{slug}", get(api::get_resource_by_slug))
        .route("/resources/{kind}/{id}", get(api::get_resource))
        .route("/resources/{kind}/{id}", put(api::update_resource))
        .route("/resources/{kind}/{id}", delete(api::delete_resource))
        .route("/resources/{kind}/{id}/related", get(api::related_resources))
        // Files
        .merge(file_routes)
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received, draining connections");
}

#[cfg(test)]
mod tests;
