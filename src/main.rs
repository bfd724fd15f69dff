use axum::{middleware::from_fn, response::IntoResponse, routing::get, Json, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod artwork;
mod config;
mod db;
mod error;
mod middleware;
mod pages;

use artwork::ArtworkFetcher;
use config::AppConfig;
use db::Database;

#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    db: Database,
    artwork: Arc<ArtworkFetcher>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "greensleeves_web=debug,tower_http=debug,axum=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    // Fallback assets live here; cache/ is created on the first buffered fetch
    tokio::fs::create_dir_all(config.static_dir.join("images")).await?;
    info!("Serving static files from {}", config.static_dir.display());

    let db = db::init_db(&config.database_path).await?;
    info!("Database initialized");

    let artwork = Arc::new(ArtworkFetcher::new(config.artwork.clone())?);
    info!(
        candidates = config.artwork.candidates.len(),
        timeout_secs = config.artwork.timeout.as_secs_f64(),
        cache_fetched_images = config.artwork.cache_fetched_images,
        "Artwork proxy configured"
    );

    let addr = config.bind_addr;
    let state = AppState {
        config: Arc::new(config),
        db,
        artwork,
    };

    info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub fn app(state: AppState) -> Router {
    // Proxy route first; everything else under /static comes from disk
    let static_routes =
        artwork::routes().fallback_service(ServeDir::new(&state.config.static_dir));

    Router::new()
        .route("/healthy", get(health))
        .merge(pages::routes::<AppState>())
        .nest("/static", static_routes)
        .nest("/api", api::routes())
        .layer(from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json("Health check complete")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[cfg(test)]
impl AppState {
    pub async fn for_tests(config: AppConfig) -> Self {
        let db = db::DbPool::in_memory().await.unwrap();
        db::run_migrations(&db).await.unwrap();
        let artwork = Arc::new(ArtworkFetcher::new(config.artwork.clone()).unwrap());

        Self {
            config: Arc::new(config),
            db,
            artwork,
        }
    }
}
