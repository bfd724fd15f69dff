use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::AppError;
use crate::AppState;

/// Application API, nested under `/api`
pub fn routes() -> axum::Router<AppState> {
    axum::Router::new().route("/status", axum::routing::get(status))
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    schema_version: i64,
    /// Artwork responses currently streaming from an upstream
    open_artwork_streams: usize,
    version: &'static str,
}

/// GET /api/status
/// Round trip to the database and report the applied schema version along
/// with the number of artwork streams in flight
async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, AppError> {
    let schema_version = state.db.schema_version().await?;

    Ok(Json(StatusResponse {
        status: "ok",
        schema_version,
        open_artwork_streams: state.artwork.open_streams(),
        version: env!("CARGO_PKG_VERSION"),
    }))
}
