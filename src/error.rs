use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Failed to render page: {0}")]
    Template(#[from] askama::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::Template(_) => "template_error",
            AppError::Database(_) => "database_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!("{}", self);

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": self.code(),
                "message": self.to_string()
            })),
        )
            .into_response()
    }
}
