//! Error type shared by the service layer and the HTTP handlers.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type MarketResult<T> = std::result::Result<T, MarketError>;

impl MarketError {
    /// Single-message validation error
    pub fn invalid(message: impl Into<String>) -> Self {
        MarketError::Validation(vec![message.into()])
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        MarketError::NotFound(what.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            MarketError::Validation(_) => StatusCode::BAD_REQUEST,
            MarketError::NotFound(_) => StatusCode::NOT_FOUND,
            MarketError::Unauthorized => StatusCode::UNAUTHORIZED,
            MarketError::Forbidden(_) => StatusCode::FORBIDDEN,
            MarketError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for MarketError {
    fn from(rejection: JsonRejection) -> Self {
        MarketError::invalid(rejection.body_text())
    }
}

impl From<QueryRejection> for MarketError {
    fn from(rejection: QueryRejection) -> Self {
        MarketError::invalid(rejection.body_text())
    }
}

impl From<PathRejection> for MarketError {
    fn from(rejection: PathRejection) -> Self {
        MarketError::invalid(rejection.body_text())
    }
}

impl IntoResponse for MarketError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            MarketError::Validation(messages) => json!({
                "success": false,
                "errors": messages,
            }),
            MarketError::Internal(e) => {
                // Detail stays in the server log
                error!(error = ?e, "Request failed with internal error");
                json!({
                    "success": false,
                    "error": "Internal server error",
                })
            }
            other => json!({
                "success": false,
                "error": other.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}
