//! HTTP-facing errors.
//!
//! Service-level failures are handled per request and rendered as a response;
//! they never terminate the process.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("No route for {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::RouteNotFound { method, path } => {
                tracing::debug!(%method, %path, "Route not found");
                "Not Found".to_string()
            }
            AppError::Internal(_) => {
                tracing::error!("Internal error: {:?}", self);
                "Internal server error".to_string()
            }
        };

        (status, message).into_response()
    }
}
