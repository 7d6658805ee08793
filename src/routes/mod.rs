//! HTTP route handlers.
//!
//! Routing is a fixed table of method + path to handler. Anything the table
//! does not match, including a known path with another method, is a 404.
//!
//! Request tracing is enabled via middleware that generates a unique request ID
//! for each incoming request, allowing correlation of all logs within a request.

pub mod health;
pub mod home;

use axum::{
    extract::Request,
    middleware,
    routing::{get, MethodRouter},
    Router,
};
use axum::http::header::{HeaderValue, CACHE_CONTROL};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::CACHE_CONTROL_HEALTH;
use crate::error::AppError;
use crate::middleware::request_id_layer;

/// Fallback for every unmatched method or path.
pub async fn not_found(request: Request) -> AppError {
    AppError::RouteNotFound {
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
    }
}

/// GET-only route whose other methods fall through to 404 rather than 405.
fn get_only<H, T>(handler: H) -> MethodRouter
where
    H: axum::handler::Handler<T, ()>,
    T: 'static,
{
    get(handler).fallback(not_found)
}

/// Creates the Axum router. The service holds no state, so neither does the router.
pub fn create_router() -> Router {
    let home_routes = Router::new().route("/", get_only(home::index));

    // Health check - never cached, always fresh for liveness probes
    let health_routes = Router::new()
        .route("/health", get_only(health::health))
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_HEALTH),
        ));

    Router::new()
        .merge(home_routes)
        .merge(health_routes)
        .fallback(not_found)
        // Request ID middleware - creates root span with request_id for correlation
        .layer(middleware::from_fn(request_id_layer))
}
