//! ValenCloud: a greeting service and the gate that tests, builds and
//! publishes it.
//!
//! The service exposes `GET /` and `GET /health`. The pipeline gate runs the
//! service's test suite, builds its container image, and publishes the image
//! from the release branch only.

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod middleware;
pub mod pipeline;
pub mod routes;

pub use config::AppConfig;
pub use error::AppError;
pub use routes::create_router;
