//! HTTP server module.
//!
//! Serves the router over plain HTTP (TLS terminates at the platform's
//! ingress) and drains in-flight requests on SIGTERM/SIGINT.

mod server;
mod shutdown;

pub use server::{start_server, ServerError};
