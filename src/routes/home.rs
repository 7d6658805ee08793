//! Greeting endpoint.

use crate::config::GREETING;

/// Returns the fixed greeting as `text/plain`.
///
/// Query string and headers are ignored; the response never varies.
pub async fn index() -> &'static str {
    GREETING
}
