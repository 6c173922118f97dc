//! Liveness endpoint.

use axum::http::StatusCode;

/// Returns 200 OK with the text "OK" while the server accepts connections.
///
/// This says nothing about the collaborators; a branch whose store or
/// GitHub calls fail keeps retrying in its worker.
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
