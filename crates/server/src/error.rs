//! Structured errors for the HTTP front.
//!
//! Store failures never show up here; the coordinator swallows them. What
//! remains is a bad target URL or a render that did not produce a page.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rendercache_client::RenderError;

/// Errors surfaced to the HTTP client.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The request path does not name a page we can render.
    #[error("INVALID_TARGET: {0}")]
    InvalidTarget(#[from] rendercache_core::Error),

    /// Rendering failed.
    #[error("RENDER_FAILED: {0}")]
    Render(#[from] RenderError),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            ServerError::Render(RenderError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ServerError::Render(RenderError::Blocked(_)) => StatusCode::FORBIDDEN,
            ServerError::Render(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, "prerender request failed");
        } else {
            tracing::debug!(error = %self, "prerender request rejected");
        }
        (status, self.to_string()).into_response()
    }
}
