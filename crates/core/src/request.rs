//! Per-request state shared between the coordinator hooks and the render stage.

use http::Method;

/// One prerender request as it moves through the pipeline.
///
/// The coordinator reads `method` and `key` on the way in and may set
/// `suppress_output`; the render stage fills in `status_code` and `document`
/// before the completion hook runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub method: Method,
    /// Canonical page URL, used as the cache key.
    pub key: String,
    pub status_code: Option<u16>,
    pub document: Option<String>,
    /// Set when cached output was already sent: the render stage must build
    /// but not transmit.
    pub suppress_output: bool,
}

impl RenderRequest {
    pub fn new(method: Method, key: impl Into<String>) -> Self {
        Self { method, key: key.into(), status_code: None, document: None, suppress_output: false }
    }

    pub fn get(key: impl Into<String>) -> Self {
        Self::new(Method::GET, key)
    }

    /// Record the render outcome.
    pub fn complete(&mut self, status_code: u16, document: impl Into<String>) {
        self.status_code = Some(status_code);
        self.document = Some(document.into());
    }
}
