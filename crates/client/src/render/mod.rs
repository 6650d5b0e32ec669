//! Page renderers.
//!
//! A [`Renderer`] turns a page URL into HTML plus the status code the page
//! should be served with. Two implementations exist:
//!
//! - [`crate::fetch::FetchRenderer`]: plain HTTP fetch, no JavaScript
//! - [`HeadlessRenderer`]: headless Chromium through chromiumoxide
//!   (feature `render`)

#[cfg(feature = "render")]
mod headless;
mod status;

use thiserror::Error;
use url::Url;

#[cfg(feature = "render")]
pub use headless::HeadlessRenderer;
pub use status::{STATUS_META_NAME, status_hint};

/// Errors that can occur during page rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Failed to launch or connect to browser.
    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),

    /// Failed to navigate to or fetch the URL.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Failed to get page content.
    #[error("content retrieval failed: {0}")]
    ContentRetrieval(String),

    /// Timeout waiting for page to load.
    #[error("render timeout after {0}ms")]
    Timeout(u64),

    /// Wait selector not found.
    #[error("wait_for selector not found: {0}")]
    SelectorNotFound(String),

    /// Target resolves to an address we refuse to render.
    #[error("blocked target: {0}")]
    Blocked(String),

    /// Origin response larger than the configured limit.
    #[error("response too large: {0}")]
    TooLarge(String),
}

/// Options for rendering a page.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Timeout in milliseconds (default: 30000).
    pub timeout_ms: u64,

    /// Optional CSS selector to wait for before taking the page content.
    pub wait_for: Option<String>,

    /// Time to let scripts settle when no selector is given (default: 2000).
    pub settle_ms: u64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { timeout_ms: 30_000, wait_for: None, settle_ms: 2_000 }
    }
}

/// Result of rendering a page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Rendered HTML content.
    pub html: String,

    /// Final URL after redirects.
    pub final_url: Url,

    /// Status the page should be served with.
    pub status_code: u16,

    /// Time taken to render in milliseconds.
    pub render_time_ms: u64,
}

/// Renderer trait for producing a page's HTML.
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    /// Render a URL to HTML.
    async fn render(&self, url: &Url, opts: &RenderOptions) -> Result<RenderedPage, RenderError>;
}
