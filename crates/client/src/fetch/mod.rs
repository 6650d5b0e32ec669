//! Plain HTTP renderer.
//!
//! Fetches the origin page without running scripts. Useful for sites that
//! render on the server already, and as the renderer when no browser is
//! available.
//!
//! - Target host is resolved and checked against private ranges first
//!   (unless `allow_private` is set)
//! - Redirects are followed here rather than inside reqwest, so every hop
//!   goes through the same check. Max redirects: 5
//! - Max body bytes: 5MB (configurable)
//! - Non-2xx statuses are returned as the page status, not as errors, so the
//!   cache decides what to keep

pub mod guard;

use std::time::{Duration, Instant};

use reqwest::{Client, header};
use url::Url;

use crate::render::{RenderError, RenderOptions, RenderedPage, Renderer, status_hint};

pub use guard::{check_target, is_blocked};

/// Configuration for the fetch renderer.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string.
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Skip the private-address check (default: false)
    pub allow_private: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("rendercache/{}", env!("CARGO_PKG_VERSION")),
            max_bytes: 5 * 1024 * 1024,
            max_redirects: 5,
            allow_private: false,
        }
    }
}

/// Renderer that fetches the origin HTML over HTTP.
pub struct FetchRenderer {
    http: Client,
    config: FetchConfig,
}

impl FetchRenderer {
    /// Create a new fetch renderer with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, RenderError> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| RenderError::BrowserLaunch(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    fn too_large(&self, len: usize) -> RenderError {
        RenderError::TooLarge(format!("{len} bytes exceeds {}", self.config.max_bytes))
    }

    /// Resolve a `Location` header against the URL that sent it and check the
    /// new target before it is requested.
    async fn next_hop(&self, from: &Url, location: &str) -> Result<Url, RenderError> {
        let next = from
            .join(location)
            .map_err(|e| RenderError::Navigation(format!("bad redirect location {location:?}: {e}")))?;

        if !matches!(next.scheme(), "http" | "https") {
            return Err(RenderError::Blocked(format!("redirect to {next}")));
        }
        if !self.config.allow_private {
            check_target(&next).await?;
        }
        Ok(next)
    }

    async fn send(&self, url: &Url, opts: &RenderOptions) -> Result<reqwest::Response, RenderError> {
        self.http
            .get(url.as_str())
            .header(header::ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .timeout(Duration::from_millis(opts.timeout_ms))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RenderError::Timeout(opts.timeout_ms)
                } else {
                    RenderError::Navigation(format!("network error: {e}"))
                }
            })
    }
}

#[async_trait::async_trait]
impl Renderer for FetchRenderer {
    async fn render(&self, url: &Url, opts: &RenderOptions) -> Result<RenderedPage, RenderError> {
        let start = Instant::now();

        if !self.config.allow_private {
            check_target(url).await?;
        }

        let mut current = url.clone();
        let mut redirects = 0;
        let response = loop {
            let response = self.send(&current, opts).await?;
            if !response.status().is_redirection() {
                break response;
            }
            let Some(location) = response.headers().get(header::LOCATION) else {
                break response;
            };
            if redirects >= self.config.max_redirects {
                return Err(RenderError::Navigation(format!(
                    "more than {} redirects from {url}",
                    self.config.max_redirects
                )));
            }

            let location = location
                .to_str()
                .map_err(|e| RenderError::Navigation(format!("bad redirect location: {e}")))?
                .to_string();
            current = self.next_hop(&current, &location).await?;
            redirects += 1;
        };

        let status = response.status().as_u16();
        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(self.too_large(len as usize));
        }

        let final_url = current;
        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                RenderError::Timeout(opts.timeout_ms)
            } else {
                RenderError::ContentRetrieval(format!("failed to read response: {e}"))
            }
        })?;

        if bytes.len() > self.config.max_bytes {
            return Err(self.too_large(bytes.len()));
        }

        let html = String::from_utf8_lossy(&bytes).into_owned();
        let status_code = match status {
            200 => status_hint(&html).unwrap_or(200),
            other => other,
        };
        let render_time_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            "fetched {} -> {} status {} in {}ms ({} bytes)",
            url,
            final_url,
            status_code,
            render_time_ms,
            bytes.len()
        );

        Ok(RenderedPage { html, final_url, status_code, render_time_ms })
    }
}
