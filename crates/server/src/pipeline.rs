//! The prerender request pipeline.
//!
//! Wraps a [`Renderer`] with the coordinator's two hooks:
//!
//! 1. `on_request_start` decides from the store
//! 2. if the request proceeds, the renderer runs
//! 3. `on_request_complete` stores the result if it qualifies
//!
//! A stale page is answered from the store straight away; its rebuild runs
//! on a detached task whose output is dropped.

use std::sync::Arc;

use axum::http::Method;
use rendercache_client::{RenderOptions, RenderedPage, Renderer};
use rendercache_core::{FreshnessCoordinator, RenderRequest, StartDecision, key};
use tokio::task::JoinHandle;
use url::Url;

use crate::error::ServerError;

/// What to send back for one request.
#[derive(Debug)]
pub struct PageResponse {
    pub status: u16,
    pub html: String,
    /// Decision label, sent as `X-Prerender-Cache`.
    pub cache: &'static str,
    /// Background rebuild started by this request, if any.
    pub rebuild: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct PrerenderPipeline {
    coordinator: FreshnessCoordinator,
    renderer: Arc<dyn Renderer>,
    options: RenderOptions,
}

impl PrerenderPipeline {
    pub fn new(coordinator: FreshnessCoordinator, renderer: Arc<dyn Renderer>, options: RenderOptions) -> Self {
        Self { coordinator, renderer, options }
    }

    /// Run one request for `target` through the cache and, if needed, the renderer.
    pub async fn handle(&self, method: Method, target: &str) -> Result<PageResponse, ServerError> {
        let url = key::canonical_url(target)?;
        let mut req = RenderRequest::new(method, url.as_str());

        let decision = self.coordinator.on_request_start(&mut req).await;
        let cache = decision.label();
        tracing::debug!(key = %req.key, cache, "prerender decision");

        match decision {
            StartDecision::Fresh(html) | StartDecision::InFlight(html) => {
                Ok(PageResponse { status: 200, html, cache, rebuild: None })
            }
            StartDecision::Revalidate(html) => {
                let rebuild = self.spawn_rebuild(url, req);
                Ok(PageResponse { status: 200, html, cache, rebuild: Some(rebuild) })
            }
            StartDecision::Pass | StartDecision::Miss => {
                let page = self.render(&url, &mut req).await?;
                Ok(PageResponse { status: page.status_code, html: page.html, cache, rebuild: None })
            }
        }
    }

    /// Render stage plus the completion hook.
    async fn render(&self, url: &Url, req: &mut RenderRequest) -> Result<RenderedPage, ServerError> {
        let page = self.renderer.render(url, &self.options).await?;
        tracing::debug!(key = %req.key, status = page.status_code, render_ms = page.render_time_ms, "rendered page");

        req.complete(page.status_code, page.html.clone());
        let outcome = self.coordinator.on_request_complete(req).await;
        tracing::debug!(key = %req.key, ?outcome, "completion hook finished");

        Ok(page)
    }

    fn spawn_rebuild(&self, url: Url, mut req: RenderRequest) -> JoinHandle<()> {
        let pipeline = self.clone();
        tokio::spawn(async move {
            match pipeline.render(&url, &mut req).await {
                // cached output was already sent
                Ok(_) if req.suppress_output => tracing::debug!(key = %req.key, "background rebuild finished"),
                Ok(_) => tracing::warn!(key = %req.key, "background rebuild finished without output suppression"),
                Err(e) => tracing::warn!(key = %req.key, error = %e, "background rebuild failed"),
            }
        })
    }
}
