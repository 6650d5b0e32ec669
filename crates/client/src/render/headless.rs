//! Headless Chrome/Chromium renderer using chromiumoxide.

use std::time::{Duration, Instant};

use url::Url;

use super::{RenderError, RenderOptions, RenderedPage, Renderer, status_hint};

/// Renders pages in one shared headless browser, a new tab per page.
pub struct HeadlessRenderer {
    browser: chromiumoxide::Browser,
}

impl HeadlessRenderer {
    /// Launch a headless browser with the given window size.
    ///
    /// A background task drains Chrome DevTools Protocol events for as long
    /// as the browser lives.
    pub async fn launch(viewport: (u32, u32)) -> Result<Self, RenderError> {
        use chromiumoxide::browser::{Browser, BrowserConfig};
        use futures_util::StreamExt;

        let config = BrowserConfig::builder()
            .window_size(viewport.0, viewport.1)
            .build()
            .map_err(RenderError::BrowserLaunch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::BrowserLaunch(e.to_string()))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("browser handler event error: {e}");
                    break;
                }
            }
        });

        tracing::info!(width = viewport.0, height = viewport.1, "headless browser launched");
        Ok(Self { browser })
    }

    async fn render_page(&self, url: &Url, opts: &RenderOptions) -> Result<RenderedPage, RenderError> {
        let start = Instant::now();
        let page = self
            .browser
            .new_page(url.as_str())
            .await
            .map_err(|e| RenderError::Navigation(e.to_string()))?;

        if let Some(selector) = &opts.wait_for {
            let mut found = false;
            while !found {
                found = page.find_element(selector.as_str()).await.is_ok();
                if !found {
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
            }
        } else {
            tokio::time::sleep(Duration::from_millis(opts.settle_ms)).await;
        }

        let html = page
            .content()
            .await
            .map_err(|e| RenderError::ContentRetrieval(e.to_string()))?;

        let page_url = page
            .url()
            .await
            .map_err(|e| RenderError::ContentRetrieval(e.to_string()))?;

        let final_url = Url::parse(page_url.as_deref().unwrap_or(url.as_str()))
            .map_err(|e| RenderError::Navigation(e.to_string()))?;

        page.close().await.ok();

        let status_code = status_hint(&html).unwrap_or(200);
        let render_time_ms = start.elapsed().as_millis() as u64;

        Ok(RenderedPage { html, final_url, status_code, render_time_ms })
    }
}

#[async_trait::async_trait]
impl Renderer for HeadlessRenderer {
    async fn render(&self, url: &Url, opts: &RenderOptions) -> Result<RenderedPage, RenderError> {
        match tokio::time::timeout(Duration::from_millis(opts.timeout_ms), self.render_page(url, opts)).await {
            Ok(result) => result,
            Err(_) => match &opts.wait_for {
                Some(selector) => Err(RenderError::SelectorNotFound(selector.clone())),
                None => Err(RenderError::Timeout(opts.timeout_ms)),
            },
        }
    }
}
