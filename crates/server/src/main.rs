//! rendercache server entry point.
//!
//! Loads configuration, opens the cache store, picks a renderer and serves
//! the prerender front over HTTP. Logs are JSON on stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use rendercache_client::{FetchConfig, FetchRenderer, RenderOptions, Renderer};
use rendercache_core::{AppConfig, FreshnessCoordinator, FreshnessPolicy, RendererKind, open_store, spawn_heartbeat};
use tracing_subscriber::EnvFilter;

mod error;
mod pipeline;
mod routes;

use pipeline::PrerenderPipeline;
use routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;

    let store = open_store(&config.store_url)
        .await
        .with_context(|| format!("opening cache store {}", redacted(&config.store_url)))?;
    tracing::info!(
        store = %redacted(&config.store_url),
        available = store.available(),
        "cache store opened"
    );
    let _heartbeat = spawn_heartbeat(store.clone(), config.heartbeat_interval());

    let renderer = build_renderer(&config).await?;
    let options = RenderOptions { timeout_ms: config.render_timeout_ms, ..Default::default() };
    let coordinator = FreshnessCoordinator::new(store.clone(), FreshnessPolicy::from(&config));
    let pipeline = PrerenderPipeline::new(coordinator, renderer, options);

    let app = routes::router(AppState { pipeline, store });
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;

    tracing::info!(addr = %config.listen_addr, renderer = ?config.renderer, "rendercache listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("rendercache stopped");
    Ok(())
}

async fn build_renderer(config: &AppConfig) -> Result<Arc<dyn Renderer>> {
    match config.renderer {
        RendererKind::Fetch => {
            let fetch = FetchRenderer::new(FetchConfig {
                user_agent: config.user_agent.clone(),
                max_bytes: config.max_bytes,
                allow_private: config.allow_private,
                ..Default::default()
            })?;
            Ok(Arc::new(fetch))
        }
        #[cfg(feature = "render")]
        RendererKind::Headless => {
            let headless = rendercache_client::HeadlessRenderer::launch((1280, 800)).await?;
            Ok(Arc::new(headless))
        }
        #[cfg(not(feature = "render"))]
        RendererKind::Headless => anyhow::bail!("headless renderer requested but built without the `render` feature"),
    }
}

/// Store URL with any password replaced, for logs.
fn redacted(store_url: &str) -> String {
    match url::Url::parse(store_url) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("***"));
            url.to_string()
        }
        _ => store_url.to_string(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
