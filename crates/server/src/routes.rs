//! HTTP routes.
//!
//! `GET /health` reports store availability. Every other path is a page to
//! prerender: `GET /https://example.com/pricing?plan=pro` renders
//! `https://example.com/pricing?plan=pro`.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderValue, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use rendercache_core::CacheEntryStore;
use serde::Serialize;

use crate::pipeline::{PageResponse, PrerenderPipeline};

/// Response header naming the cache decision.
pub const CACHE_HEADER: &str = "x-prerender-cache";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: PrerenderPipeline,
    pub store: Arc<dyn CacheEntryStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .fallback(prerender)
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    store_available: bool,
}

async fn health(State(state): State<AppState>) -> Json<HealthBody> {
    // the cache is optional, so an unreachable store is not unhealthy
    Json(HealthBody { status: "ok", store_available: state.store.available() })
}

async fn prerender(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    let Some(target) = target_from_uri(&uri) else {
        return (StatusCode::BAD_REQUEST, "INVALID_TARGET: expected /<page url>").into_response();
    };

    match state.pipeline.handle(method, &target).await {
        Ok(page) => page_response(page),
        Err(e) => e.into_response(),
    }
}

/// The page URL carried in the request path and query.
fn target_from_uri(uri: &Uri) -> Option<String> {
    let path = uri.path().trim_start_matches('/');
    if path.is_empty() {
        return None;
    }

    // some proxies collapse `//` in paths
    let path = if let Some(rest) = path.strip_prefix("https:/").filter(|r| !r.starts_with('/')) {
        format!("https://{rest}")
    } else if let Some(rest) = path.strip_prefix("http:/").filter(|r| !r.starts_with('/')) {
        format!("http://{rest}")
    } else {
        path.to_string()
    };

    Some(match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path,
    })
}

fn page_response(page: PageResponse) -> Response {
    // a rebuild keeps running detached once its handle is dropped
    if page.rebuild.is_some() {
        tracing::debug!(cache = page.cache, "responded while rebuild runs");
    }

    let status = StatusCode::from_u16(page.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = (status, Body::from(page.html)).into_response();

    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
    headers.insert(CACHE_HEADER, HeaderValue::from_static(page.cache));
    response
}
