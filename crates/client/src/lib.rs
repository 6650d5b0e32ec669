//! Renderers for rendercache.
//!
//! This crate provides the [`Renderer`] trait the server renders misses
//! through, an HTTP fetch renderer, and a headless Chromium renderer behind
//! the `render` feature.

pub mod fetch;
pub mod render;

pub use fetch::{FetchConfig, FetchRenderer};
#[cfg(feature = "render")]
pub use render::HeadlessRenderer;
pub use render::{RenderError, RenderOptions, RenderedPage, Renderer};
