//! Application configuration with layered loading.
//!
//! Configuration is assembled with figment from, highest precedence first:
//!
//! 1. Environment variables (RENDERCACHE_*)
//! 2. TOML config file (if RENDERCACHE_CONFIG_FILE set)
//! 3. Store address from the usual hosting variables
//!    (REDISTOGO_URL, REDISCLOUD_URL, REDISGREEN_URL, REDIS_URL)
//! 4. Built-in defaults

use std::net::SocketAddr;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Hosting-provider variables that carry a store address, checked in order.
pub const STORE_URL_FALLBACK_VARS: &[&str] = &["REDISTOGO_URL", "REDISCLOUD_URL", "REDISGREEN_URL", "REDIS_URL"];

/// Which renderer produces pages on a cache miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    /// Plain HTTP fetch of the origin page, no JavaScript.
    Fetch,
    /// Headless Chromium.
    Headless,
}

/// Application configuration with layered loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Store target: `redis://`, `rediss://`, `sqlite://<path>` or `memory://`.
    ///
    /// Set via RENDERCACHE_STORE_URL, or one of the fallback variables.
    #[serde(default = "default_store_url")]
    pub store_url: String,

    /// Age in milliseconds after which a served entry also triggers a
    /// background rebuild.
    ///
    /// Set via RENDERCACHE_TTL_MS environment variable.
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// Age in milliseconds after which an entry is never served.
    ///
    /// Set via RENDERCACHE_DEAD_AFTER_MS environment variable.
    #[serde(default = "default_dead_after_ms")]
    pub dead_after_ms: u64,

    /// How long a `building` marker counts as a rebuild in flight.
    ///
    /// Set via RENDERCACHE_BUILD_WINDOW_MS environment variable.
    #[serde(default = "default_build_window_ms")]
    pub build_window_ms: u64,

    /// Rendered documents must be longer than this many UTF-16 code units to be cached.
    ///
    /// Set via RENDERCACHE_MIN_CONTENT_LEN environment variable.
    #[serde(default = "default_min_content_len")]
    pub min_content_len: usize,

    /// Seconds between store keep-alive pings.
    ///
    /// Set via RENDERCACHE_HEARTBEAT_SECS environment variable.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    /// Address the HTTP front listens on.
    ///
    /// Set via RENDERCACHE_LISTEN_ADDR environment variable.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Renderer used on a miss.
    ///
    /// Set via RENDERCACHE_RENDERER environment variable (`fetch` or `headless`).
    #[serde(default = "default_renderer")]
    pub renderer: RendererKind,

    /// Render timeout in milliseconds.
    ///
    /// Set via RENDERCACHE_RENDER_TIMEOUT_MS environment variable.
    #[serde(default = "default_render_timeout_ms")]
    pub render_timeout_ms: u64,

    /// User-Agent sent by the fetch renderer.
    ///
    /// Set via RENDERCACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum origin body size the fetch renderer accepts.
    ///
    /// Set via RENDERCACHE_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Allow rendering pages on private or loopback addresses.
    ///
    /// Set via RENDERCACHE_ALLOW_PRIVATE environment variable.
    #[serde(default)]
    pub allow_private: bool,
}

fn default_store_url() -> String {
    "redis://127.0.0.1:6379".into()
}

fn default_ttl_ms() -> u64 {
    24 * 60 * 60 * 1000
}

fn default_dead_after_ms() -> u64 {
    14 * 24 * 60 * 60 * 1000
}

fn default_build_window_ms() -> u64 {
    20_000
}

fn default_min_content_len() -> usize {
    // an empty document with doctype, head and title is around 78 characters
    100
}

fn default_heartbeat_secs() -> u64 {
    180
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_renderer() -> RendererKind {
    RendererKind::Fetch
}

fn default_render_timeout_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    format!("rendercache/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_bytes() -> usize {
    5 * 1024 * 1024
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_url: default_store_url(),
            ttl_ms: default_ttl_ms(),
            dead_after_ms: default_dead_after_ms(),
            build_window_ms: default_build_window_ms(),
            min_content_len: default_min_content_len(),
            heartbeat_secs: default_heartbeat_secs(),
            listen_addr: default_listen_addr(),
            renderer: default_renderer(),
            render_timeout_ms: default_render_timeout_ms(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            allow_private: false,
        }
    }
}

impl AppConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn dead_after(&self) -> Duration {
        Duration::from_millis(self.dead_after_ms)
    }

    pub fn build_window(&self) -> Duration {
        Duration::from_millis(self.build_window_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the config file or environment cannot be
    /// parsed, or if validation fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment()
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// The layered figment behind [`AppConfig::load`].
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(url) = fallback_store_url() {
            figment = figment.merge(Serialized::default("store_url", url));
        }

        if let Ok(config_path) = std::env::var("RENDERCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment.merge(
            Env::prefixed("RENDERCACHE_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        )
    }
}

fn fallback_store_url() -> Option<String> {
    STORE_URL_FALLBACK_VARS
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.trim().is_empty())
}
