//! Serve-stale-while-revalidate decisions for prerendered pages.
//!
//! Each request passes through two hooks. [`FreshnessCoordinator::on_request_start`]
//! runs before rendering and decides whether to serve a cached page, render,
//! or both. [`FreshnessCoordinator::on_request_complete`] runs after rendering
//! and stores the result if it is worth keeping.
//!
//! Entry age is `now - created`:
//!
//! | age                         | behaviour                                    |
//! |-----------------------------|----------------------------------------------|
//! | `<= ttl`                    | serve, stop                                  |
//! | `> ttl`, `<= dead_after`    | serve, and rebuild unless one is in flight   |
//! | `> dead_after` or unknown   | miss: mark building, render                  |
//!
//! A rebuild counts as in flight while `now - building <= build_window`. The
//! check and the marker write are two separate round trips, so two requests
//! can both start a rebuild; the window only bounds how often that happens.
//! The marker is never cleared and simply ages out.

use std::sync::Arc;
use std::time::Duration;

use http::Method;

use crate::config::AppConfig;
use crate::entry::EntryPatch;
use crate::request::RenderRequest;
use crate::store::CacheEntryStore;

/// Freshness thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub ttl: Duration,
    pub dead_after: Duration,
    pub build_window: Duration,
    /// Documents must be longer than this (in UTF-16 code units) to be stored.
    pub min_content_len: usize,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FreshnessPolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            ttl: config.ttl(),
            dead_after: config.dead_after(),
            build_window: config.build_window(),
            min_content_len: config.min_content_len,
        }
    }
}

/// Outcome of the read hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartDecision {
    /// Caching not attempted (non-GET, or store unavailable). Render.
    Pass,
    /// Nothing servable. A `building` marker was written. Render.
    Miss,
    /// Serve the cached page; nothing else to do.
    Fresh(String),
    /// Serve the stale page; another request is already rebuilding it.
    InFlight(String),
    /// Serve the stale page and rebuild it in the background with output
    /// suppressed. A new `building` marker was written.
    Revalidate(String),
}

impl StartDecision {
    /// Page to send to the client right away, if any.
    pub fn served(&self) -> Option<&str> {
        match self {
            StartDecision::Fresh(html) | StartDecision::InFlight(html) | StartDecision::Revalidate(html) => Some(html),
            StartDecision::Pass | StartDecision::Miss => None,
        }
    }

    /// Whether the request continues to the render stage.
    pub fn proceeds(&self) -> bool {
        matches!(self, StartDecision::Pass | StartDecision::Miss | StartDecision::Revalidate(_))
    }

    /// Short label for logs and response headers.
    pub fn label(&self) -> &'static str {
        match self {
            StartDecision::Pass => "bypass",
            StartDecision::Miss => "miss",
            StartDecision::Fresh(_) => "hit",
            StartDecision::InFlight(_) => "stale",
            StartDecision::Revalidate(_) => "revalidate",
        }
    }
}

/// Why a completed render was not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    StoreUnavailable,
    Status(u16),
    NoStatus,
    TooShort,
}

/// Outcome of the write hook. The caller carries on regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteOutcome {
    Stored,
    Skipped(SkipReason),
    /// The write was attempted and failed; already logged.
    Failed,
}

/// Decides, per request, between serving from the store and rendering.
#[derive(Clone)]
pub struct FreshnessCoordinator {
    store: Arc<dyn CacheEntryStore>,
    policy: FreshnessPolicy,
}

impl std::fmt::Debug for FreshnessCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreshnessCoordinator")
            .field("policy", &self.policy)
            .field("store_available", &self.store.available())
            .finish()
    }
}

impl FreshnessCoordinator {
    pub fn new(store: Arc<dyn CacheEntryStore>, policy: FreshnessPolicy) -> Self {
        Self { store, policy }
    }

    /// Read hook, using the system clock.
    pub async fn on_request_start(&self, req: &mut RenderRequest) -> StartDecision {
        self.on_request_start_at(req, now_millis()).await
    }

    /// Read hook at an explicit time (ms since epoch).
    pub async fn on_request_start_at(&self, req: &mut RenderRequest, now: i64) -> StartDecision {
        if req.method != Method::GET || !self.store.available() {
            return StartDecision::Pass;
        }

        let entry = match self.store.get(&req.key).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(key = %req.key, error = %e, "cache read failed, treating as miss");
                None
            }
        };

        let Some(entry) = entry else {
            tracing::debug!(key = %req.key, "no cached page");
            return self.start_build(req, now, StartDecision::Miss).await;
        };

        let Some(html) = entry.html.clone() else {
            tracing::debug!(key = %req.key, "entry has no html");
            return self.start_build(req, now, StartDecision::Miss).await;
        };

        // a timestamp too far off to subtract reads as unknown
        let dead_after = millis(self.policy.dead_after);
        let age = match entry.created_at().and_then(|created| now.checked_sub(created)) {
            Some(age) if age <= dead_after => age,
            _ => {
                tracing::debug!(key = %req.key, created = ?entry.created, "cached page is dead, rebuilding");
                return self.start_build(req, now, StartDecision::Miss).await;
            }
        };

        if age <= millis(self.policy.ttl) {
            tracing::debug!(key = %req.key, age_ms = age, "serving fresh page");
            return StartDecision::Fresh(html);
        }

        if let Some(building_ms) = entry.building_since().and_then(|building| now.checked_sub(building))
            && building_ms <= millis(self.policy.build_window)
        {
            tracing::debug!(
                key = %req.key,
                age_ms = age,
                building_ms,
                "serving stale page, rebuild already in flight"
            );
            return StartDecision::InFlight(html);
        }

        tracing::debug!(key = %req.key, age_ms = age, "serving stale page and rebuilding in background");
        req.suppress_output = true;
        self.start_build(req, now, StartDecision::Revalidate(html)).await
    }

    /// Write hook, using the system clock.
    pub async fn on_request_complete(&self, req: &RenderRequest) -> CompleteOutcome {
        self.on_request_complete_at(req, now_millis()).await
    }

    /// Write hook at an explicit time (ms since epoch).
    pub async fn on_request_complete_at(&self, req: &RenderRequest, now: i64) -> CompleteOutcome {
        if !self.store.available() {
            return CompleteOutcome::Skipped(SkipReason::StoreUnavailable);
        }

        match req.status_code {
            Some(200) => {}
            Some(status) => {
                tracing::debug!(key = %req.key, status, "not caching non-200 render");
                return CompleteOutcome::Skipped(SkipReason::Status(status));
            }
            None => return CompleteOutcome::Skipped(SkipReason::NoStatus),
        }

        let Some(document) = req
            .document
            .as_deref()
            .filter(|doc| content_len(doc) > self.policy.min_content_len)
        else {
            tracing::debug!(key = %req.key, "not caching near-empty document");
            return CompleteOutcome::Skipped(SkipReason::TooShort);
        };

        match self.store.merge_set(&req.key, &EntryPatch::built(now, document)).await {
            Ok(()) => {
                tracing::debug!(key = %req.key, bytes = document.len(), "stored rendered page");
                CompleteOutcome::Stored
            }
            Err(e) => {
                tracing::debug!(key = %req.key, error = %e, "failed to store rendered page");
                CompleteOutcome::Failed
            }
        }
    }

    /// Write the `building` marker and hand back `decision`. A failed write
    /// is logged by the store; the request renders anyway.
    async fn start_build(&self, req: &RenderRequest, now: i64, decision: StartDecision) -> StartDecision {
        if let Err(e) = self.store.merge_set(&req.key, &EntryPatch::building(now)).await {
            tracing::debug!(key = %req.key, error = %e, "failed to mark rebuild in flight");
        }
        decision
    }
}

/// Current time in ms since epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Document length in UTF-16 code units, the unit browsers report.
fn content_len(document: &str) -> usize {
    document.encode_utf16().count()
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::CacheEntry;
    use crate::store::MemoryStore;

    const NOW: i64 = 1_700_000_000_000;
    const KEY: &str = "https://example.com/";

    fn policy() -> FreshnessPolicy {
        FreshnessPolicy {
            ttl: Duration::from_millis(1_000),
            dead_after: Duration::from_millis(10_000),
            build_window: Duration::from_millis(2_000),
            min_content_len: 100,
        }
    }

    fn setup() -> (Arc<MemoryStore>, FreshnessCoordinator) {
        let store = Arc::new(MemoryStore::new());
        let coordinator = FreshnessCoordinator::new(store.clone(), policy());
        (store, coordinator)
    }

    fn entry(created: Option<i64>, building: Option<i64>) -> CacheEntry {
        CacheEntry {
            html: Some("X".into()),
            created: created.map(|c| c.to_string()),
            building: building.map(|b| b.to_string()),
        }
    }

    fn long_document() -> String {
        format!("<!doctype html><html><head><title>t</title></head><body>{}</body></html>", "x".repeat(100))
    }

    #[tokio::test]
    async fn test_no_entry_is_miss_and_marks_building() {
        let (store, coordinator) = setup();
        let mut req = RenderRequest::get(KEY);

        let decision = coordinator.on_request_start_at(&mut req, NOW).await;

        assert_eq!(decision, StartDecision::Miss);
        assert!(decision.proceeds());
        assert!(decision.served().is_none());
        assert!(!req.suppress_output);
        assert_eq!(store.peek(KEY).unwrap().building_since(), Some(NOW));
    }

    #[tokio::test]
    async fn test_entry_without_html_is_miss() {
        let (store, coordinator) = setup();
        store.insert(KEY, CacheEntry { html: None, created: Some((NOW - 10).to_string()), building: None });
        let mut req = RenderRequest::get(KEY);

        assert_eq!(coordinator.on_request_start_at(&mut req, NOW).await, StartDecision::Miss);
        assert_eq!(store.peek(KEY).unwrap().building_since(), Some(NOW));
    }

    #[tokio::test]
    async fn test_fresh_entry_served_without_proceeding() {
        let (store, coordinator) = setup();
        store.insert(KEY, entry(Some(NOW - 500), None));
        let mut req = RenderRequest::get(KEY);

        let decision = coordinator.on_request_start_at(&mut req, NOW).await;

        assert_eq!(decision, StartDecision::Fresh("X".into()));
        assert_eq!(decision.served(), Some("X"));
        assert!(!decision.proceeds());
        assert!(store.peek(KEY).unwrap().building.is_none());
    }

    #[tokio::test]
    async fn test_age_equal_to_ttl_is_still_fresh() {
        let (store, coordinator) = setup();
        store.insert(KEY, entry(Some(NOW - 1_000), None));
        let mut req = RenderRequest::get(KEY);

        assert_eq!(coordinator.on_request_start_at(&mut req, NOW).await, StartDecision::Fresh("X".into()));
    }

    #[tokio::test]
    async fn test_stale_entry_triggers_background_rebuild() {
        let (store, coordinator) = setup();
        store.insert(KEY, entry(Some(NOW - 1_500), None));
        let mut req = RenderRequest::get(KEY);

        let decision = coordinator.on_request_start_at(&mut req, NOW).await;

        assert_eq!(decision, StartDecision::Revalidate("X".into()));
        assert_eq!(decision.served(), Some("X"));
        assert!(decision.proceeds());
        assert!(req.suppress_output);

        let stored = store.peek(KEY).unwrap();
        assert_eq!(stored.building_since(), Some(NOW));
        assert_eq!(stored.html.as_deref(), Some("X"));
        assert_eq!(stored.created_at(), Some(NOW - 1_500));
    }

    #[tokio::test]
    async fn test_stale_entry_with_recent_marker_only_serves() {
        let (store, coordinator) = setup();
        store.insert(KEY, entry(Some(NOW - 1_500), Some(NOW - 500)));
        let mut req = RenderRequest::get(KEY);

        let decision = coordinator.on_request_start_at(&mut req, NOW).await;

        assert_eq!(decision, StartDecision::InFlight("X".into()));
        assert!(!decision.proceeds());
        assert!(!req.suppress_output);
        assert_eq!(store.peek(KEY).unwrap().building_since(), Some(NOW - 500));
    }

    #[tokio::test]
    async fn test_marker_at_window_edge_still_in_flight() {
        let (store, coordinator) = setup();
        store.insert(KEY, entry(Some(NOW - 1_500), Some(NOW - 2_000)));
        let mut req = RenderRequest::get(KEY);

        assert_eq!(coordinator.on_request_start_at(&mut req, NOW).await, StartDecision::InFlight("X".into()));
    }

    #[tokio::test]
    async fn test_expired_marker_allows_new_rebuild() {
        let (store, coordinator) = setup();
        store.insert(KEY, entry(Some(NOW - 1_500), Some(NOW - 2_001)));
        let mut req = RenderRequest::get(KEY);

        assert_eq!(coordinator.on_request_start_at(&mut req, NOW).await, StartDecision::Revalidate("X".into()));
        assert!(req.suppress_output);
        assert_eq!(store.peek(KEY).unwrap().building_since(), Some(NOW));
    }

    #[tokio::test]
    async fn test_malformed_marker_allows_new_rebuild() {
        let (store, coordinator) = setup();
        let mut stale = entry(Some(NOW - 1_500), None);
        stale.building = Some("soon".into());
        store.insert(KEY, stale);
        let mut req = RenderRequest::get(KEY);

        assert_eq!(coordinator.on_request_start_at(&mut req, NOW).await, StartDecision::Revalidate("X".into()));
    }

    #[tokio::test]
    async fn test_dead_entry_is_miss() {
        let (store, coordinator) = setup();
        store.insert(KEY, entry(Some(NOW - 20_000), Some(NOW - 100)));
        let mut req = RenderRequest::get(KEY);

        let decision = coordinator.on_request_start_at(&mut req, NOW).await;

        assert_eq!(decision, StartDecision::Miss);
        assert!(decision.served().is_none());
        assert!(!req.suppress_output);
        assert_eq!(store.peek(KEY).unwrap().building_since(), Some(NOW));
    }

    #[tokio::test]
    async fn test_age_equal_to_dead_after_is_served() {
        let (store, coordinator) = setup();
        store.insert(KEY, entry(Some(NOW - 10_000), None));
        let mut req = RenderRequest::get(KEY);

        assert_eq!(coordinator.on_request_start_at(&mut req, NOW).await, StartDecision::Revalidate("X".into()));
    }

    #[tokio::test]
    async fn test_unparseable_or_missing_created_is_dead() {
        let (store, coordinator) = setup();

        let mut garbled = entry(None, None);
        garbled.created = Some("not-a-number".into());
        store.insert(KEY, garbled);
        let mut req = RenderRequest::get(KEY);
        assert_eq!(coordinator.on_request_start_at(&mut req, NOW).await, StartDecision::Miss);

        store.insert("https://example.com/other", entry(None, None));
        let mut req = RenderRequest::get("https://example.com/other");
        assert_eq!(coordinator.on_request_start_at(&mut req, NOW).await, StartDecision::Miss);
    }

    #[tokio::test]
    async fn test_non_get_passes_through_untouched() {
        let (store, coordinator) = setup();
        store.insert(KEY, entry(Some(NOW - 500), None));
        let mut req = RenderRequest::new(Method::POST, KEY);

        let decision = coordinator.on_request_start_at(&mut req, NOW).await;

        assert_eq!(decision, StartDecision::Pass);
        assert!(decision.proceeds());
        assert!(decision.served().is_none());
        assert!(store.peek(KEY).unwrap().building.is_none());
    }

    #[tokio::test]
    async fn test_unrepresentable_created_is_dead() {
        let (store, coordinator) = setup();
        store.insert(KEY, CacheEntry { html: Some("X".into()), created: Some(i64::MIN.to_string()), building: None });
        let mut req = RenderRequest::get(KEY);

        assert_eq!(coordinator.on_request_start_at(&mut req, NOW).await, StartDecision::Miss);
        assert_eq!(store.peek(KEY).unwrap().building_since(), Some(NOW));
    }

    #[tokio::test]
    async fn test_unrepresentable_building_is_no_marker() {
        let (store, coordinator) = setup();
        let mut stale = entry(Some(NOW - 1_500), None);
        stale.building = Some(i64::MIN.to_string());
        store.insert(KEY, stale);
        let mut req = RenderRequest::get(KEY);

        let decision = coordinator.on_request_start_at(&mut req, NOW).await;

        assert_eq!(decision, StartDecision::Revalidate("X".into()));
        assert!(req.suppress_output);
        assert_eq!(store.peek(KEY).unwrap().building_since(), Some(NOW));
    }

    #[tokio::test]
    async fn test_unavailable_store_passes_through() {
        let (store, coordinator) = setup();
        store.insert(KEY, entry(Some(NOW - 500), None));
        store.set_available(false);
        let mut req = RenderRequest::get(KEY);

        assert_eq!(coordinator.on_request_start_at(&mut req, NOW).await, StartDecision::Pass);
        assert!(store.peek(KEY).unwrap().building.is_none());
    }

    #[tokio::test]
    async fn test_read_failure_is_miss() {
        let (store, coordinator) = setup();
        store.insert(KEY, entry(Some(NOW - 500), None));
        store.set_reachable(false);
        let mut req = RenderRequest::get(KEY);

        let decision = coordinator.on_request_start_at(&mut req, NOW).await;

        assert_eq!(decision, StartDecision::Miss);
        assert!(decision.proceeds());
    }

    #[tokio::test]
    async fn test_second_request_sees_rebuild_in_flight() {
        let (store, coordinator) = setup();
        store.insert(KEY, entry(Some(NOW - 1_500), None));

        let mut first = RenderRequest::get(KEY);
        let mut second = RenderRequest::get(KEY);

        assert_eq!(coordinator.on_request_start_at(&mut first, NOW).await, StartDecision::Revalidate("X".into()));
        assert_eq!(coordinator.on_request_start_at(&mut second, NOW + 10).await, StartDecision::InFlight("X".into()));
        assert!(!second.suppress_output);
    }

    #[tokio::test]
    async fn test_complete_stores_good_render() {
        let (store, coordinator) = setup();
        let mut req = RenderRequest::get(KEY);
        req.complete(200, long_document());

        assert_eq!(coordinator.on_request_complete_at(&req, NOW).await, CompleteOutcome::Stored);

        let stored = store.peek(KEY).unwrap();
        assert_eq!(stored.html, Some(long_document()));
        assert_eq!(stored.created_at(), Some(NOW));
    }

    #[tokio::test]
    async fn test_complete_keeps_building_marker() {
        let (store, coordinator) = setup();
        store.insert(KEY, entry(Some(NOW - 1_500), Some(NOW - 100)));
        let mut req = RenderRequest::get(KEY);
        req.complete(200, long_document());

        coordinator.on_request_complete_at(&req, NOW).await;

        assert_eq!(store.peek(KEY).unwrap().building_since(), Some(NOW - 100));
    }

    #[tokio::test]
    async fn test_complete_skips_non_200() {
        let (store, coordinator) = setup();
        let mut req = RenderRequest::get(KEY);
        req.complete(404, long_document());

        assert_eq!(
            coordinator.on_request_complete_at(&req, NOW).await,
            CompleteOutcome::Skipped(SkipReason::Status(404))
        );
        assert!(store.peek(KEY).is_none());
    }

    #[tokio::test]
    async fn test_complete_skips_short_documents() {
        let (store, coordinator) = setup();
        let mut req = RenderRequest::get(KEY);
        req.complete(200, "x".repeat(100));

        assert_eq!(
            coordinator.on_request_complete_at(&req, NOW).await,
            CompleteOutcome::Skipped(SkipReason::TooShort)
        );
        assert!(store.peek(KEY).is_none());

        req.complete(200, "x".repeat(101));
        assert_eq!(coordinator.on_request_complete_at(&req, NOW).await, CompleteOutcome::Stored);
    }

    #[tokio::test]
    async fn test_complete_stores_non_get_render() {
        let (store, coordinator) = setup();
        let mut req = RenderRequest::new(Method::POST, KEY);
        req.complete(200, "x".repeat(200));

        assert_eq!(coordinator.on_request_complete_at(&req, NOW).await, CompleteOutcome::Stored);
        assert_eq!(store.peek(KEY).unwrap().html, Some("x".repeat(200)));
    }

    #[tokio::test]
    async fn test_content_length_counts_utf16_units() {
        let (store, coordinator) = setup();
        let mut req = RenderRequest::get(KEY);

        // 51 astral characters: 51 chars, 102 UTF-16 units
        req.complete(200, "\u{1F600}".repeat(51));
        assert_eq!(coordinator.on_request_complete_at(&req, NOW).await, CompleteOutcome::Stored);
        assert!(store.peek(KEY).unwrap().html.is_some());

        req.complete(200, "\u{1F600}".repeat(50));
        assert_eq!(
            coordinator.on_request_complete_at(&req, NOW).await,
            CompleteOutcome::Skipped(SkipReason::TooShort)
        );
    }

    #[tokio::test]
    async fn test_complete_skips_missing_render() {
        let (_store, coordinator) = setup();
        let req = RenderRequest::get(KEY);

        assert_eq!(
            coordinator.on_request_complete_at(&req, NOW).await,
            CompleteOutcome::Skipped(SkipReason::NoStatus)
        );
    }

    #[tokio::test]
    async fn test_complete_skips_when_store_unavailable() {
        let (store, coordinator) = setup();
        store.set_available(false);
        let mut req = RenderRequest::get(KEY);
        req.complete(200, long_document());

        assert_eq!(
            coordinator.on_request_complete_at(&req, NOW).await,
            CompleteOutcome::Skipped(SkipReason::StoreUnavailable)
        );
        assert!(store.peek(KEY).is_none());
    }

    #[tokio::test]
    async fn test_complete_write_failure_is_swallowed() {
        let (store, coordinator) = setup();
        store.set_reachable(false);
        let mut req = RenderRequest::get(KEY);
        req.complete(200, long_document());

        assert_eq!(coordinator.on_request_complete_at(&req, NOW).await, CompleteOutcome::Failed);
    }

    #[tokio::test]
    async fn test_scenario_from_cold_to_revalidated() {
        let (store, coordinator) = setup();

        // cold: render and store
        let mut req = RenderRequest::get(KEY);
        assert_eq!(coordinator.on_request_start_at(&mut req, NOW).await, StartDecision::Miss);
        req.complete(200, long_document());
        assert_eq!(coordinator.on_request_complete_at(&req, NOW + 300).await, CompleteOutcome::Stored);

        // fresh
        let mut req = RenderRequest::get(KEY);
        assert!(matches!(coordinator.on_request_start_at(&mut req, NOW + 800).await, StartDecision::Fresh(_)));

        // stale, the marker from the cold miss has expired
        let mut req = RenderRequest::get(KEY);
        assert!(matches!(
            coordinator.on_request_start_at(&mut req, NOW + 2_500).await,
            StartDecision::Revalidate(_)
        ));

        // dead
        let mut req = RenderRequest::get(KEY);
        assert_eq!(coordinator.on_request_start_at(&mut req, NOW + 20_000).await, StartDecision::Miss);
        assert_eq!(store.peek(KEY).unwrap().building_since(), Some(NOW + 20_000));
    }

    #[test]
    fn test_policy_from_config() {
        let config = AppConfig { ttl_ms: 1_000, dead_after_ms: 10_000, build_window_ms: 2_000, ..Default::default() };
        assert_eq!(FreshnessPolicy::from(&config), policy());
    }
}
