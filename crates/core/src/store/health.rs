//! Store reachability tracking and deduplicated error logging.
//!
//! A store that is down tends to fail every command with the same message.
//! Each distinct message is logged once at `warn`; repeats drop to `debug`
//! until a different error shows up.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Availability flag plus the last error message that was logged.
#[derive(Debug)]
pub struct StoreHealth {
    name: &'static str,
    up: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl StoreHealth {
    pub fn new(name: &'static str, up: bool) -> Self {
        Self { name, up: AtomicBool::new(up), last_error: Mutex::new(None) }
    }

    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }

    /// Record a successful round trip.
    pub fn mark_up(&self) {
        if !self.up.swap(true, Ordering::AcqRel) {
            tracing::info!(store = self.name, "cache store connected");
            if let Ok(mut last) = self.last_error.lock() {
                *last = None;
            }
        }
    }

    /// Record that the store is unreachable. Requests bypass the cache until
    /// the next successful round trip.
    pub fn mark_down(&self, reason: &str) {
        if self.up.swap(false, Ordering::AcqRel) {
            tracing::warn!(store = self.name, reason, "cache store connection lost, bypassing cache until it is back");
        }
        self.report(reason);
    }

    /// Log an error unless it repeats the previous one. Returns whether it was
    /// logged at `warn`.
    pub fn report(&self, message: &str) -> bool {
        let Ok(mut last) = self.last_error.lock() else {
            tracing::warn!(store = self.name, error = message, "cache store error");
            return true;
        };

        if last.as_deref() == Some(message) {
            tracing::debug!(store = self.name, error = message, "cache store error (repeated)");
            return false;
        }

        tracing::warn!(store = self.name, error = message, "cache store error");
        *last = Some(message.to_string());
        true
    }

    /// Route a store error: connection-level errors flip the flag, the rest
    /// are only logged.
    pub fn observe(&self, err: &crate::Error) {
        let message = err.to_string();
        if err.is_connection_error() {
            self.mark_down(&message);
        } else {
            self.report(&message);
        }
    }
}
