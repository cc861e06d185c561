//! Flood-wait tracking for outbound Telegram calls.
//!
//! Telegram answers a burst of sends with `FLOOD_WAIT_<n>`. Sleeping
//! inside the handler would stall every other event, so instead the guard
//! remembers the deadline and refuses sends until it has passed.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Remembers the current flood-wait window, if any.
#[derive(Debug, Default)]
pub struct FloodGuard {
    /// Sends are refused until this instant.
    blocked_until: Mutex<Option<Instant>>,
}

impl FloodGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the remaining wait in whole seconds (rounded up) if a send
    /// must be refused now.
    pub async fn check(&self) -> Option<u32> {
        let mut blocked = self.blocked_until.lock().await;
        let until = (*blocked)?;
        let remaining = until.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            debug!("Flood wait window elapsed");
            *blocked = None;
            return None;
        }
        let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
        Some(u32::try_from(secs).unwrap_or(u32::MAX))
    }

    /// Records a flood wait reported by Telegram.
    ///
    /// A shorter report never shortens an existing window.
    pub async fn handle_flood_wait(&self, wait_seconds: u32) {
        warn!("Received flood wait from Telegram: {} seconds", wait_seconds);
        let until = Instant::now() + Duration::from_secs(u64::from(wait_seconds));
        let mut blocked = self.blocked_until.lock().await;
        *blocked = Some(blocked.map_or(until, |current| current.max(until)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fresh_guard_allows() {
        let guard = FloodGuard::new();
        assert_eq!(guard.check().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flood_wait_blocks_until_elapsed() {
        let guard = FloodGuard::new();
        guard.handle_flood_wait(30).await;
        assert_eq!(guard.check().await, Some(30));

        tokio::time::advance(Duration::from_millis(10_500)).await;
        assert_eq!(guard.check().await, Some(20));

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(guard.check().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shorter_wait_does_not_shorten_window() {
        let guard = FloodGuard::new();
        guard.handle_flood_wait(60).await;
        guard.handle_flood_wait(5).await;
        assert_eq!(guard.check().await, Some(60));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(guard.check().await, Some(30));
    }
}
