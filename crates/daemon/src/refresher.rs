//! Periodic refresh of the permitted webhook origin ranges.
//!
//! The provider publishes its hook ranges and changes them from time to time.
//! A failed refresh keeps the last good set; configured static ranges are
//! always merged in.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing::{info, warn};

use discussmail_core::errors::OriginError;
use discussmail_core::origin::fetch_hook_ranges;
use discussmail_core::{OriginRanges, SharedOriginRanges};

/// Counters across refresh attempts.
#[derive(Default)]
pub struct RefreshStats {
    pub total_refreshes: AtomicU64,
    pub total_failures: AtomicU64,
    pub consecutive_failures: AtomicU64,
}

pub struct RangeRefresher {
    client: reqwest::Client,
    api_url: String,
    static_ranges: OriginRanges,
    interval: Duration,
    shared: Arc<SharedOriginRanges>,
    stats: Arc<RefreshStats>,
}

impl RangeRefresher {
    pub fn new(
        client: reqwest::Client,
        api_url: impl Into<String>,
        static_ranges: OriginRanges,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            shared: Arc::new(SharedOriginRanges::new(static_ranges.clone())),
            static_ranges,
            interval,
            stats: Arc::new(RefreshStats::default()),
        }
    }

    /// Handle readers use to snapshot the current ranges.
    pub fn shared(&self) -> Arc<SharedOriginRanges> {
        Arc::clone(&self.shared)
    }

    pub fn stats(&self) -> Arc<RefreshStats> {
        Arc::clone(&self.stats)
    }

    /// Fetch once at startup. Fails only when nothing at all is permitted.
    pub async fn load_initial(&self) -> Result<usize, OriginError> {
        match fetch_hook_ranges(&self.client, &self.api_url).await {
            Err(e) if self.static_ranges.is_empty() => return Err(e),
            fetched => {
                self.apply(fetched);
            }
        }
        Ok(self.shared.snapshot().len())
    }

    /// Main refresh loop. Runs until `shutdown` flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "origin range refresher started"
        );

        let mut interval = time::interval(self.interval);
        // The first tick fires immediately; startup already fetched.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let fetched = fetch_hook_ranges(&self.client, &self.api_url).await;
                    self.apply(fetched);
                }
                _ = shutdown.changed() => {
                    info!("origin range refresher stopping");
                    break;
                }
            }
        }
    }

    /// Install a fetch result. Returns `true` if the shared set was replaced.
    pub fn apply(&self, fetched: Result<OriginRanges, OriginError>) -> bool {
        let attempt = self.stats.total_refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        match fetched {
            Ok(ranges) => {
                self.stats.consecutive_failures.store(0, Ordering::SeqCst);
                let merged = ranges.merged(&self.static_ranges);
                info!(attempt, count = merged.len(), "origin ranges refreshed");
                self.shared.replace(merged);
                true
            }
            Err(e) => {
                let failures = self.stats.total_failures.fetch_add(1, Ordering::SeqCst) + 1;
                let consecutive = self
                    .stats
                    .consecutive_failures
                    .fetch_add(1, Ordering::SeqCst)
                    + 1;
                warn!(
                    attempt,
                    error = %e,
                    total_failures = failures,
                    consecutive_failures = consecutive,
                    kept = self.shared.snapshot().len(),
                    "origin range refresh failed, keeping previous set"
                );
                false
            }
        }
    }
}
