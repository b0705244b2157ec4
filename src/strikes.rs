use crate::cache::ExpiringStore;
use crate::context::ExecutionContext;
use crate::events::{EventRecord, EventSink, EventType, Severity};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Independent strike namespaces. Counters of different types never interact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StrikeType {
    Stalled,
    DownloadingMetadata,
    ImportFailed,
    SlowSpeed,
    SlowTime,
}

impl fmt::Display for StrikeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stalled => "stalled",
            Self::DownloadingMetadata => "downloading metadata",
            Self::ImportFailed => "failed import",
            Self::SlowSpeed => "slow speed",
            Self::SlowTime => "slow time",
        };
        f.write_str(name)
    }
}

type StrikeKey = (String, StrikeType);

/// Time-bounded strike counters keyed by `(download id, strike type)`.
pub struct StrikeTracker {
    counters: ExpiringStore<StrikeKey, u32>,
    progress: ExpiringStore<StrikeKey, u64>,
    events: Arc<dyn EventSink>,
}

impl StrikeTracker {
    pub fn new(ttl: Duration, events: Arc<dyn EventSink>) -> Self {
        Self {
            counters: ExpiringStore::new(ttl),
            progress: ExpiringStore::new(ttl),
            events,
        }
    }

    fn key(hash: &str, strike_type: StrikeType) -> StrikeKey {
        (hash.to_lowercase(), strike_type)
    }

    /// Adds one strike and reports whether the item reached `max_strikes`.
    ///
    /// `max_strikes == 0` disables the check and records nothing.
    pub fn strike_and_check_limit(
        &self,
        ctx: &ExecutionContext<'_>,
        hash: &str,
        item_name: &str,
        max_strikes: u32,
        strike_type: StrikeType,
    ) -> bool {
        if max_strikes == 0 {
            return false;
        }

        let strikes = self
            .counters
            .update(Self::key(hash, strike_type), |prev| prev.map_or(1, |n| n + 1));

        tracing::info!(
            "Item on {} strike number {strikes}/{max_strikes}: {item_name}",
            strike_type
        );

        self.events.publish(
            EventRecord::new(
                EventType::StrikeIssued,
                Severity::Important,
                format!("{strike_type} strike {strikes}/{max_strikes} for {item_name}"),
                ctx.correlation_id,
            )
            .with_download_id(hash),
        );

        if strikes > max_strikes {
            tracing::warn!(
                "Blocked item keeps coming back: {item_name} has {strikes} {strike_type} strikes \
                 (limit {max_strikes}). Enable blocklist rejection at the indexer so the \
                 release is not grabbed again."
            );
        }

        strikes >= max_strikes
    }

    pub fn strikes(&self, hash: &str, strike_type: StrikeType) -> u32 {
        self.counters
            .get(&Self::key(hash, strike_type))
            .unwrap_or(0)
    }

    pub fn reset_strikes(&self, hash: &str, strike_type: StrikeType) {
        if self.counters.remove(&Self::key(hash, strike_type)).is_some() {
            tracing::debug!("Reset {strike_type} strikes for {hash}");
        }
    }

    /// Records the downloaded byte count and resets the strike counter when it
    /// grew since the previous observation. Returns `true` on progress.
    pub fn observe_progress(&self, hash: &str, strike_type: StrikeType, downloaded: u64) -> bool {
        let key = Self::key(hash, strike_type);
        let previous = self.progress.get(&key);
        self.progress.insert(key, downloaded);

        match previous {
            Some(previous) if downloaded > previous => {
                tracing::info!(
                    "Progress detected for {hash} ({previous} -> {downloaded} bytes), resetting {strike_type} strikes"
                );
                self.reset_strikes(hash, strike_type);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InstanceType;
    use crate::config::SweepConfig;
    use crate::events::MemoryEventSink;
    use uuid::Uuid;

    fn tracker() -> (StrikeTracker, Arc<MemoryEventSink>) {
        let sink = Arc::new(MemoryEventSink::new());
        (
            StrikeTracker::new(Duration::from_secs(7200), sink.clone()),
            sink,
        )
    }

    #[test]
    fn test_zero_max_strikes_disables_check() {
        let (tracker, sink) = tracker();
        let config = SweepConfig::default();
        let ctx = ExecutionContext::new(InstanceType::Sonarr, &config, Uuid::nil());

        for _ in 0..5 {
            assert!(!tracker.strike_and_check_limit(&ctx, "h", "item", 0, StrikeType::Stalled));
        }
        assert_eq!(tracker.strikes("h", StrikeType::Stalled), 0);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_limit_reached_on_nth_call() {
        let (tracker, sink) = tracker();
        let config = SweepConfig::default();
        let ctx = ExecutionContext::new(InstanceType::Sonarr, &config, Uuid::nil());

        assert!(!tracker.strike_and_check_limit(&ctx, "h", "item", 3, StrikeType::Stalled));
        assert!(!tracker.strike_and_check_limit(&ctx, "h", "item", 3, StrikeType::Stalled));
        assert!(tracker.strike_and_check_limit(&ctx, "h", "item", 3, StrikeType::Stalled));
        // Still over the limit when removal upstream did not happen
        assert!(tracker.strike_and_check_limit(&ctx, "h", "item", 3, StrikeType::Stalled));
        assert_eq!(tracker.strikes("h", StrikeType::Stalled), 4);
        assert_eq!(sink.count(EventType::StrikeIssued), 4);
    }

    #[test]
    fn test_strike_types_are_independent() {
        let (tracker, _) = tracker();
        let config = SweepConfig::default();
        let ctx = ExecutionContext::new(InstanceType::Radarr, &config, Uuid::nil());

        tracker.strike_and_check_limit(&ctx, "h", "item", 5, StrikeType::SlowSpeed);
        tracker.strike_and_check_limit(&ctx, "h", "item", 5, StrikeType::SlowSpeed);
        tracker.strike_and_check_limit(&ctx, "h", "item", 5, StrikeType::SlowTime);

        assert_eq!(tracker.strikes("h", StrikeType::SlowSpeed), 2);
        assert_eq!(tracker.strikes("h", StrikeType::SlowTime), 1);
        assert_eq!(tracker.strikes("h", StrikeType::Stalled), 0);
    }

    #[test]
    fn test_hash_is_case_insensitive() {
        let (tracker, _) = tracker();
        let config = SweepConfig::default();
        let ctx = ExecutionContext::new(InstanceType::Sonarr, &config, Uuid::nil());

        tracker.strike_and_check_limit(&ctx, "ABCDEF", "item", 5, StrikeType::Stalled);
        assert_eq!(tracker.strikes("abcdef", StrikeType::Stalled), 1);
    }

    #[test]
    fn test_progress_resets_counter() {
        let (tracker, _) = tracker();
        let config = SweepConfig::default();
        let ctx = ExecutionContext::new(InstanceType::Sonarr, &config, Uuid::nil());

        assert!(!tracker.observe_progress("h", StrikeType::Stalled, 100));
        tracker.strike_and_check_limit(&ctx, "h", "item", 2, StrikeType::Stalled);
        assert_eq!(tracker.strikes("h", StrikeType::Stalled), 1);

        // Same byte count: no progress, strikes kept
        assert!(!tracker.observe_progress("h", StrikeType::Stalled, 100));
        assert_eq!(tracker.strikes("h", StrikeType::Stalled), 1);

        assert!(tracker.observe_progress("h", StrikeType::Stalled, 150));
        assert_eq!(tracker.strikes("h", StrikeType::Stalled), 0);
        assert!(!tracker.strike_and_check_limit(&ctx, "h", "item", 2, StrikeType::Stalled));
    }

    #[test]
    fn test_strikes_expire() {
        let sink = Arc::new(MemoryEventSink::new());
        let tracker = StrikeTracker::new(Duration::from_millis(30), sink);
        let config = SweepConfig::default();
        let ctx = ExecutionContext::new(InstanceType::Sonarr, &config, Uuid::nil());

        tracker.strike_and_check_limit(&ctx, "h", "item", 2, StrikeType::Stalled);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(tracker.strikes("h", StrikeType::Stalled), 0);
    }
}
