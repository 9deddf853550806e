// Alert Deduplication - decides whether a detected signal may alert
// Stale checks come first, then bucket dedup, then per-token cooldowns

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::types::SignalEvent;
use crate::state::store::SharedStore;

/// Identity of one alert for dedup purposes. Two signals with the same key
/// are the same alert.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub symbol: String,
    pub token: String,
    pub timeframe: String,
    pub bucket: i64,
}

impl DedupKey {
    pub fn from_event(event: &SignalEvent) -> Self {
        Self {
            symbol: event.symbol.clone(),
            token: event.key_token(),
            timeframe: event.timeframe.to_string(),
            bucket: event.timeframe.bucket(event.signal_time),
        }
    }

    pub fn storage_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.symbol, self.token, self.timeframe, self.bucket
        )
    }

    /// Prefix shared by every bucket of the same symbol and token, used for
    /// cooldown scans.
    pub fn cooldown_prefix(&self) -> String {
        format!("{}|{}|", self.symbol, self.token)
    }
}

/// What gets persisted per accepted alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupRecord {
    /// Wall-clock time the alert was accepted.
    pub alerted_at: i64,
    /// Open time of the candle that produced the signal.
    pub signal_time: i64,
    /// How old the signal was when accepted.
    pub age_secs: i64,
}

/// Outcome of an accept check.
#[derive(Debug, Clone, PartialEq)]
pub enum AcceptDecision {
    Accepted,
    /// Signal candle is older than the freshness window.
    Stale { age_secs: i64, window_secs: i64 },
    /// Same key already alerted.
    Duplicate,
    /// A recent alert for the same symbol and token is still cooling down.
    CoolingDown { remaining_secs: i64 },
}

impl AcceptDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AcceptDecision::Accepted)
    }
}

/// Dedup gate in front of one signal family. Wraps a StateStore and applies
/// freshness, per-bucket dedup, and an optional cooldown across buckets.
///
/// Persistence failures never block an alert: an unreadable store accepts
/// everything, and a failed write still lets the current signal through once.
pub struct DedupStore {
    name: String,
    store: SharedStore,
    freshness_window_ms: i64,
    retention_ms: i64,
    cooldown_ms: Option<i64>,

    accepted: u64,
    duplicates: u64,
    stale: u64,
    cooling: u64,
    write_failures: u64,
}

impl DedupStore {
    pub fn new(
        name: impl Into<String>,
        store: SharedStore,
        freshness_window_ms: i64,
        retention_ms: i64,
        cooldown_ms: Option<i64>,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            freshness_window_ms,
            retention_ms,
            cooldown_ms,
            accepted: 0,
            duplicates: 0,
            stale: 0,
            cooling: 0,
            write_failures: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decide whether `event` may alert at time `now_ms`, recording it when
    /// accepted. Check order: freshness, then same-bucket presence, then
    /// cooldown. Only an accepted event writes.
    pub fn accept(&mut self, event: &SignalEvent, now_ms: i64) -> AcceptDecision {
        let key = DedupKey::from_event(event);
        let storage_key = key.storage_key();

        let age_ms = (now_ms - event.signal_time).max(0);
        if age_ms > self.freshness_window_ms {
            self.stale += 1;
            debug!(
                "dedup '{}': stale signal {} (age {}s > window {}s)",
                self.name,
                storage_key,
                age_ms / 1000,
                self.freshness_window_ms / 1000
            );
            return AcceptDecision::Stale {
                age_secs: age_ms / 1000,
                window_secs: self.freshness_window_ms / 1000,
            };
        }

        if self.store.get(&storage_key).is_some() {
            self.duplicates += 1;
            debug!("dedup '{}': duplicate {}", self.name, storage_key);
            return AcceptDecision::Duplicate;
        }

        if let Some(cooldown_ms) = self.cooldown_ms {
            if let Some(last) = self.last_alert_for(&key.cooldown_prefix()) {
                let since_ms = now_ms - last;
                if since_ms < cooldown_ms {
                    self.cooling += 1;
                    debug!(
                        "dedup '{}': cooling down {} ({}s remaining)",
                        self.name,
                        storage_key,
                        (cooldown_ms - since_ms) / 1000
                    );
                    return AcceptDecision::CoolingDown {
                        remaining_secs: (cooldown_ms - since_ms) / 1000,
                    };
                }
            }
        }

        let record = DedupRecord {
            alerted_at: now_ms,
            signal_time: event.signal_time,
            age_secs: age_ms / 1000,
        };
        match serde_json::to_value(&record) {
            Ok(value) => match self.store.put_if_absent(&storage_key, value) {
                Ok(true) => {}
                Ok(false) => {
                    self.duplicates += 1;
                    return AcceptDecision::Duplicate;
                }
                Err(e) => {
                    self.write_failures += 1;
                    warn!(
                        "dedup '{}': write failed for {} ({}), forwarding unrecorded",
                        self.name, storage_key, e
                    );
                }
            },
            Err(e) => {
                self.write_failures += 1;
                warn!(
                    "dedup '{}': record serialization failed ({}), forwarding unrecorded",
                    self.name, e
                );
            }
        }

        self.accepted += 1;
        AcceptDecision::Accepted
    }

    /// Most recent alerted_at among stored records whose key starts with
    /// `prefix`. Unparseable records are ignored.
    fn last_alert_for(&self, prefix: &str) -> Option<i64> {
        self.store
            .keys_with_prefix(prefix)
            .into_iter()
            .filter_map(|k| self.store.get(&k))
            .filter_map(|v| serde_json::from_value::<DedupRecord>(v).ok())
            .map(|r| r.alerted_at)
            .max()
    }

    /// Drop records older than the retention window. Records that no longer
    /// parse are dropped too.
    pub fn cleanup(&mut self, now_ms: i64) -> usize {
        let mut removed = 0;
        for key in self.store.keys_with_prefix("") {
            let value = match self.store.get(&key) {
                Some(v) => v,
                None => continue,
            };
            let expired = match serde_json::from_value::<DedupRecord>(value) {
                Ok(record) => now_ms - record.alerted_at > self.retention_ms,
                Err(_) => true,
            };
            if expired {
                match self.store.remove(&key) {
                    Ok(true) => removed += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!("dedup '{}': cleanup remove failed for {} ({})", self.name, key, e);
                    }
                }
            }
        }
        if removed > 0 {
            info!("dedup '{}': cleaned up {} expired records", self.name, removed);
        }
        removed
    }

    pub fn get_stats(&self) -> DedupStoreStats {
        DedupStoreStats {
            name: self.name.clone(),
            stored: self.store.len(),
            accepted: self.accepted,
            duplicates: self.duplicates,
            stale: self.stale,
            cooling: self.cooling,
            write_failures: self.write_failures,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DedupStoreStats {
    pub name: String,
    pub stored: usize,
    pub accepted: u64,
    pub duplicates: u64,
    pub stale: u64,
    pub cooling: u64,
    pub write_failures: u64,
}

impl fmt::Display for DedupStoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(stored={}, accepted={}, dup={}, stale={}, cooling={}, write_fail={})",
            self.name,
            self.stored,
            self.accepted,
            self.duplicates,
            self.stale,
            self.cooling,
            self.write_failures
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::StoreError;
    use crate::core::types::{SignalDetails, Timeframe};
    use crate::state::store::{MemoryStore, StateStore};
    use serde_json::Value;
    use std::sync::Arc;

    const HOUR: i64 = 3_600_000;

    fn squeeze_event(signal_time: i64) -> SignalEvent {
        SignalEvent::new(
            "BTCUSDT",
            Timeframe::H1,
            signal_time,
            SignalDetails::Squeeze {
                width: 1.2,
                contraction_floor: 1.18,
            },
        )
    }

    fn make_store(cooldown_ms: Option<i64>) -> DedupStore {
        DedupStore::new(
            "squeeze_1h",
            Arc::new(MemoryStore::new("squeeze_1h")),
            3 * HOUR,
            48 * HOUR,
            cooldown_ms,
        )
    }

    #[test]
    fn test_accept_then_duplicate() {
        let mut dedup = make_store(None);
        let event = squeeze_event(10 * HOUR);
        let now = 10 * HOUR + 5_000;

        assert_eq!(dedup.accept(&event, now), AcceptDecision::Accepted);
        assert_eq!(dedup.accept(&event, now + 60_000), AcceptDecision::Duplicate);

        let stats = dedup.get_stats();
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.stored, 1);
    }

    #[test]
    fn test_stale_signal_rejected_without_write() {
        let mut dedup = make_store(None);
        let event = squeeze_event(0);
        // 4 hours later with a 3 hour window
        let decision = dedup.accept(&event, 4 * HOUR);

        match decision {
            AcceptDecision::Stale { age_secs, window_secs } => {
                assert_eq!(age_secs, 4 * 3600);
                assert_eq!(window_secs, 3 * 3600);
            }
            other => panic!("expected stale, got {:?}", other),
        }
        assert_eq!(dedup.get_stats().stored, 0);
    }

    #[test]
    fn test_distinct_buckets_both_accepted() {
        let mut dedup = make_store(None);
        let first = squeeze_event(10 * HOUR);
        let second = squeeze_event(11 * HOUR);

        assert_eq!(dedup.accept(&first, 10 * HOUR + 1_000), AcceptDecision::Accepted);
        assert_eq!(dedup.accept(&second, 11 * HOUR + 1_000), AcceptDecision::Accepted);
        assert_eq!(dedup.get_stats().stored, 2);
    }

    #[test]
    fn test_cooldown_spans_buckets() {
        // 12h cooldown, generous freshness so only the cooldown rejects
        let mut dedup = DedupStore::new(
            "sma_proximity_1d",
            Arc::new(MemoryStore::new("sma_proximity_1d")),
            100 * HOUR,
            200 * HOUR,
            Some(12 * HOUR),
        );

        let first = squeeze_event(10 * HOUR);
        assert!(dedup.accept(&first, 10 * HOUR).is_accepted());

        // New bucket two hours later, inside the cooldown
        let second = squeeze_event(12 * HOUR);
        match dedup.accept(&second, 12 * HOUR) {
            AcceptDecision::CoolingDown { remaining_secs } => {
                assert_eq!(remaining_secs, 10 * 3600);
            }
            other => panic!("expected cooldown, got {:?}", other),
        }

        // Past the cooldown the same token alerts again
        let third = squeeze_event(23 * HOUR);
        assert!(dedup.accept(&third, 23 * HOUR).is_accepted());
    }

    #[test]
    fn test_cleanup_allows_realert() {
        let mut dedup = DedupStore::new(
            "squeeze_1h",
            Arc::new(MemoryStore::new("squeeze_1h")),
            3 * HOUR,
            2 * HOUR,
            None,
        );
        let event = squeeze_event(10 * HOUR);
        assert!(dedup.accept(&event, 10 * HOUR).is_accepted());

        assert_eq!(dedup.cleanup(13 * HOUR), 1);
        assert_eq!(dedup.get_stats().stored, 0);

        // Same key again: fresh relative to a later candle close is a new
        // alert once the record is gone
        let later = squeeze_event(12 * HOUR);
        assert!(dedup.accept(&later, 13 * HOUR).is_accepted());
    }

    fn io_err() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::Other, "disk full")
    }

    // Store whose writes always fail, to prove the gate fails open.
    struct BrokenStore;

    impl StateStore for BrokenStore {
        fn name(&self) -> &str {
            "broken"
        }
        fn get(&self, _key: &str) -> Option<Value> {
            None
        }
        fn put(&self, _key: &str, _value: Value) -> Result<(), StoreError> {
            Err(StoreError::Io(io_err()))
        }
        fn put_if_absent(&self, _key: &str, _value: Value) -> Result<bool, StoreError> {
            Err(StoreError::Io(io_err()))
        }
        fn remove(&self, _key: &str) -> Result<bool, StoreError> {
            Err(StoreError::Io(io_err()))
        }
        fn keys_with_prefix(&self, _prefix: &str) -> Vec<String> {
            Vec::new()
        }
        fn len(&self) -> usize {
            0
        }
        fn flush(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_still_forwards() {
        let mut dedup = DedupStore::new("broken", Arc::new(BrokenStore), 3 * HOUR, 48 * HOUR, None);
        let event = squeeze_event(10 * HOUR);

        assert!(dedup.accept(&event, 10 * HOUR).is_accepted());
        assert_eq!(dedup.get_stats().write_failures, 1);
    }
}
