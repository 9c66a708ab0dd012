//! Per-provider quota accounting with lazily reset fixed windows.
//!
//! Counters live in process memory only. Several processes serving the same
//! API keys each keep their own count, so the effective ceiling is
//! `limit * processes`; sharing one budget needs an external atomic store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::provider_policy::UsagePolicy;
use crate::{ProviderId, UtcDateTime};

/// Counter state for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub used: u32,
    pub limit: u32,
    pub reset_time: UtcDateTime,
    pub last_updated: UtcDateTime,
}

impl UsageRecord {
    fn fresh(policy: UsagePolicy, now: UtcDateTime) -> Self {
        Self {
            used: 0,
            limit: policy.limit,
            reset_time: policy.window.next_reset(now),
            last_updated: now,
        }
    }

    /// The record as it looks at `now`, with an elapsed window rolled over.
    fn rolled(self, policy: UsagePolicy, now: UtcDateTime) -> Self {
        if now >= self.reset_time {
            Self::fresh(policy, now)
        } else {
            self
        }
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }
}

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub available: bool,
    pub remaining: u32,
    /// `None` for providers without a configured quota.
    pub reset_time: Option<UtcDateTime>,
}

/// Display-oriented usage summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub provider: ProviderId,
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    pub percentage: f64,
    pub reset_time: UtcDateTime,
}

/// Admission control for upstream calls.
#[derive(Debug)]
pub struct UsageTracker {
    policies: HashMap<ProviderId, UsagePolicy>,
    records: Mutex<HashMap<ProviderId, UsageRecord>>,
    clock: Arc<dyn Clock>,
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new(UsagePolicy::defaults(), Arc::new(SystemClock))
    }
}

impl UsageTracker {
    pub fn new(policies: HashMap<ProviderId, UsagePolicy>, clock: Arc<dyn Clock>) -> Self {
        Self {
            policies,
            records: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn with_defaults(clock: Arc<dyn Clock>) -> Self {
        Self::new(UsagePolicy::defaults(), clock)
    }

    pub fn policy(&self, provider: ProviderId) -> Option<UsagePolicy> {
        self.policies.get(&provider).copied()
    }

    /// Reports whether another call fits in the current window.
    pub fn check_availability(&self, provider: ProviderId) -> Availability {
        let Some(policy) = self.policy(provider) else {
            warn!(%provider, "no usage policy for provider; admitting call");
            return Availability {
                available: true,
                remaining: u32::MAX,
                reset_time: None,
            };
        };

        let now = self.clock.now();
        let mut records = self.lock_records();
        let record = current_record(&mut records, provider, policy, now);

        Availability {
            available: record.used < record.limit,
            remaining: record.remaining(),
            reset_time: Some(record.reset_time),
        }
    }

    /// Counts one call against the quota. Returns `false` when the quota is
    /// already exhausted; the counter is left untouched in that case.
    pub fn increment_usage(&self, provider: ProviderId) -> bool {
        let Some(policy) = self.policy(provider) else {
            warn!(%provider, "no usage policy for provider; not counting call");
            return true;
        };

        let now = self.clock.now();
        let mut records = self.lock_records();
        let record = current_record(&mut records, provider, policy, now);

        if record.used >= record.limit {
            debug!(%provider, used = record.used, limit = record.limit, "usage increment rejected");
            return false;
        }

        record.used += 1;
        record.last_updated = now;
        true
    }

    /// Per-provider summary. Elapsed windows are reported as reset but the
    /// stored counters are not modified.
    pub fn usage_stats(&self) -> Vec<UsageStats> {
        let mut stats: Vec<UsageStats> = self
            .all_usage_data()
            .into_iter()
            .map(|(provider, record)| UsageStats {
                provider,
                used: record.used,
                limit: record.limit,
                remaining: record.remaining(),
                percentage: if record.limit == 0 {
                    100.0
                } else {
                    f64::from(record.used) / f64::from(record.limit) * 100.0
                },
                reset_time: record.reset_time,
            })
            .collect();
        stats.sort_by_key(|entry| entry.provider);
        stats
    }

    /// Snapshot of every provider's record as a check at this instant would see it.
    pub fn all_usage_data(&self) -> BTreeMap<ProviderId, UsageRecord> {
        let now = self.clock.now();
        let records = self.lock_records();

        self.policies
            .iter()
            .map(|(&provider, &policy)| {
                let record = records
                    .get(&provider)
                    .map(|record| record.rolled(policy, now))
                    .unwrap_or_else(|| UsageRecord::fresh(policy, now));
                (provider, record)
            })
            .collect()
    }

    /// Drops every counter.
    pub fn reset(&self) {
        self.lock_records().clear();
    }

    fn lock_records(&self) -> std::sync::MutexGuard<'_, HashMap<ProviderId, UsageRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn current_record(
    records: &mut HashMap<ProviderId, UsageRecord>,
    provider: ProviderId,
    policy: UsagePolicy,
    now: UtcDateTime,
) -> &mut UsageRecord {
    let record = records
        .entry(provider)
        .or_insert_with(|| UsageRecord::fresh(policy, now));

    if now >= record.reset_time {
        debug!(%provider, previous_reset = %record.reset_time, "usage window elapsed; resetting");
        *record = UsageRecord::fresh(policy, now);
    }
    record
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::clock::ManualClock;
    use crate::provider_policy::UsageWindow;

    fn tracker(limit: u32, window: UsageWindow) -> (UsageTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            UtcDateTime::parse("2024-06-01T10:30:15Z").expect("timestamp"),
        ));
        let policies = HashMap::from([(ProviderId::CoinGecko, UsagePolicy { limit, window })]);
        (UsageTracker::new(policies, clock.clone()), clock)
    }

    #[test]
    fn increments_until_limit_then_rejects() {
        let (tracker, _) = tracker(2, UsageWindow::Minute);

        assert!(tracker.increment_usage(ProviderId::CoinGecko));
        assert!(tracker.increment_usage(ProviderId::CoinGecko));
        assert!(!tracker.increment_usage(ProviderId::CoinGecko));

        let record = tracker.all_usage_data()[&ProviderId::CoinGecko];
        assert_eq!(record.used, 2);
        assert!(!tracker.check_availability(ProviderId::CoinGecko).available);
    }

    #[test]
    fn lazily_resets_after_window() {
        let (tracker, clock) = tracker(1, UsageWindow::Minute);
        assert!(tracker.increment_usage(ProviderId::CoinGecko));
        let first_reset = tracker
            .check_availability(ProviderId::CoinGecko)
            .reset_time
            .expect("tracked provider");

        clock.advance(Duration::from_secs(45));
        let availability = tracker.check_availability(ProviderId::CoinGecko);

        assert!(availability.available);
        assert_eq!(availability.remaining, 1);
        assert!(availability.reset_time.expect("tracked provider") > first_reset);
    }

    #[test]
    fn stats_report_reset_without_mutating() {
        let (tracker, clock) = tracker(3, UsageWindow::Daily);
        assert!(tracker.increment_usage(ProviderId::CoinGecko));
        clock.advance(Duration::from_secs(24 * 3600));

        let stats = tracker.usage_stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].used, 0);
        assert_eq!(stats[0].remaining, 3);

        let stored = tracker.records.lock().expect("lock")[&ProviderId::CoinGecko];
        assert_eq!(stored.used, 1);
    }

    #[test]
    fn unknown_provider_fails_open() {
        let (tracker, _) = tracker(1, UsageWindow::Minute);

        let availability = tracker.check_availability(ProviderId::AlphaVantage);
        assert!(availability.available);
        assert_eq!(availability.reset_time, None);
        assert!(tracker.increment_usage(ProviderId::AlphaVantage));
        assert!(tracker.increment_usage(ProviderId::AlphaVantage));
    }

    #[test]
    fn reset_clears_counters() {
        let (tracker, _) = tracker(1, UsageWindow::Daily);
        assert!(tracker.increment_usage(ProviderId::CoinGecko));
        tracker.reset();
        assert!(tracker.check_availability(ProviderId::CoinGecko).available);
    }
}
