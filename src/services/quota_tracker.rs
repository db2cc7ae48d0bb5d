use chrono::{DateTime, Duration};
use tracing::{debug, info, warn};

use crate::{
    config::QuotaSettings,
    errors::{QuotaError, Result},
    models::{QuotaDecision, QuotaRecord, QuotaStatus},
    services::{
        clock::{next_local_midnight, Clock, SystemClock},
        metrics::QuotaMetrics,
    },
    storage::KeyValueStore,
};

/// Daily quota for metered AI requests, persisted in a key-value store.
///
/// Every operation first applies the reset-if-stale rule: a record whose
/// window ended before now is replaced by a zero-usage record ending at the
/// next local midnight. Writes are compare-and-swap against the raw stored
/// value, so handles sharing a store do not lose increments.
pub struct QuotaTracker<S, C = SystemClock> {
    store: S,
    clock: C,
    settings: QuotaSettings,
    metrics: QuotaMetrics,
}

impl<S: KeyValueStore> QuotaTracker<S, SystemClock> {
    pub fn with_system_clock(store: S, settings: QuotaSettings) -> Self {
        Self::new(store, SystemClock, settings)
    }
}

impl<S: KeyValueStore, C: Clock> QuotaTracker<S, C> {
    pub fn new(store: S, clock: C, settings: QuotaSettings) -> Self {
        Self {
            store,
            clock,
            settings,
            metrics: QuotaMetrics::new(),
        }
    }

    pub fn daily_limit(&self) -> u32 {
        self.settings.daily_limit
    }

    pub fn storage_key(&self) -> &str {
        &self.settings.storage_key
    }

    /// Whether another metered action may proceed right now.
    pub fn is_allowed(&self) -> bool {
        let allowed = self.current_record().count < self.settings.daily_limit;
        self.metrics.record_check(allowed);
        allowed
    }

    /// Counts one metered action and returns the new usage. The limit is not
    /// enforced here; check [`is_allowed`](Self::is_allowed) first or use
    /// [`try_acquire`](Self::try_acquire).
    pub fn record_usage(&self) -> Result<u32> {
        let count = self.transact(|record| {
            record.count = record.count.saturating_add(1);
            (true, record.count)
        })?;

        self.metrics.record_usage();
        debug!(count, limit = self.settings.daily_limit, "Recorded quota usage");
        Ok(count)
    }

    /// Checks the limit and consumes one unit in a single atomic step.
    pub fn try_acquire(&self) -> Result<QuotaDecision> {
        let limit = self.settings.daily_limit;
        let decision = self.transact(|record| {
            if record.count < limit {
                record.count += 1;
                (true, QuotaDecision::Allowed { remaining: limit - record.count })
            } else {
                (false, QuotaDecision::Denied { reset_at: record.reset_time })
            }
        })?;

        self.metrics.record_check(decision.is_allowed());
        if decision.is_allowed() {
            self.metrics.record_usage();
        }
        Ok(decision)
    }

    pub fn remaining_quota(&self) -> u32 {
        self.settings
            .daily_limit
            .saturating_sub(self.current_record().count)
    }

    /// Epoch milliseconds at which the current window ends.
    pub fn window_reset_at(&self) -> i64 {
        self.current_record().reset_time
    }

    pub fn current_usage(&self) -> u32 {
        self.current_record().count.min(self.settings.daily_limit)
    }

    pub fn status(&self) -> QuotaStatus {
        let record = self.current_record();
        let limit = self.settings.daily_limit;
        let used = record.count.min(limit);
        let remaining = limit - used;
        let percentage = (u64::from(used) * 100)
            .checked_div(u64::from(limit))
            .unwrap_or(100) as u32;

        QuotaStatus {
            used,
            limit,
            remaining,
            reset_at: record.reset_time,
            percentage,
            is_low: remaining <= self.settings.low_threshold,
            is_exhausted: remaining == 0,
        }
    }

    pub fn time_until_reset(&self) -> Duration {
        let reset_at = self.window_reset_at();
        let now = self.clock.now().timestamp_millis();
        Duration::milliseconds((reset_at - now).max(0))
    }

    /// Starts a fresh window regardless of the stored one.
    pub fn reset(&self) -> Result<QuotaRecord> {
        let record = QuotaRecord::fresh(next_local_midnight(&self.clock.now()));
        let value = serde_json::to_string(&record)?;

        self.store
            .set(&self.settings.storage_key, &value)
            .inspect_err(|_| self.metrics.record_storage_error("write"))?;

        self.metrics.record_window_reset();
        info!(reset_at = record.reset_time, "Quota window reset on request");
        Ok(record)
    }

    fn read_raw(&self) -> Option<String> {
        match self.store.get(&self.settings.storage_key) {
            Ok(raw) => raw,
            Err(e) => {
                self.metrics.record_storage_error("read");
                warn!(
                    key = %self.settings.storage_key,
                    kind = e.kind(),
                    "Quota store unavailable, assuming no usage: {}",
                    e
                );
                None
            }
        }
    }

    /// Applies reset-if-stale to a raw stored value. The flag is set when the
    /// stored record was stale and must be replaced.
    fn resolve(&self, raw: Option<&str>, now: &DateTime<C::Tz>) -> (QuotaRecord, bool) {
        let now_millis = now.timestamp_millis();

        match raw.and_then(QuotaRecord::parse) {
            Some(record) if !record.is_stale(now_millis) => (record, false),
            Some(record) => {
                debug!(expired_at = record.reset_time, "Quota window is stale");
                (QuotaRecord::fresh(next_local_midnight(now)), true)
            }
            None => {
                if raw.is_some() {
                    warn!(key = %self.settings.storage_key, "Ignoring unparsable quota record");
                }
                (QuotaRecord::fresh(next_local_midnight(now)), false)
            }
        }
    }

    /// Read-modify-write loop. `apply` reports whether it changed the record;
    /// unchanged fresh records are never written.
    fn transact<T>(&self, mut apply: impl FnMut(&mut QuotaRecord) -> (bool, T)) -> Result<T> {
        let attempts = self.settings.max_cas_retries.max(1);

        for attempt in 1..=attempts {
            let now = self.clock.now();
            let raw = self.read_raw();
            let (mut record, replaced) = self.resolve(raw.as_deref(), &now);

            let (changed, out) = apply(&mut record);
            if !changed && !replaced {
                return Ok(out);
            }

            let value = serde_json::to_string(&record)?;
            match self
                .store
                .compare_and_swap(&self.settings.storage_key, raw.as_deref(), &value)
            {
                Ok(true) => {
                    if replaced {
                        self.metrics.record_window_reset();
                        info!(reset_at = record.reset_time, "Started new quota window");
                    }
                    return Ok(out);
                }
                Ok(false) => {
                    self.metrics.record_contention();
                    debug!(attempt, "Quota record changed underneath us, retrying");
                }
                Err(e) => {
                    self.metrics.record_storage_error("write");
                    return Err(e);
                }
            }
        }

        Err(QuotaError::Contention { attempts })
    }

    fn current_record(&self) -> QuotaRecord {
        match self.transact(|record| (false, *record)) {
            Ok(record) => record,
            Err(e) => {
                warn!(kind = e.kind(), "Could not persist quota window reset: {}", e);
                let now = self.clock.now();
                self.resolve(self.read_raw().as_deref(), &now).0
            }
        }
    }
}

/// Countdown label for the quota indicator, e.g. `"3h 12m"` or `"45m"`.
pub fn format_time_until_reset(remaining: Duration) -> String {
    if remaining <= Duration::zero() {
        return "Resetting...".to_string();
    }

    let hours = remaining.num_hours();
    let minutes = remaining.num_minutes() % 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

/// Seconds-precision countdown shown once the limit is hit, e.g. `"3h 12m 5s"`.
pub fn format_reset_countdown(remaining: Duration) -> String {
    if remaining <= Duration::zero() {
        return "Ready to reset!".to_string();
    }

    format!(
        "{}h {}m {}s",
        remaining.num_hours(),
        remaining.num_minutes() % 60,
        remaining.num_seconds() % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use crate::storage::MockKeyValueStore;
    use chrono::{FixedOffset, TimeZone};

    fn clock() -> ManualClock {
        let offset = FixedOffset::east_opt(0).unwrap();
        ManualClock::new(offset.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap())
    }

    fn settings() -> QuotaSettings {
        QuotaSettings {
            max_cas_retries: 3,
            ..QuotaSettings::default()
        }
    }

    #[test]
    fn test_unreadable_store_reads_as_fresh() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_get()
            .returning(|_| Err(QuotaError::Storage("disk gone".to_string())));
        store.expect_compare_and_swap().never();

        let tracker = QuotaTracker::new(store, clock(), settings());

        assert!(tracker.is_allowed());
        assert_eq!(tracker.current_usage(), 0);
        assert_eq!(tracker.remaining_quota(), 20);
    }

    #[test]
    fn test_record_usage_gives_up_after_retries() {
        let mut store = MockKeyValueStore::new();
        store.expect_get().returning(|_| Ok(None));
        store
            .expect_compare_and_swap()
            .times(3)
            .returning(|_, _, _| Ok(false));

        let tracker = QuotaTracker::new(store, clock(), settings());

        match tracker.record_usage() {
            Err(QuotaError::Contention { attempts }) => assert_eq!(attempts, 3),
            other => panic!("expected contention, got {:?}", other),
        }
    }

    #[test]
    fn test_record_usage_surfaces_write_errors() {
        let mut store = MockKeyValueStore::new();
        store.expect_get().returning(|_| Ok(None));
        store
            .expect_compare_and_swap()
            .returning(|_, _, _| Err(QuotaError::Storage("read-only".to_string())));

        let tracker = QuotaTracker::new(store, clock(), settings());

        assert!(matches!(tracker.record_usage(), Err(QuotaError::Storage(_))));
    }

    #[test]
    fn test_failed_reset_still_reports_fresh_window() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_get()
            .returning(|_| Ok(Some(r#"{"count":20,"resetTime":1}"#.to_string())));
        store
            .expect_compare_and_swap()
            .returning(|_, _, _| Err(QuotaError::Storage("read-only".to_string())));

        let tracker = QuotaTracker::new(store, clock(), settings());

        assert!(tracker.is_allowed());
        assert_eq!(tracker.current_usage(), 0);
    }

    #[test]
    fn test_cas_expects_raw_stored_value() {
        let raw = r#"{"count":2,"resetTime":9999999999999}"#;
        let mut store = MockKeyValueStore::new();
        store.expect_get().returning(move |_| Ok(Some(raw.to_string())));
        store
            .expect_compare_and_swap()
            .withf(move |key, expected, value| {
                key == "gemini-api-rate-limit"
                    && *expected == Some(raw)
                    && value == r#"{"count":3,"resetTime":9999999999999}"#
            })
            .times(1)
            .returning(|_, _, _| Ok(true));

        let tracker = QuotaTracker::new(store, clock(), settings());

        assert_eq!(tracker.record_usage().unwrap(), 3);
    }

    #[test]
    fn test_format_time_until_reset() {
        assert_eq!(format_time_until_reset(Duration::zero()), "Resetting...");
        assert_eq!(format_time_until_reset(Duration::milliseconds(-5)), "Resetting...");
        assert_eq!(format_time_until_reset(Duration::seconds(59)), "0m");
        assert_eq!(format_time_until_reset(Duration::minutes(45)), "45m");
        assert_eq!(
            format_time_until_reset(Duration::hours(3) + Duration::minutes(12)),
            "3h 12m"
        );
        assert_eq!(format_time_until_reset(Duration::hours(24)), "24h 0m");
    }

    #[test]
    fn test_format_reset_countdown() {
        assert_eq!(format_reset_countdown(Duration::zero()), "Ready to reset!");
        assert_eq!(format_reset_countdown(Duration::seconds(-1)), "Ready to reset!");
        assert_eq!(format_reset_countdown(Duration::milliseconds(999)), "0h 0m 0s");
        assert_eq!(format_reset_countdown(Duration::seconds(42)), "0h 0m 42s");
        assert_eq!(
            format_reset_countdown(Duration::hours(3) + Duration::minutes(12) + Duration::seconds(5)),
            "3h 12m 5s"
        );
    }
}
