use metrics::counter;

/// Counters emitted by the quota tracker. A no-op unless the host process
/// installs a `metrics` recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuotaMetrics;

impl QuotaMetrics {
    pub fn new() -> Self {
        Self
    }

    pub fn record_check(&self, allowed: bool) {
        let outcome = if allowed { "allowed" } else { "denied" };
        counter!("quota_checks_total", "outcome" => outcome).increment(1);
    }

    pub fn record_usage(&self) {
        counter!("quota_usage_recorded_total").increment(1);
    }

    pub fn record_window_reset(&self) {
        counter!("quota_window_resets_total").increment(1);
    }

    pub fn record_storage_error(&self, operation: &'static str) {
        counter!("quota_storage_errors_total", "operation" => operation).increment(1);
    }

    pub fn record_contention(&self) {
        counter!("quota_cas_conflicts_total").increment(1);
    }
}
