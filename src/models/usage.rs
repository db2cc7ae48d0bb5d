use serde::{Deserialize, Serialize};

/// Persisted quota window for a single client.
///
/// Stored as `{"count": 3, "resetTime": 1700000000000}` under the tracker's
/// storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub count: u32,
    /// Epoch milliseconds at which the window ends.
    #[serde(rename = "resetTime")]
    pub reset_time: i64,
}

impl QuotaRecord {
    pub fn fresh(reset_time: i64) -> Self {
        Self {
            count: 0,
            reset_time,
        }
    }

    pub fn is_stale(&self, now_millis: i64) -> bool {
        now_millis > self.reset_time
    }

    /// Parses a raw stored value. Anything that is not a well-formed record
    /// yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

/// Outcome of a combined check-and-consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum QuotaDecision {
    Allowed { remaining: u32 },
    Denied { reset_at: i64 },
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    /// Epoch milliseconds.
    pub reset_at: i64,
    pub percentage: u32,
    pub is_low: bool,
    pub is_exhausted: bool,
}
