//! Daily quota tracking for CodeNexta's AI coding assistant.
//!
//! The [`QuotaTracker`] owns a storage key, a daily limit, a
//! [`KeyValueStore`] and a [`Clock`]. Hosts call
//! [`QuotaTracker::is_allowed`] before dispatching a request to the model and
//! [`QuotaTracker::record_usage`] once it was sent, or
//! [`QuotaTracker::try_acquire`] to do both atomically.

pub mod config;
pub mod errors;
pub mod models;
pub mod services;
pub mod storage;

pub use config::{Config, QuotaSettings};
pub use errors::{QuotaError, Result};
pub use models::{QuotaDecision, QuotaRecord, QuotaStatus};
pub use services::{
    format_reset_countdown, format_time_until_reset, Clock, ManualClock, QuotaTracker, SystemClock,
};
pub use storage::{create_store, KeyValueStore};
