pub mod clock;
pub mod metrics;
pub mod quota_tracker;

pub use clock::*;
pub use metrics::*;
pub use quota_tracker::*;
