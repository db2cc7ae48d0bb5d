use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, FixedOffset, Local, LocalResult, NaiveTime, TimeZone};

/// Wall-clock time source. The time zone decides where "midnight" falls.
pub trait Clock: Send + Sync {
    type Tz: TimeZone;

    fn now(&self) -> DateTime<Self::Tz>;
}

impl<C: Clock> Clock for Arc<C> {
    type Tz = C::Tz;

    fn now(&self) -> DateTime<Self::Tz> {
        (**self).now()
    }
}

/// The machine's local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Tz = Local;

    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl ManualClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    type Tz = FixedOffset;

    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Epoch milliseconds of 00:00 on the calendar day after `now`, in `now`'s
/// time zone.
///
/// When a DST transition skips local midnight the first representable
/// instant after it is used; when midnight occurs twice the earlier one wins.
pub fn next_local_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> i64 {
    let tz = now.timezone();

    let Some(tomorrow) = now.date_naive().succ_opt() else {
        return now.timestamp_millis() + Duration::days(1).num_milliseconds();
    };
    let midnight = tomorrow.and_time(NaiveTime::MIN);

    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(dt) => dt.timestamp_millis(),
        LocalResult::Ambiguous(earliest, _) => earliest.timestamp_millis(),
        LocalResult::None => (1..=8)
            .find_map(|step| {
                tz.from_local_datetime(&(midnight + Duration::minutes(15 * step)))
                    .earliest()
            })
            .map(|dt| dt.timestamp_millis())
            .unwrap_or_else(|| now.timestamp_millis() + Duration::days(1).num_milliseconds()),
    }
}
