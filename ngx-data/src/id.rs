use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Issues strictly increasing ids derived from wall-clock milliseconds.
///
/// Two ids issued within the same millisecond are still distinct: the later one is bumped
/// past the previous id.
#[derive(Debug, Default)]
pub struct IdClock {
    last: AtomicU64,
}

impl IdClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u64 {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();

        let previous = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);

        now.max(previous + 1)
    }
}
