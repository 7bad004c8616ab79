use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Failure bookkeeping for one catalogue URL
#[derive(Debug, Clone, Copy)]
pub struct FailureRecord {
    pub last_failure: Instant,
    pub attempts: u32,
}

/// Process-wide failure records keyed by URL. Created on first failure,
/// incremented on subsequent failures, deleted on first success.
#[derive(Debug, Default)]
pub struct RetryTracker {
    records: Mutex<HashMap<String, FailureRecord>>,
}

impl RetryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more failure for `url` and return the new attempt count
    pub fn record_failure(&self, url: &str) -> u32 {
        let mut records = self.lock();
        let record = records.entry(url.to_string()).or_insert(FailureRecord {
            last_failure: Instant::now(),
            attempts: 0,
        });
        record.last_failure = Instant::now();
        record.attempts += 1;
        record.attempts
    }

    /// Forget the record for `url` (called on fetch success)
    pub fn clear(&self, url: &str) {
        self.lock().remove(url);
    }

    pub fn record(&self, url: &str) -> Option<FailureRecord> {
        self.lock().get(url).copied()
    }

    /// Whether `url` has failed at least `threshold` times with the most
    /// recent failure younger than `cooldown`
    pub fn in_cooldown(&self, url: &str, threshold: u32, cooldown: Duration) -> bool {
        self.record(url)
            .is_some_and(|r| r.attempts >= threshold && r.last_failure.elapsed() < cooldown)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, FailureRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
