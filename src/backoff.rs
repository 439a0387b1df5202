use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use tokio_retry2::strategy::ExponentialBackoff;

/// Per-object retry delays for failed reconciles: 500ms, 1s, 2s, ... up to `max`.
/// A success resets the object's sequence.
#[derive(Debug)]
pub struct RetryBackoff {
    max: Duration,
    failures: Mutex<HashMap<String, usize>>,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl RetryBackoff {
    pub fn new(max: Duration) -> Self {
        Self {
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn next_delay(&self, key: &str) -> Duration {
        let attempt = {
            let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
            let count = failures.entry(key.to_owned()).or_insert(0);
            *count += 1;
            *count - 1
        };

        ExponentialBackoff::from_millis(2)
            .factor(250)
            .max_delay_millis(u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX))
            .nth(attempt)
            .unwrap_or(self.max)
    }

    pub fn reset(&self, key: &str) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}
