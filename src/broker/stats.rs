use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Service times of retired publish requests, in milliseconds, measured from
/// acceptance to the moment every delivery resolved.
#[derive(Debug, Default)]
pub struct ServiceTimes {
    times: Mutex<Vec<f64>>,
}

impl ServiceTimes {
    pub fn record(&self, elapsed: Duration) {
        self.times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(elapsed.as_secs_f64() * 1000.0);
    }

    /// Returns everything recorded so far and clears the list in one step.
    pub fn take(&self) -> Vec<f64> {
        std::mem::take(&mut *self.times.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
