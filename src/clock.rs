use std::time::Duration;

use chrono::NaiveDate;

/// Source of wall-clock time for backoff sleeps and output file naming.
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration);
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }

    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

impl<K: Clock + ?Sized> Clock for &K {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }

    fn today(&self) -> NaiveDate {
        (**self).today()
    }
}
