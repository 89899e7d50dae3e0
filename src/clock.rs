//! UTC time source shared by the journal, the lock manager and the heal task.
//!
//! Every windowed comparison in the daemon goes through a [`Clock`], so nothing
//! depends on the host timezone and tests can move time explicitly.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub use manual::ManualClock;

#[cfg(test)]
mod manual {
    use super::Clock;
    use chrono::{DateTime, TimeDelta, Utc};
    use std::sync::Mutex;

    /// Clock that only moves when told to.
    #[derive(Debug)]
    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn new(now: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(now),
            }
        }

        pub fn starting_now() -> Self {
            // Whole seconds, the journal stores second precision
            let now = DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap_or_default();
            Self::new(now)
        }

        pub fn advance_secs(&self, secs: i64) {
            let mut now = self.now.lock().expect("Poisoned mutex");
            *now += TimeDelta::seconds(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().expect("Poisoned mutex")
        }
    }
}
