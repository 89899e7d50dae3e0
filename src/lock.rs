//! Lease based mutual exclusion between repair workers.
//!
//! A lease expires on its own, so a worker that hangs or dies cannot keep a
//! container locked forever, while a live lease still prevents a second
//! worker from picking the same container up.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};

use crate::clock::Clock;

pub const DEFAULT_LEASE_LIFETIME: TimeDelta = TimeDelta::hours(1);

#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    AlreadyLocked,
}

#[derive(Debug)]
pub struct LockManager {
    leases: Mutex<HashMap<String, DateTime<Utc>>>,
    lifetime: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl LockManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_lifetime(clock, DEFAULT_LEASE_LIFETIME)
    }

    pub fn with_lifetime(clock: Arc<dyn Clock>, lifetime: TimeDelta) -> Self {
        Self {
            leases: Mutex::new(HashMap::new()),
            lifetime,
            clock,
        }
    }

    pub fn acquire(&self, id: &str) -> LockOutcome {
        self.acquire_for(id, TimeDelta::zero())
    }

    /// Like [`LockManager::acquire`], with the lease extended by the time
    /// the holder may legitimately spend waiting.
    pub fn acquire_for(&self, id: &str, hold: TimeDelta) -> LockOutcome {
        let now = self.clock.now();
        let lifetime = self.lifetime.checked_add(&hold).unwrap_or(TimeDelta::MAX);
        let mut leases = self.leases.lock().expect("Poisoned mutex");

        if let Some(expiry) = leases.get(id) {
            if now < *expiry {
                return LockOutcome::AlreadyLocked;
            }
            log::warn!("Lease on \"{id}\" expired at {expiry}, reclaiming it");
        }

        let expiry = now
            .checked_add_signed(lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        leases.insert(id.to_string(), expiry);
        LockOutcome::Acquired
    }

    pub fn release(&self, id: &str) {
        self.leases.lock().expect("Poisoned mutex").remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_second_acquire_is_rejected() {
        let manager = LockManager::new(Arc::new(ManualClock::starting_now()));

        assert_eq!(manager.acquire("app_web_1"), LockOutcome::Acquired);
        assert_eq!(manager.acquire("app_web_1"), LockOutcome::AlreadyLocked);
        assert_eq!(manager.acquire("app_db_1"), LockOutcome::Acquired);
    }

    #[test]
    fn test_release_then_acquire() {
        let manager = LockManager::new(Arc::new(ManualClock::starting_now()));

        assert_eq!(manager.acquire("app_web_1"), LockOutcome::Acquired);
        manager.release("app_web_1");
        assert_eq!(manager.acquire("app_web_1"), LockOutcome::Acquired);
        manager.release("app_web_1");
    }

    #[test]
    fn test_release_of_unheld_lock_is_noop() {
        let manager = LockManager::new(Arc::new(ManualClock::starting_now()));
        manager.release("never_locked");
        manager.release("never_locked");
        assert_eq!(manager.acquire("never_locked"), LockOutcome::Acquired);
    }

    #[test]
    fn test_expired_lease_is_reclaimed() {
        let clock = Arc::new(ManualClock::starting_now());
        let manager = LockManager::new(clock.clone());

        assert_eq!(manager.acquire("app_web_1"), LockOutcome::Acquired);
        clock.advance_secs(3599);
        assert_eq!(manager.acquire("app_web_1"), LockOutcome::AlreadyLocked);
        clock.advance_secs(1);
        assert_eq!(manager.acquire("app_web_1"), LockOutcome::Acquired);
        // The reclaimed lease is fresh again
        assert_eq!(manager.acquire("app_web_1"), LockOutcome::AlreadyLocked);
    }

    #[test]
    fn test_hold_extends_the_lease() {
        let clock = Arc::new(ManualClock::starting_now());
        let manager = LockManager::new(clock.clone());

        assert_eq!(
            manager.acquire_for("app_web_1", TimeDelta::hours(2)),
            LockOutcome::Acquired
        );
        clock.advance_secs(3 * 3600 - 1);
        assert_eq!(manager.acquire("app_web_1"), LockOutcome::AlreadyLocked);
        clock.advance_secs(1);
        assert_eq!(manager.acquire("app_web_1"), LockOutcome::Acquired);
    }

    #[test]
    fn test_unbounded_hold_does_not_overflow() {
        let manager = LockManager::new(Arc::new(ManualClock::starting_now()));

        assert_eq!(
            manager.acquire_for("app_web_1", TimeDelta::MAX),
            LockOutcome::Acquired
        );
        assert_eq!(manager.acquire("app_web_1"), LockOutcome::AlreadyLocked);
    }

    #[test]
    fn test_custom_lifetime() {
        let clock = Arc::new(ManualClock::starting_now());
        let manager = LockManager::with_lifetime(clock.clone(), TimeDelta::seconds(5));

        assert_eq!(manager.acquire("app_web_1"), LockOutcome::Acquired);
        clock.advance_secs(5);
        assert_eq!(manager.acquire("app_web_1"), LockOutcome::Acquired);
    }
}
