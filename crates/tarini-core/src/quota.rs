//! Persisted daily session quota with lazy day rollover.
//!
//! The store keeps two plain-string keys: the calendar day the count applies
//! to and the count itself. A record whose date is not today is stale and is
//! replaced with a zero count the first time it is observed -- there is no
//! midnight scheduler.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::StorageError;
use crate::storage::StateStore;

/// Sessions per day before `start` is refused.
pub const DEFAULT_DAILY_GOAL: u32 = 5;

const DATE_KEY: &str = "quota_date";
const COUNT_KEY: &str = "quota_count";

/// How many sessions completed on `date`, capped at `goal`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyQuota {
    pub date: NaiveDate,
    pub completed: u32,
    pub goal: u32,
}

impl DailyQuota {
    pub fn is_exhausted(&self) -> bool {
        self.completed >= self.goal
    }

    pub fn remaining(&self) -> u32 {
        self.goal.saturating_sub(self.completed)
    }
}

/// Durable daily counter over the key-value persistence contract.
///
/// The store performs no deduplication; exactly-once increments per completed
/// session are the controller's responsibility.
pub struct QuotaStore {
    store: Box<dyn StateStore>,
    clock: Arc<dyn Clock>,
    goal: u32,
}

impl QuotaStore {
    pub fn new(store: Box<dyn StateStore>, clock: Arc<dyn Clock>, goal: u32) -> Self {
        Self { store, clock, goal }
    }

    pub fn goal(&self) -> u32 {
        self.goal
    }

    /// Read today's quota, resetting a stale record in place.
    ///
    /// # Errors
    /// Read or write failures surface as [`StorageError`]; the count is never
    /// fabricated on a failed read.
    pub fn load(&self) -> Result<DailyQuota, StorageError> {
        let today = self.clock.today();
        let date_str = today.to_string();
        if self.store.get(DATE_KEY)?.as_deref() != Some(date_str.as_str()) {
            self.store.set(DATE_KEY, &date_str)?;
            self.store.set(COUNT_KEY, "0")?;
            tracing::debug!(day = %today, "daily quota reset");
            return Ok(DailyQuota {
                date: today,
                completed: 0,
                goal: self.goal,
            });
        }
        let completed = self
            .store
            .get(COUNT_KEY)?
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0)
            .min(self.goal);
        Ok(DailyQuota {
            date: today,
            completed,
            goal: self.goal,
        })
    }

    /// Record one more completed session, saturating at the goal.
    ///
    /// Re-loads first, so a rollover that happened mid-session starts the new
    /// day's record before counting against it.
    pub fn increment(&self) -> Result<DailyQuota, StorageError> {
        let mut quota = self.load()?;
        quota.completed = (quota.completed + 1).min(self.goal);
        self.store.set(COUNT_KEY, &quota.completed.to_string())?;
        Ok(quota)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct MemStore {
        data: Arc<Mutex<HashMap<String, String>>>,
        fail_reads: Arc<AtomicBool>,
        fail_writes: Arc<AtomicBool>,
    }

    impl StateStore for MemStore {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StorageError::ReadFailed("injected".into()));
            }
            Ok(self.data.lock().unwrap().get(key).cloned())
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::WriteFailed("injected".into()));
            }
            self.data.lock().unwrap().insert(key.into(), value.into());
            Ok(())
        }
    }

    #[derive(Clone)]
    struct TestClock {
        today: Arc<Mutex<NaiveDate>>,
    }

    impl TestClock {
        fn on(day: NaiveDate) -> Self {
            Self {
                today: Arc::new(Mutex::new(day)),
            }
        }

        fn set_today(&self, day: NaiveDate) {
            *self.today.lock().unwrap() = day;
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }

        fn today(&self) -> NaiveDate {
            *self.today.lock().unwrap()
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn store_on(day: NaiveDate) -> (QuotaStore, MemStore, TestClock) {
        let mem = MemStore::default();
        let clock = TestClock::on(day);
        let quota = QuotaStore::new(
            Box::new(mem.clone()),
            Arc::new(clock.clone()),
            DEFAULT_DAILY_GOAL,
        );
        (quota, mem, clock)
    }

    #[test]
    fn first_load_persists_a_fresh_record() {
        let (quota, mem, _) = store_on(day(2025, 3, 1));
        let loaded = quota.load().unwrap();
        assert_eq!(loaded.completed, 0);
        assert_eq!(loaded.goal, 5);
        let data = mem.data.lock().unwrap();
        assert_eq!(data.get("quota_date").unwrap(), "2025-03-01");
        assert_eq!(data.get("quota_count").unwrap(), "0");
    }

    #[test]
    fn increment_counts_up_and_persists() {
        let (quota, mem, _) = store_on(day(2025, 3, 1));
        quota.increment().unwrap();
        let loaded = quota.increment().unwrap();
        assert_eq!(loaded.completed, 2);
        assert_eq!(mem.data.lock().unwrap().get("quota_count").unwrap(), "2");
    }

    #[test]
    fn day_rollover_resets_the_count() {
        let (quota, mem, clock) = store_on(day(2025, 3, 1));
        for _ in 0..5 {
            quota.increment().unwrap();
        }
        assert!(quota.load().unwrap().is_exhausted());

        clock.set_today(day(2025, 3, 2));
        let loaded = quota.load().unwrap();
        assert_eq!(loaded.completed, 0);
        assert_eq!(loaded.date, day(2025, 3, 2));
        let data = mem.data.lock().unwrap();
        assert_eq!(data.get("quota_date").unwrap(), "2025-03-02");
        assert_eq!(data.get("quota_count").unwrap(), "0");
    }

    #[test]
    fn read_failure_surfaces_instead_of_fabricating_a_count() {
        let (quota, mem, _) = store_on(day(2025, 3, 1));
        quota.load().unwrap();
        mem.fail_reads.store(true, Ordering::SeqCst);
        assert!(matches!(quota.load(), Err(StorageError::ReadFailed(_))));
    }

    #[test]
    fn write_failure_during_increment_surfaces() {
        let (quota, mem, _) = store_on(day(2025, 3, 1));
        quota.load().unwrap();
        mem.fail_writes.store(true, Ordering::SeqCst);
        assert!(matches!(
            quota.increment(),
            Err(StorageError::WriteFailed(_))
        ));
    }

    #[test]
    fn corrupt_count_reads_as_zero() {
        let (quota, mem, _) = store_on(day(2025, 3, 1));
        quota.load().unwrap();
        mem.set("quota_count", "not-a-number").unwrap();
        assert_eq!(quota.load().unwrap().completed, 0);
    }

    #[test]
    fn oversized_persisted_count_is_clamped_to_goal() {
        let (quota, mem, _) = store_on(day(2025, 3, 1));
        quota.load().unwrap();
        mem.set("quota_count", "99").unwrap();
        assert_eq!(quota.load().unwrap().completed, 5);
    }

    proptest! {
        #[test]
        fn completed_never_exceeds_goal(attempts in 0usize..20) {
            let (quota, _, _) = store_on(day(2025, 3, 1));
            for _ in 0..attempts {
                let after = quota.increment().unwrap();
                prop_assert!(after.completed <= after.goal);
            }
            prop_assert!(quota.load().unwrap().completed <= DEFAULT_DAILY_GOAL);
        }
    }
}
