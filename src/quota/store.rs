use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use crate::quota::DayClock;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct QuotaKey {
    user_id: String,
    day: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
}

impl QuotaStatus {
    fn new(used: u32, limit: u32) -> Self {
        Self {
            used,
            limit,
            remaining: limit.saturating_sub(used),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("Daily quota exceeded")]
pub struct QuotaExceeded {
    pub used: u32,
    pub limit: u32,
}

/// Per-user, per-day generation counters.
///
/// Records are keyed by `(user, day)` and created lazily; a new day simply
/// starts a new record while the old ones are left in place. Every mutation
/// happens under the map's per-shard write lock, so concurrent requests from
/// one user never lose an increment.
///
/// State lives for the process lifetime only.
pub struct QuotaStore {
    records: DashMap<QuotaKey, u32>,
    clock: Arc<dyn DayClock>,
}

impl QuotaStore {
    pub fn new(clock: Arc<dyn DayClock>) -> Self {
        Self {
            records: DashMap::new(),
            clock,
        }
    }

    fn today_key(&self, user_id: &str) -> QuotaKey {
        QuotaKey {
            user_id: user_id.to_string(),
            day: self.clock.today(),
        }
    }

    /// Checks whether one more generation is allowed today. Nothing is
    /// consumed here; the counter only moves in [`QuotaStore::commit`].
    pub fn check_and_reserve(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<QuotaStatus, QuotaExceeded> {
        let key = self.today_key(user_id);
        let used = *self.records.entry(key).or_insert(0);
        if used >= limit {
            return Err(QuotaExceeded { used, limit });
        }
        Ok(QuotaStatus::new(used, limit))
    }

    /// Records one successful generation for today.
    pub fn commit(&self, user_id: &str, limit: u32) -> QuotaStatus {
        let key = self.today_key(user_id);
        let mut entry = self.records.entry(key).or_insert(0);
        *entry = entry.saturating_add(1);
        QuotaStatus::new(*entry, limit)
    }

    pub fn peek(&self, user_id: &str, limit: u32) -> QuotaStatus {
        let key = self.today_key(user_id);
        let used = self.records.get(&key).map(|count| *count).unwrap_or(0);
        QuotaStatus::new(used, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ManualClock(Mutex<String>);

    impl ManualClock {
        fn new(day: &str) -> Arc<Self> {
            Arc::new(Self(Mutex::new(day.to_string())))
        }

        fn set(&self, day: &str) {
            *self.0.lock().unwrap() = day.to_string();
        }
    }

    impl DayClock for ManualClock {
        fn today(&self) -> String {
            self.0.lock().unwrap().clone()
        }
    }

    #[test]
    fn reserve_does_not_consume() {
        let store = QuotaStore::new(ManualClock::new("2024-05-01"));
        for _ in 0..10 {
            let status = store.check_and_reserve("alice", 5).unwrap();
            assert_eq!(status.used, 0);
        }
        assert_eq!(store.peek("alice", 5), QuotaStatus { used: 0, limit: 5, remaining: 5 });
    }

    #[test]
    fn limit_reached_after_exactly_limit_commits() {
        for limit in 1..=7 {
            let store = QuotaStore::new(ManualClock::new("2024-05-01"));
            for _ in 0..limit {
                assert!(store.check_and_reserve("bob", limit).is_ok());
                store.commit("bob", limit);
            }
            let err = store.check_and_reserve("bob", limit).unwrap_err();
            assert_eq!(err, QuotaExceeded { used: limit, limit });
        }
    }

    #[test]
    fn exhausted_check_leaves_counter_unchanged() {
        let store = QuotaStore::new(ManualClock::new("2024-05-01"));
        for _ in 0..5 {
            store.commit("carol", 5);
        }
        assert!(store.check_and_reserve("carol", 5).is_err());
        assert!(store.check_and_reserve("carol", 5).is_err());
        assert_eq!(store.peek("carol", 5).used, 5);
    }

    #[test]
    fn new_day_starts_from_zero() {
        let clock = ManualClock::new("2024-05-01");
        let store = QuotaStore::new(clock.clone());
        for _ in 0..5 {
            store.commit("dave", 5);
        }
        assert!(store.check_and_reserve("dave", 5).is_err());

        clock.set("2024-05-02");
        assert_eq!(store.peek("dave", 5).used, 0);
        assert_eq!(store.check_and_reserve("dave", 5).unwrap().used, 0);
        assert_eq!(store.commit("dave", 5).used, 1);
    }

    #[test]
    fn users_are_counted_independently() {
        let store = QuotaStore::new(ManualClock::new("2024-05-01"));
        store.commit("erin", 5);
        store.commit("erin", 5);
        assert_eq!(store.peek("erin", 5).used, 2);
        assert_eq!(store.peek("frank", 5).used, 0);
    }

    #[test]
    fn raising_the_limit_reopens_the_quota() {
        let store = QuotaStore::new(ManualClock::new("2024-05-01"));
        for _ in 0..5 {
            store.commit("gina", 5);
        }
        assert!(store.check_and_reserve("gina", 5).is_err());
        let status = store.check_and_reserve("gina", 10).unwrap();
        assert_eq!(status, QuotaStatus { used: 5, limit: 10, remaining: 5 });
    }

    #[test]
    fn remaining_never_underflows() {
        let store = QuotaStore::new(ManualClock::new("2024-05-01"));
        for _ in 0..4 {
            store.commit("hank", 2);
        }
        assert_eq!(store.peek("hank", 2), QuotaStatus { used: 4, limit: 2, remaining: 0 });
    }

    #[test]
    fn concurrent_commits_are_not_lost() {
        let store = Arc::new(QuotaStore::new(ManualClock::new("2024-05-01")));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        store.commit("ivy", 5);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.peek("ivy", 5).used, 2000);
    }
}
