//! Poison-tolerant lock access.
//!
//! A panic while a cache lock is held must not take the cache down with it;
//! the guard is recovered and the event logged.

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) trait MutexRecover<T> {
    fn lock_recover(&self, op: &'static str) -> MutexGuard<'_, T>;
}

impl<T> MutexRecover<T> for Mutex<T> {
    fn lock_recover(&self, op: &'static str) -> MutexGuard<'_, T> {
        self.lock()
            .unwrap_or_else(|poisoned| recovered(poisoned, op, "mutex.lock"))
    }
}

pub(crate) trait RwLockRecover<T> {
    fn read_recover(&self, op: &'static str) -> RwLockReadGuard<'_, T>;
    fn write_recover(&self, op: &'static str) -> RwLockWriteGuard<'_, T>;
}

impl<T> RwLockRecover<T> for RwLock<T> {
    fn read_recover(&self, op: &'static str) -> RwLockReadGuard<'_, T> {
        self.read()
            .unwrap_or_else(|poisoned| recovered(poisoned, op, "rwlock.read"))
    }

    fn write_recover(&self, op: &'static str) -> RwLockWriteGuard<'_, T> {
        self.write()
            .unwrap_or_else(|poisoned| recovered(poisoned, op, "rwlock.write"))
    }
}

fn recovered<G>(poisoned: PoisonError<G>, op: &'static str, lock_kind: &'static str) -> G {
    warn!(
        op,
        lock_kind,
        result = "poisoned_recovered",
        hint = "state may be stale after panic in another thread",
        "Recovered from poisoned cache lock"
    );
    poisoned.into_inner()
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn mutex_recovers_after_panic() {
        let lock = Mutex::new(1);
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.lock().expect("lock acquired");
            panic!("poison");
        }));

        *lock.lock_recover("test") += 1;
        assert_eq!(*lock.lock_recover("test"), 2);
    }

    #[test]
    fn rwlock_recovers_after_panic() {
        let lock = RwLock::new(vec![1]);
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.write().expect("lock acquired");
            panic!("poison");
        }));

        lock.write_recover("test").push(2);
        assert_eq!(lock.read_recover("test").len(), 2);
    }
}
