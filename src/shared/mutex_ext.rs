//! Usage: Poison-tolerant locking for the small shared slots (flow state, active session).

use std::sync::{Mutex, MutexGuard};

pub(crate) trait MutexExt<T> {
    /// Lock the mutex; a poisoned lock is recovered and logged.
    fn lock_or_recover(&self) -> MutexGuard<'_, T>;

    /// Swap in `value` and hand back what the slot held.
    fn replace_or_recover(&self, value: T) -> T;
}

impl<T> MutexExt<T> for Mutex<T> {
    #[track_caller]
    fn lock_or_recover(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(|poisoned| {
            let caller = std::panic::Location::caller();
            tracing::error!(
                slot = std::any::type_name::<T>(),
                at = %caller,
                "lock poisoned by a panicking thread; continuing with last written value"
            );
            poisoned.into_inner()
        })
    }

    #[track_caller]
    fn replace_or_recover(&self, value: T) -> T {
        std::mem::replace(&mut *self.lock_or_recover(), value)
    }
}
