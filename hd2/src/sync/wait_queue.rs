use core::sync::atomic::{AtomicU64, Ordering};

use super::spin_lock::SpinLockGuard;

/// A condition variable for the two blocking points this crate defines: the
/// back-pressure wait in submission and the fence wait in user read/write.
///
/// Every [`Self::notify_all`] bumps an epoch counter; a waiter that observed
/// epoch `e` before releasing its lock is guaranteed to wake once the epoch
/// no longer reads `e`, closing the missed-wakeup race between "check
/// condition" and "go to sleep".
///
/// Under `cfg(test)` this parks on a real `std::sync::Condvar` so tests can
/// exercise actual blocking/wakeup timing. In the `no_std` build there is no
/// portable park/unpark primitive available to this crate (scheduling is an
/// external collaborator, see the crate root docs), so waiters spin on the
/// epoch instead; an embedding kernel that wants true blocking replaces this
/// module with one hooked into its own scheduler.
pub struct WaitQueue {
    epoch: AtomicU64,
    #[cfg(test)]
    gate: std::sync::Mutex<()>,
    #[cfg(test)]
    condvar: std::sync::Condvar,
}

impl WaitQueue {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            epoch: AtomicU64::new(0),
            #[cfg(test)]
            gate: std::sync::Mutex::new(()),
            #[cfg(test)]
            condvar: std::sync::Condvar::new(),
        }
    }

    /// Releases `guard`'s lock, blocks until some [`Self::notify_all`] call
    /// overlaps or follows this one, then re-acquires the lock and returns
    /// the new guard.
    pub fn wait<'a, T>(&self, guard: SpinLockGuard<'a, T>) -> SpinLockGuard<'a, T> {
        let seen = self.epoch.load(Ordering::Relaxed);
        let lock = guard.into_lock();
        self.park_until_epoch_advances(seen);
        lock.lock()
    }

    pub fn notify_all(&self) {
        self.epoch.fetch_add(1, Ordering::Relaxed);
        self.unpark_all();
    }

    #[cfg(test)]
    fn park_until_epoch_advances(&self, seen: u64) {
        let guard = self.gate.lock().unwrap();
        let _guard = self
            .condvar
            .wait_while(guard, |()| self.epoch.load(Ordering::Relaxed) == seen)
            .unwrap();
    }

    #[cfg(not(test))]
    fn park_until_epoch_advances(&self, seen: u64) {
        while self.epoch.load(Ordering::Relaxed) == seen {
            core::hint::spin_loop();
        }
    }

    #[cfg(test)]
    fn unpark_all(&self) {
        let _guard = self.gate.lock().unwrap();
        self.condvar.notify_all();
    }

    #[cfg(not(test))]
    fn unpark_all(&self) {}
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::sync::spin_lock::SpinLock;

    #[test]
    fn wakes_a_parked_waiter() {
        let lock = Arc::new(SpinLock::new(false));
        let queue = Arc::new(WaitQueue::new());

        let waiter = {
            let lock = Arc::clone(&lock);
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                let mut guard = lock.lock();
                while !*guard {
                    guard = queue.wait(guard);
                }
            })
        };

        std::thread::sleep(Duration::from_millis(10));
        *lock.lock() = true;
        queue.notify_all();

        waiter.join().unwrap();
    }
}
