//! Two-tier mutual exclusion for the tree.
//!
//! Workers take the low-priority side; the coordinating thread takes the
//! high-priority side when inspecting or pruning the tree. A pending
//! high-priority request blocks new low-priority acquisitions, so the
//! coordinator never starves behind a stream of simulations.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};

/// A mutex whose acquisitions come in two priorities.
pub struct TwoTierLock<T> {
    data: Mutex<T>,
    high_waiters: AtomicUsize,
    gate: Mutex<()>,
    gate_signal: Condvar,
}

impl<T> TwoTierLock<T> {
    pub fn new(value: T) -> TwoTierLock<T> {
        TwoTierLock {
            data: Mutex::new(value),
            high_waiters: AtomicUsize::new(0),
            gate: Mutex::new(()),
            gate_signal: Condvar::new(),
        }
    }

    /// Worker-side acquisition: waits out any pending high-priority
    /// request before contending for the data lock.
    pub fn lock_low(&self) -> MutexGuard<'_, T> {
        let mut gate = self.gate.lock().expect("tree gate poisoned");
        while self.high_waiters.load(Ordering::Acquire) > 0 {
            gate = self.gate_signal.wait(gate).expect("tree gate poisoned");
        }
        drop(gate);
        self.data.lock().expect("tree lock poisoned")
    }

    /// Coordinator-side acquisition: preempts new low-priority entries
    /// while waiting.
    pub fn lock_high(&self) -> HighPriorityGuard<'_, T> {
        self.high_waiters.fetch_add(1, Ordering::AcqRel);
        let guard = self.data.lock().expect("tree lock poisoned");
        HighPriorityGuard { lock: self, guard: Some(guard) }
    }
}

/// Guard of a high-priority acquisition; reopens the gate on drop.
pub struct HighPriorityGuard<'a, T> {
    lock: &'a TwoTierLock<T>,
    guard: Option<MutexGuard<'a, T>>,
}

impl<T> Deref for HighPriorityGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.guard.as_ref().expect("guard taken")
    }
}

impl<T> DerefMut for HighPriorityGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.guard.as_mut().expect("guard taken")
    }
}

impl<T> Drop for HighPriorityGuard<'_, T> {
    fn drop(&mut self) {
        self.guard.take();
        self.lock.high_waiters.fetch_sub(1, Ordering::AcqRel);
        self.lock.gate_signal.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[test]
    fn low_and_high_both_reach_the_data() {
        let lock = TwoTierLock::new(0u32);
        *lock.lock_low() += 1;
        *lock.lock_high() += 1;
        assert_eq!(*lock.lock_low(), 2);
    }

    #[test]
    fn high_priority_is_not_starved_by_workers() {
        let lock = Arc::new(TwoTierLock::new(0u64));
        let running = Arc::new(AtomicBool::new(true));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let lock = Arc::clone(&lock);
                let running = Arc::clone(&running);
                scope.spawn(move || {
                    while running.load(Ordering::Relaxed) {
                        let mut guard = lock.lock_low();
                        *guard += 1;
                        drop(guard);
                    }
                });
            }

            // the coordinator must get through despite the busy workers
            for _ in 0..10 {
                let guard = lock.lock_high();
                let _ = *guard;
                drop(guard);
                std::thread::sleep(Duration::from_millis(1));
            }
            running.store(false, Ordering::Relaxed);
        });
    }

    #[test]
    fn guard_releases_cleanly() {
        let lock = TwoTierLock::new(vec![1, 2, 3]);
        {
            let mut guard = lock.lock_high();
            guard.push(4);
        }
        assert_eq!(lock.lock_low().len(), 4);
    }
}
