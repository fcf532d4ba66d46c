//! Condition variable guarded by an epoch counter.
//!
//! A waiter records the epoch it saw and goes back to sleep for as long as the counter has not
//! moved, so native spurious wakeups never leak to the caller. `signal` and `broadcast` must be
//! called with the mutex paired to the waiters held, otherwise a bump may land between a waiter's
//! check and its sleep.

use parking_lot::{Condvar, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct EpochCondvar {
    epoch: AtomicU64,
    cv: Condvar,
}

impl EpochCondvar {
    pub fn new() -> EpochCondvar {
        EpochCondvar::default()
    }

    /// Block until `signal` or `broadcast` advances the epoch. The lock behind `guard` is released
    /// while sleeping and held again on return.
    pub fn wait<T>(&self, guard: &mut MutexGuard<'_, T>) {
        let start = self.epoch.load(Ordering::Acquire);
        while self.epoch.load(Ordering::Acquire) == start {
            self.cv.wait(guard);
        }
    }

    /// Advance the epoch and wake one waiter.
    pub fn signal(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.cv.notify_one();
    }

    /// Advance the epoch and wake all waiters.
    pub fn broadcast(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.cv.notify_all();
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod test {
    use super::EpochCondvar;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    struct Shared {
        mutex: Mutex<()>,
        cv: EpochCondvar,
        started: AtomicUsize,
    }

    fn shared() -> Arc<Shared> {
        Arc::new(Shared {
            mutex: Mutex::new(()),
            cv: EpochCondvar::new(),
            started: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_native_wakeup_ignored() {
        let shared = shared();
        let finished = Arc::new(AtomicBool::new(false));
        let waiter = {
            let shared = shared.clone();
            let finished = finished.clone();
            thread::spawn(move || {
                let mut guard = shared.mutex.lock();
                shared.started.store(1, Ordering::SeqCst);
                shared.cv.wait(&mut guard);
                finished.store(true, Ordering::SeqCst);
            })
        };
        while shared.started.load(Ordering::SeqCst) == 0 {
            thread::yield_now();
        }
        {
            // the waiter holds the mutex until it sleeps
            let _guard = shared.mutex.lock();
            shared.cv.cv.notify_all();
        }
        thread::sleep(Duration::from_millis(50));
        assert!(!finished.load(Ordering::SeqCst));
        assert_eq!(shared.cv.epoch(), 0);

        {
            let _guard = shared.mutex.lock();
            shared.cv.signal();
        }
        waiter.join().unwrap();
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(shared.cv.epoch(), 1);
    }

    #[test]
    fn test_broadcast() {
        let shared = shared();
        let waiter_num = 4;
        let handles: Vec<_> = (0..waiter_num)
            .map(|_| {
                let shared = shared.clone();
                thread::spawn(move || {
                    let mut guard = shared.mutex.lock();
                    shared.started.fetch_add(1, Ordering::SeqCst);
                    shared.cv.wait(&mut guard);
                })
            })
            .collect();
        while shared.started.load(Ordering::SeqCst) != waiter_num {
            thread::yield_now();
        }
        {
            let _guard = shared.mutex.lock();
            shared.cv.broadcast();
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(shared.cv.epoch(), 1);
    }
}
