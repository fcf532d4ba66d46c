//! Thread registry, cache line padding and time helpers shared by all containers.

use parking_lot::{const_mutex, Mutex};
use std::hint;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

cfg_if! {
    if #[cfg(feature = "max_thread_count_4096")] {
        pub const MAX_THREAD_COUNT: usize = 4096;
    } else if #[cfg(feature = "max_thread_count_16")] {
        pub const MAX_THREAD_COUNT: usize = 16;
    } else {
        /// Maximum number of threads registered at the same time
        pub const MAX_THREAD_COUNT: usize = 256;
    }
}

/// Hands out thread indices in `[0, MAX_THREAD_COUNT)`. Indices of exited threads are recycled.
struct ThreadRegistry {
    free: Mutex<Vec<usize>>,
    high_water: AtomicUsize,
}

static REGISTRY: ThreadRegistry = ThreadRegistry {
    free: const_mutex(Vec::new()),
    high_water: AtomicUsize::new(0),
};

impl ThreadRegistry {
    fn try_register(&self) -> Option<usize> {
        if let Some(tid) = self.free.lock().pop() {
            return Some(tid);
        }
        let mut cur = self.high_water.load(Ordering::Relaxed);
        while cur < MAX_THREAD_COUNT {
            match self.high_water.compare_exchange_weak(
                cur,
                cur + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(cur),
                Err(actual) => cur = actual,
            }
        }
        None
    }

    fn register(&self) -> usize {
        let mut warned = false;
        loop {
            if let Some(tid) = self.try_register() {
                debug!("thread {:?} registered as tid={}", thread::current().id(), tid);
                return tid;
            }
            if !warned {
                warn!(
                    "thread number overflow, waiting for a free slot, max={}",
                    MAX_THREAD_COUNT
                );
                warned = true;
            }
            thread::yield_now();
        }
    }

    fn unregister(&self, tid: usize) {
        debug!("tid={} released", tid);
        self.free.lock().push(tid);
    }
}

struct ThreadIdHolder {
    tid: usize,
}

impl Drop for ThreadIdHolder {
    fn drop(&mut self) {
        REGISTRY.unregister(self.tid);
    }
}

/// Index of the current thread, stable for the thread's lifetime and released when it exits.
/// If `MAX_THREAD_COUNT` threads are already registered, blocks until one of them exits.
///
/// # Panics
///
/// Panics when called from a thread-local destructor that runs after the id of the thread has
/// already been released.
pub fn get_thread_id() -> usize {
    thread_local!(static THREAD_ID: ThreadIdHolder = ThreadIdHolder {
        tid: REGISTRY.register(),
    });
    THREAD_ID.with(|holder| holder.tid)
}

/// Upper bound (exclusive) of every index handed out so far.
#[inline]
pub fn thread_id_high_water() -> usize {
    REGISTRY.high_water.load(Ordering::Acquire)
}

#[repr(align(64))]
pub struct WrappedAlign64Type<T>(pub T);

impl<T> Default for WrappedAlign64Type<T>
where
    T: Default,
{
    fn default() -> Self {
        WrappedAlign64Type(T::default())
    }
}

impl<T> Deref for WrappedAlign64Type<T> {
    type Target = T;

    fn deref(&self) -> &<Self as Deref>::Target {
        &self.0
    }
}

impl<T> DerefMut for WrappedAlign64Type<T> {
    fn deref_mut(&mut self) -> &mut <Self as Deref>::Target {
        &mut self.0
    }
}

pub fn get_cur_microseconds_time() -> i64 {
    let timespec = time::get_time();
    timespec.sec * 1_000_000 + timespec.nsec as i64 / 1_000
}

#[inline]
pub fn pause() {
    hint::spin_loop();
}
