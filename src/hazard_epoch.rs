//! Definition and implementations of of `HazardEpoch`
//!
use crate::error;
use crate::hazard_pointer::ThreadStore;
use crate::spin_lock::SpinLock;
use crate::util::{self, WrappedAlign64Type};
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{self, AtomicI64, AtomicPtr, AtomicU64, Ordering};

pub use crate::hazard_pointer::{BaseHazardNode, HazardNodeT, VersionHandle};
pub use crate::util::MAX_THREAD_COUNT;

struct VersionTimestamp {
    curr_min_version: AtomicU64,
    curr_min_version_timestamp: AtomicI64,
}

/// `HazardEpoch` a practical implementation of `Hazard Pointers`, which use global incremental
/// version to identify shared object to be reclaimed. Because of [`False sharing`](https://en.wikipedia.org/wiki/False_sharing),
/// a part of the member variables, might be frequently modified by different threads, are aligned
/// to 64 bytes.
///
/// A thread enters a critical section with `acquire` (or `pin`), which reserves the current
/// version. An object retired by `add_node` is stamped with a newer version and is dropped only
/// once every reservation is at least that version, so no thread can still be reading it and its
/// address cannot be reused under a pending CAS.
pub struct HazardEpoch {
    thread_waiting_threshold: i64,
    min_version_cache_time_us: i64,
    version: WrappedAlign64Type<AtomicU64>,
    thread_lock: WrappedAlign64Type<SpinLock>,
    threads: Box<[AtomicPtr<ThreadStore>]>,
    thread_list: AtomicPtr<ThreadStore>,
    thread_count: AtomicI64,
    hazard_waiting_count: WrappedAlign64Type<AtomicI64>,
    curr_min_version_info: WrappedAlign64Type<VersionTimestamp>,
}

impl Default for HazardEpoch {
    /// Return `Self::new(64, 200000)`
    fn default() -> Self {
        Self::new(64, 200000)
    }
}

impl HazardEpoch {
    #[inline]
    fn curr_min_version(&self) -> u64 {
        self.curr_min_version_info
            .curr_min_version
            .load(Ordering::Acquire)
    }

    #[inline]
    fn set_curr_min_version(&self, curr_min_version: u64) {
        self.curr_min_version_info
            .curr_min_version
            .store(curr_min_version, Ordering::Release);
    }

    #[inline]
    fn curr_min_version_timestamp(&self) -> i64 {
        self.curr_min_version_info
            .curr_min_version_timestamp
            .load(Ordering::Acquire)
    }

    #[inline]
    fn set_curr_min_version_timestamp(&self, curr_min_version_timestamp: i64) {
        self.curr_min_version_info
            .curr_min_version_timestamp
            .store(curr_min_version_timestamp, Ordering::Release);
    }

    /// `thread_waiting_threshold` means the maximum of the number of shared objects to be
    /// reclaimed under one thread. `min_version_cache_time_us` means the time
    /// interval(microsecond) to update minimum version cache.
    ///
    /// # Examples
    ///
    /// ```
    /// use lockfree_containers::hazard_epoch::HazardEpoch;
    ///
    /// let h = HazardEpoch::new(64, 200000);
    /// assert_eq!(h.atomic_load_hazard_waiting_count(), 0);
    /// ```
    ///
    pub fn new(thread_waiting_threshold: i64, min_version_cache_time_us: i64) -> HazardEpoch {
        HazardEpoch {
            thread_waiting_threshold,
            min_version_cache_time_us,
            version: WrappedAlign64Type(AtomicU64::new(0)),
            thread_lock: WrappedAlign64Type(SpinLock::default()),
            threads: (0..MAX_THREAD_COUNT)
                .map(|_| AtomicPtr::new(ptr::null_mut()))
                .collect(),
            thread_list: AtomicPtr::new(ptr::null_mut()),
            thread_count: AtomicI64::new(0),
            hazard_waiting_count: WrappedAlign64Type(AtomicI64::new(0)),
            curr_min_version_info: WrappedAlign64Type(VersionTimestamp {
                curr_min_version: AtomicU64::new(0),
                curr_min_version_timestamp: AtomicI64::new(0),
            }),
        }
    }

    /// Reclaim all shared objects that no thread can still be reading. It is also triggered by
    /// `release` once too many objects are waiting.
    ///
    /// # Examples
    ///
    /// ```
    /// use lockfree_containers::hazard_epoch::HazardEpoch;
    /// use lockfree_containers::hazard_epoch::BaseHazardNode;
    ///
    /// let h = HazardEpoch::default();
    /// let node = Box::into_raw(Box::new(BaseHazardNode::default()));
    /// unsafe { h.add_node(node); }
    /// h.retire();
    /// assert_eq!(h.atomic_load_hazard_waiting_count(), 0);
    /// ```
    ///
    pub fn retire(&self) {
        let ts = self.get_thread_store();
        let min_version = self.get_min_version(true);
        let retire_count = unsafe { ts.retire(min_version, ts) };
        self.hazard_waiting_count
            .fetch_sub(retire_count, Ordering::AcqRel);

        let mut iter = self.atomic_load_thread_list();
        while !iter.is_null() {
            let other = unsafe { &*iter };
            if !ptr::eq(other, ts) {
                let retire_count = unsafe { other.retire(min_version, ts) };
                self.hazard_waiting_count
                    .fetch_sub(retire_count, Ordering::AcqRel);
            }
            iter = other.next();
        }
        debug!(
            "retire pass done, min_version={}, hazard_waiting_count={}",
            min_version,
            self.atomic_load_hazard_waiting_count()
        );
    }

    /// Hand an unlinked object over to be dropped once no thread can still be reading it.
    /// `node` can be any boxed type as long as it implements Trait `HazardNodeT`.
    ///
    /// # Safety
    ///
    /// `node` must come from `Box::into_raw`, must already be unreachable for threads that
    /// `acquire` from now on, and must not be retired twice.
    ///
    /// # Examples
    ///
    /// ```
    /// use lockfree_containers::hazard_epoch::HazardEpoch;
    /// use lockfree_containers::hazard_epoch::{BaseHazardNode, HazardNodeT};
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicI32, Ordering};
    ///
    /// struct Node {
    ///     base: BaseHazardNode,
    ///     cnt: Arc<AtomicI32>,
    /// }
    ///
    /// impl Drop for Node {
    ///     fn drop(&mut self) {
    ///         self.cnt.fetch_add(10, Ordering::SeqCst);
    ///     }
    /// }
    ///
    /// impl HazardNodeT for Node {
    ///     unsafe fn get_base_hazard_node(node: *mut Self) -> *mut BaseHazardNode {
    ///         &mut (*node).base
    ///     }
    /// }
    ///
    /// let cnt = Arc::new(AtomicI32::new(0));
    /// let h = HazardEpoch::default();
    /// let node = Box::into_raw(Box::new(Node {
    ///     base: Default::default(),
    ///     cnt: cnt.clone(),
    /// }));
    /// unsafe { h.add_node(node); }
    /// drop(h);
    /// assert_eq!(cnt.load(Ordering::SeqCst), 10);
    /// ```
    ///
    pub unsafe fn add_node<T>(&self, node: *mut T) -> error::Status
    where
        T: HazardNodeT,
    {
        if node.is_null() {
            warn!("node is null");
            return error::Status::InvalidParam;
        }
        let ts = self.get_thread_store();
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let ret = ts.add_node(version, node);
        if error::Status::Success != ret {
            warn!("add_node fail, ret={}", ret);
        } else {
            self.hazard_waiting_count.fetch_add(1, Ordering::AcqRel);
        }
        ret
    }

    #[inline]
    fn atomic_load_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Before accessing a shared object, call method `acquire` to get the `handle` of this
    /// operation. Calls nest: an inner `acquire` keeps the reservation of the outer one.
    ///
    /// # Examples
    ///
    /// ```
    /// use lockfree_containers::hazard_epoch::HazardEpoch;
    /// use lockfree_containers::error::Status;
    ///
    /// let h = HazardEpoch::default();
    /// let handle = h.acquire();
    /// assert_eq!(h.release(handle), Status::Success);
    /// ```
    ///
    pub fn acquire(&self) -> VersionHandle {
        let ts = self.get_thread_store();
        if ts.is_active() {
            return ts.acquire(ts.version());
        }
        loop {
            let version = self.atomic_load_version();
            let version_handle = ts.acquire(version);
            if version != self.atomic_load_version() {
                ts.release(&version_handle);
            } else {
                return version_handle;
            }
        }
    }

    /// `acquire` and return a guard which calls `release` when dropped.
    ///
    /// The reservation belongs to the calling thread, so the guard cannot leave it:
    ///
    /// ```compile_fail
    /// use lockfree_containers::hazard_epoch::HazardEpoch;
    ///
    /// fn assert_send<T: Send>(_: &T) {}
    ///
    /// let h = HazardEpoch::default();
    /// let guard = h.pin();
    /// assert_send(&guard);
    /// ```
    #[inline]
    pub fn pin(&self) -> HazardGuard<'_> {
        HazardGuard {
            hazard_epoch: self,
            handle: self.acquire(),
            _marker: PhantomData,
        }
    }

    #[inline]
    fn atomic_load_thread_count(&self) -> i64 {
        self.thread_count.load(Ordering::Acquire)
    }

    /// After accessing a shared object, call method `release` to trigger reclaiming. Usage is the
    /// same as `acquire`.
    pub fn release(&self, handle: VersionHandle) -> error::Status {
        let tid = handle.tid() as usize;
        let ts = match self.threads.get(tid).map(|ts| ts.load(Ordering::Acquire)) {
            Some(ts) if !ts.is_null() => unsafe { &*ts },
            _ => {
                warn!("release with unknown handle, tid={}", tid);
                return error::Status::InvalidParam;
            }
        };
        let ret = ts.release(&handle);
        if error::Status::Success != ret || ts.is_active() {
            return ret;
        }
        if self.thread_waiting_threshold < ts.get_hazard_waiting_count() {
            let min_version = self.get_min_version(false);
            let retire_count = unsafe { ts.retire(min_version, ts) };
            self.hazard_waiting_count
                .fetch_sub(retire_count, Ordering::AcqRel);
        } else if self.atomic_load_thread_count() * self.thread_waiting_threshold
            < self.atomic_load_hazard_waiting_count()
        {
            self.retire();
        }
        ret
    }

    /// Atomic load count of shared objects waiting to be reclaimed.
    #[inline]
    pub fn atomic_load_hazard_waiting_count(&self) -> i64 {
        self.hazard_waiting_count.load(Ordering::Acquire)
    }

    /// Thread store of the calling thread, registered on first use.
    fn get_thread_store(&self) -> &ThreadStore {
        let tid = util::get_thread_id();
        let slot = &self.threads[tid];
        let ts = slot.load(Ordering::Acquire);
        if !ts.is_null() {
            return unsafe { &*ts };
        }
        // only the owner of `tid` installs this slot, the lock guards `thread_list`
        let _guard = self.thread_lock.lock_guard();
        let ts = Box::into_raw(Box::new(ThreadStore::new(tid as u16)));
        unsafe { (*ts).set_next(self.atomic_load_thread_list()) };
        slot.store(ts, Ordering::Release);
        self.thread_list.store(ts, Ordering::Release);
        self.thread_count.fetch_add(1, Ordering::AcqRel);
        debug!("thread store registered, tid={}", tid);
        unsafe { &*ts }
    }

    #[inline]
    fn atomic_load_thread_list(&self) -> *mut ThreadStore {
        self.thread_list.load(Ordering::Acquire)
    }

    fn get_min_version(&self, force_flush: bool) -> u64 {
        if !force_flush {
            let ret = self.curr_min_version();
            if 0 != ret
                && self.curr_min_version_timestamp() + self.min_version_cache_time_us
                    > util::get_cur_microseconds_time()
            {
                return ret;
            }
        }
        let mut ret = self.atomic_load_version();
        atomic::fence(Ordering::SeqCst);
        let mut iter = self.atomic_load_thread_list();
        while !iter.is_null() {
            let ts = unsafe { &*iter };
            let ts_min_version = ts.version();
            if ret > ts_min_version {
                ret = ts_min_version;
            }
            iter = ts.next();
        }
        self.set_curr_min_version(ret);
        self.set_curr_min_version_timestamp(util::get_cur_microseconds_time());
        ret
    }
}

impl Drop for HazardEpoch {
    fn drop(&mut self) {
        let mut reclaimed = 0;
        for slot in self.threads.iter_mut() {
            let ts = *slot.get_mut();
            if !ts.is_null() {
                let ts = unsafe { Box::from_raw(ts) };
                reclaimed += ts.get_hazard_waiting_count();
            }
        }
        debug!("hazard epoch dropped, reclaimed={}", reclaimed);
    }
}

/// Critical section of a `HazardEpoch`, see `HazardEpoch::pin`. Neither `Send` nor `Sync`: it
/// must be dropped on the thread that pinned.
pub struct HazardGuard<'a> {
    hazard_epoch: &'a HazardEpoch,
    handle: VersionHandle,
    _marker: PhantomData<*mut ()>,
}

impl<'a> Drop for HazardGuard<'a> {
    fn drop(&mut self) {
        self.hazard_epoch.release(self.handle);
    }
}
