use crate::error;
use crate::util::{self, WrappedAlign64Type};
use std::ptr;
use std::sync::atomic::{self, AtomicI64, AtomicPtr, AtomicU32, AtomicU64, Ordering};

/// Version of a thread store which is not inside any critical section.
const INACTIVE_VERSION: u64 = std::u64::MAX;

/// `tid` in the low 16 bits, `seq` in the high 32 bits.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct VersionHandle {
    data: u64,
}

impl VersionHandle {
    pub fn new(uv: u64) -> VersionHandle {
        VersionHandle { data: uv }
    }

    fn from_parts(tid: u16, seq: u32) -> VersionHandle {
        VersionHandle {
            data: (u64::from(seq) << 32) | u64::from(tid),
        }
    }

    pub fn ver_u64(&self) -> u64 {
        self.data
    }

    #[inline]
    pub fn tid(&self) -> u16 {
        (self.data & 0xffff) as u16
    }

    #[inline]
    fn seq(&self) -> u32 {
        (self.data >> 32) as u32
    }
}

/// Implemented by every object that can be handed to `HazardEpoch::add_node`. The object embeds
/// a `BaseHazardNode`, which links it into a retire list until it is safe to drop.
pub trait HazardNodeT {
    /// Returns the embedded `BaseHazardNode` of `node`.
    ///
    /// # Safety
    ///
    /// `node` must point to a live object.
    unsafe fn get_base_hazard_node(node: *mut Self) -> *mut BaseHazardNode;
}

pub struct BaseHazardNode {
    owner: *mut (),
    reclaim: Option<unsafe fn(*mut ())>,
    next: *mut BaseHazardNode,
    version: u64,
}

impl Default for BaseHazardNode {
    fn default() -> Self {
        BaseHazardNode {
            owner: ptr::null_mut(),
            reclaim: None,
            next: ptr::null_mut(),
            version: std::u64::MAX,
        }
    }
}

impl HazardNodeT for BaseHazardNode {
    unsafe fn get_base_hazard_node(node: *mut Self) -> *mut BaseHazardNode {
        node
    }
}

impl BaseHazardNode {
    #[inline]
    fn next(&self) -> *mut BaseHazardNode {
        self.next
    }

    #[inline]
    fn set_next(&mut self, next: *mut BaseHazardNode) {
        debug_assert_ne!(next, self as *mut _);
        self.next = next;
    }

    #[inline]
    fn version(&self) -> u64 {
        self.version
    }
}

unsafe fn reclaim_boxed<T>(owner: *mut ()) {
    drop(Box::from_raw(owner as *mut T));
}

/// Per thread bookkeeping of a `HazardEpoch`: the version reserved by the owning thread and the
/// list of objects it retired.
pub struct ThreadStore {
    tid: u16,
    depth: AtomicU32,
    curr_seq: AtomicU32,
    last_retire_version: AtomicU64,
    curr_version: WrappedAlign64Type<AtomicU64>,
    hazard_waiting_list: WrappedAlign64Type<AtomicPtr<BaseHazardNode>>,
    hazard_waiting_count: WrappedAlign64Type<AtomicI64>,
    next: AtomicPtr<ThreadStore>,
}

impl ThreadStore {
    pub fn new(tid: u16) -> ThreadStore {
        ThreadStore {
            tid,
            depth: AtomicU32::new(0),
            curr_seq: AtomicU32::new(0),
            last_retire_version: AtomicU64::new(INACTIVE_VERSION),
            curr_version: WrappedAlign64Type(AtomicU64::new(INACTIVE_VERSION)),
            hazard_waiting_list: WrappedAlign64Type(AtomicPtr::new(ptr::null_mut())),
            hazard_waiting_count: Default::default(),
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }

    pub fn tid(&self) -> u16 {
        self.tid
    }

    pub fn set_next(&self, next: *mut ThreadStore) {
        self.next.store(next, Ordering::Release);
    }

    pub fn next(&self) -> *mut ThreadStore {
        self.next.load(Ordering::Acquire)
    }

    /// True while the owning thread is inside at least one critical section.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.depth.load(Ordering::Relaxed) > 0
    }

    /// Publish `version` as the reservation of the owning thread. Nested calls keep the outer
    /// reservation and only deepen the critical section.
    pub fn acquire(&self, version: u64) -> VersionHandle {
        debug_assert_eq!(self.tid as usize, util::get_thread_id());
        let depth = self.depth.load(Ordering::Relaxed);
        if depth == 0 {
            self.curr_version.store(version, Ordering::SeqCst);
            atomic::fence(Ordering::SeqCst);
        }
        self.depth.store(depth + 1, Ordering::Relaxed);
        VersionHandle::from_parts(self.tid, self.curr_seq.load(Ordering::Relaxed))
    }

    pub fn release(&self, handle: &VersionHandle) -> error::Status {
        let depth = self.depth.load(Ordering::Relaxed);
        if handle.tid() != self.tid
            || self.tid as usize != util::get_thread_id()
            || handle.seq() != self.curr_seq.load(Ordering::Relaxed)
            || depth == 0
        {
            warn!(
                "invalid handle seq={}, tid={}, depth={}",
                handle.seq(),
                handle.tid(),
                depth
            );
            return error::Status::InvalidParam;
        }
        self.depth.store(depth - 1, Ordering::Relaxed);
        if depth == 1 {
            self.curr_version.store(INACTIVE_VERSION, Ordering::SeqCst);
            self.curr_seq.fetch_add(1, Ordering::Relaxed);
        }
        error::Status::Success
    }

    /// Stamp `node` with `version` and push it into the retire list of this store.
    ///
    /// # Safety
    ///
    /// `node` must be non-null, come from `Box::into_raw`, be unreachable for new readers and not
    /// be retired twice.
    pub unsafe fn add_node<T>(&self, version: u64, node: *mut T) -> error::Status
    where
        T: HazardNodeT,
    {
        let base = T::get_base_hazard_node(node);
        (*base).owner = node as *mut ();
        (*base).reclaim = Some(reclaim_boxed::<T>);
        (*base).version = version;
        self.inner_add_nodes(base, base, 1);
        error::Status::Success
    }

    pub fn get_hazard_waiting_count(&self) -> i64 {
        self.hazard_waiting_count.load(Ordering::Acquire)
    }

    /// Take over the whole retire list, drop every object whose version is not greater than
    /// `version` and hand the rest to `node_receiver`. Returns the number of dropped objects.
    ///
    /// # Safety
    ///
    /// `version` must not exceed the minimum reservation of all threads, otherwise an object can
    /// be dropped while still being read.
    pub unsafe fn retire(&self, version: u64, node_receiver: &ThreadStore) -> i64 {
        if self.last_retire_version.swap(version, Ordering::Relaxed) == version {
            return 0;
        }
        let curr = self
            .hazard_waiting_list
            .swap(ptr::null_mut(), Ordering::AcqRel);
        let mut list_retire = ptr::null_mut::<BaseHazardNode>();
        let mut move_count = 0i64;
        let mut retire_count = 0i64;
        let mut pseudo_head = BaseHazardNode::default();
        pseudo_head.set_next(curr);
        let mut iter = &mut pseudo_head as *mut BaseHazardNode;
        while !(*iter).next().is_null() {
            let node = (*iter).next();
            if (*node).version() <= version {
                retire_count += 1;
                (*iter).set_next((*node).next());
                (*node).set_next(list_retire);
                list_retire = node;
            } else {
                move_count += 1;
                iter = node;
            }
        }
        let move_list_head = pseudo_head.next();
        if !move_list_head.is_null() {
            node_receiver.inner_add_nodes(move_list_head, iter, move_count);
        }
        self.hazard_waiting_count
            .fetch_sub(move_count + retire_count, Ordering::AcqRel);
        while !list_retire.is_null() {
            let node_retire = list_retire;
            list_retire = (*list_retire).next();
            Self::retire_hazard_node(node_retire);
        }
        retire_count
    }

    unsafe fn retire_hazard_node(node_retire: *mut BaseHazardNode) {
        let owner = (*node_retire).owner;
        if let Some(reclaim) = (*node_retire).reclaim {
            reclaim(owner);
        }
    }

    /// Version reserved by the owning thread, `u64::MAX` when inactive.
    pub fn version(&self) -> u64 {
        self.curr_version.load(Ordering::SeqCst)
    }

    unsafe fn inner_add_nodes(
        &self,
        head: *mut BaseHazardNode,
        tail: *mut BaseHazardNode,
        count: i64,
    ) {
        if 0 < count {
            let mut old = self.hazard_waiting_list.load(Ordering::Acquire);
            loop {
                (*tail).set_next(old);
                match self.hazard_waiting_list.compare_exchange_weak(
                    old,
                    head,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => break,
                    Err(cur) => old = cur,
                }
            }
            self.hazard_waiting_count.fetch_add(count, Ordering::AcqRel);
        }
    }
}

impl Drop for ThreadStore {
    fn drop(&mut self) {
        let mut node = *self.hazard_waiting_list.get_mut();
        *self.hazard_waiting_list.get_mut() = ptr::null_mut();
        while !node.is_null() {
            unsafe {
                let next = (*node).next();
                Self::retire_hazard_node(node);
                node = next;
            }
        }
    }
}
