use crate::container::Container;
use crate::error::EmptyError;
use crate::hazard_epoch::{BaseHazardNode, HazardEpoch, HazardNodeT};
use crate::util::WrappedAlign64Type;
use crossbeam_utils::Backoff;
use std::mem::ManuallyDrop;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

pub(crate) type LIFONodePtr<T> = *mut LIFONode<T>;

pub(crate) struct LIFONode<T> {
    value: ManuallyDrop<T>,
    base: BaseHazardNode,
    next: LIFONodePtr<T>,
}

impl<T> HazardNodeT for LIFONode<T> {
    unsafe fn get_base_hazard_node(node: *mut Self) -> *mut BaseHazardNode {
        &mut (*node).base
    }
}

impl<T> LIFONode<T> {
    pub(crate) fn new_raw(value: T) -> LIFONodePtr<T> {
        Box::into_raw(Box::new(LIFONode {
            value: ManuallyDrop::new(value),
            base: BaseHazardNode::default(),
            next: ptr::null_mut(),
        }))
    }

    fn next(&self) -> LIFONodePtr<T> {
        self.next
    }

    fn set_next(&mut self, next: LIFONodePtr<T>) {
        self.next = next;
    }

    /// Move the value out. The value must not be read again unless `put_value` refills it.
    pub(crate) unsafe fn take_value(node: LIFONodePtr<T>) -> T {
        ManuallyDrop::take(&mut (*node).value)
    }

    pub(crate) unsafe fn put_value(node: LIFONodePtr<T>, value: T) {
        ptr::write(&mut (*node).value, ManuallyDrop::new(value));
    }

    /// Free a node whose value was moved out.
    pub(crate) unsafe fn free_empty(node: LIFONodePtr<T>) {
        drop(Box::from_raw(node));
    }
}

/// Outcome of a single pop attempt.
pub(crate) enum PopAttempt<T> {
    Popped(T),
    Empty,
    Contended,
}

/// Treiber stack: unbounded LIFO with a single CAS-swung `top`. Popped nodes are retired to a
/// `HazardEpoch` instead of being freed in place.
pub struct LockFreeStack<T> {
    hazard_epoch: HazardEpoch,
    top: WrappedAlign64Type<AtomicPtr<LIFONode<T>>>,
}

unsafe impl<T: Send> Send for LockFreeStack<T> {}
unsafe impl<T: Send> Sync for LockFreeStack<T> {}

impl<T> Default for LockFreeStack<T> {
    fn default() -> Self {
        LockFreeStack::new()
    }
}

impl<T> LockFreeStack<T> {
    pub fn new() -> LockFreeStack<T> {
        Self::with_hazard_epoch(HazardEpoch::default())
    }

    pub fn with_hazard_epoch(hazard_epoch: HazardEpoch) -> LockFreeStack<T> {
        LockFreeStack {
            hazard_epoch,
            top: WrappedAlign64Type(AtomicPtr::new(ptr::null_mut())),
        }
    }

    #[inline]
    fn atomic_load_top(&self) -> LIFONodePtr<T> {
        self.top.load(Ordering::Acquire)
    }

    pub(crate) fn hazard_epoch(&self) -> &HazardEpoch {
        &self.hazard_epoch
    }

    pub fn push(&self, v: T) {
        let node = LIFONode::new_raw(v);
        let _guard = self.hazard_epoch.pin();
        let backoff = Backoff::new();
        while !unsafe { self.try_push_node(node) } {
            backoff.spin();
        }
    }

    /// One CAS attempt to link `node` on top. False if another thread moved `top` in between.
    pub(crate) unsafe fn try_push_node(&self, node: LIFONodePtr<T>) -> bool {
        let old = self.atomic_load_top();
        (*node).set_next(old);
        self.top
            .compare_exchange(old, node, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    pub fn pop(&self) -> Result<T, EmptyError> {
        let _guard = self.hazard_epoch.pin();
        let backoff = Backoff::new();
        loop {
            match unsafe { self.try_pop_once() } {
                PopAttempt::Popped(v) => return Ok(v),
                PopAttempt::Empty => return Err(EmptyError),
                PopAttempt::Contended => backoff.spin(),
            }
        }
    }

    /// One CAS attempt to unlink the top node. The caller must hold a guard of `hazard_epoch`.
    pub(crate) unsafe fn try_pop_once(&self) -> PopAttempt<T> {
        let cur = self.atomic_load_top();
        if cur.is_null() {
            return PopAttempt::Empty;
        }
        let next = (*cur).next();
        if self
            .top
            .compare_exchange(cur, next, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return PopAttempt::Contended;
        }
        let v = LIFONode::take_value(cur);
        self.hazard_epoch.add_node(cur);
        PopAttempt::Popped(v)
    }

    pub fn is_empty(&self) -> bool {
        self.atomic_load_top().is_null()
    }

    /// Number of linked nodes. Exact only while no other thread is pushing or popping.
    pub fn len(&self) -> usize {
        let _guard = self.hazard_epoch.pin();
        let mut len = 0;
        let mut cur = self.atomic_load_top();
        while !cur.is_null() {
            len += 1;
            cur = unsafe { (*cur).next() };
        }
        len
    }
}

impl<T> Drop for LockFreeStack<T> {
    fn drop(&mut self) {
        let mut cur = *self.top.get_mut();
        while !cur.is_null() {
            unsafe {
                let mut node = Box::from_raw(cur);
                ManuallyDrop::drop(&mut node.value);
                cur = node.next();
            }
        }
        *self.top.get_mut() = ptr::null_mut();
    }
}

impl<T: Send> Container<T> for LockFreeStack<T> {
    fn push(&self, value: T) {
        LockFreeStack::push(self, value)
    }

    fn pop(&self) -> Result<T, EmptyError> {
        LockFreeStack::pop(self)
    }

    fn name(&self) -> &'static str {
        "lockfree_stack"
    }
}
