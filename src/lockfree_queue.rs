use crate::container::Container;
use crate::error::EmptyError;
use crate::hazard_epoch::{BaseHazardNode, HazardEpoch, HazardNodeT};
use crate::util::WrappedAlign64Type;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

type FIFONodePtr<T> = *mut FIFONode<T>;

/// The value is initialized for every node behind the sentinel and moved out by the dequeuer
/// that turns the node into the new sentinel.
struct FIFONode<T> {
    value: MaybeUninit<T>,
    base: BaseHazardNode,
    next: AtomicPtr<FIFONode<T>>,
}

impl<T> HazardNodeT for FIFONode<T> {
    unsafe fn get_base_hazard_node(node: *mut Self) -> *mut BaseHazardNode {
        &mut (*node).base
    }
}

impl<T> FIFONode<T> {
    fn sentinel() -> FIFONodePtr<T> {
        Self::alloc(MaybeUninit::uninit())
    }

    fn new_raw(value: T) -> FIFONodePtr<T> {
        Self::alloc(MaybeUninit::new(value))
    }

    fn alloc(value: MaybeUninit<T>) -> FIFONodePtr<T> {
        Box::into_raw(Box::new(FIFONode {
            value,
            base: BaseHazardNode::default(),
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }

    #[inline]
    fn next(&self) -> FIFONodePtr<T> {
        self.next.load(Ordering::Acquire)
    }
}

/// Michael & Scott queue: unbounded FIFO with separate `head`/`tail`, a sentinel node and tail
/// helping, so an enqueuer stalled before swinging `tail` never blocks the others.
pub struct LockFreeQueue<T> {
    hazard_epoch: HazardEpoch,
    head: WrappedAlign64Type<AtomicPtr<FIFONode<T>>>,
    tail: WrappedAlign64Type<AtomicPtr<FIFONode<T>>>,
}

unsafe impl<T: Send> Send for LockFreeQueue<T> {}
unsafe impl<T: Send> Sync for LockFreeQueue<T> {}

impl<T> Default for LockFreeQueue<T> {
    fn default() -> Self {
        LockFreeQueue::new()
    }
}

impl<T> LockFreeQueue<T> {
    pub fn new() -> LockFreeQueue<T> {
        Self::with_hazard_epoch(HazardEpoch::default())
    }

    pub fn with_hazard_epoch(hazard_epoch: HazardEpoch) -> LockFreeQueue<T> {
        let sentinel = FIFONode::<T>::sentinel();
        LockFreeQueue {
            hazard_epoch,
            head: WrappedAlign64Type(AtomicPtr::new(sentinel)),
            tail: WrappedAlign64Type(AtomicPtr::new(sentinel)),
        }
    }

    #[inline]
    fn atomic_load_head(&self) -> FIFONodePtr<T> {
        self.head.load(Ordering::Acquire)
    }

    #[inline]
    fn atomic_load_tail(&self) -> FIFONodePtr<T> {
        self.tail.load(Ordering::Acquire)
    }

    /// Swing `tail` from `last` to `next`, failure means someone else already did.
    #[inline]
    fn help_tail(&self, last: FIFONodePtr<T>, next: FIFONodePtr<T>) {
        let _ = self
            .tail
            .compare_exchange(last, next, Ordering::AcqRel, Ordering::Relaxed);
    }

    pub fn enqueue(&self, v: T) {
        let node = FIFONode::new_raw(v);
        let _guard = self.hazard_epoch.pin();
        loop {
            let last = self.atomic_load_tail();
            let next = unsafe { (*last).next() };
            if last != self.atomic_load_tail() {
                continue;
            }
            if next.is_null() {
                let linked = unsafe {
                    (*last).next.compare_exchange(
                        ptr::null_mut(),
                        node,
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    )
                };
                if linked.is_ok() {
                    self.help_tail(last, node);
                    return;
                }
            } else {
                self.help_tail(last, next);
            }
        }
    }

    pub fn dequeue(&self) -> Result<T, EmptyError> {
        let _guard = self.hazard_epoch.pin();
        loop {
            let first = self.atomic_load_head();
            let last = self.atomic_load_tail();
            let next = unsafe { (*first).next() };
            if first != self.atomic_load_head() {
                continue;
            }
            if first == last {
                if next.is_null() {
                    return Err(EmptyError);
                }
                self.help_tail(last, next);
            } else if self
                .head
                .compare_exchange(first, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // `next` is the new sentinel, its value belongs to this thread alone
                let v = unsafe { ptr::read((*next).value.as_ptr()) };
                unsafe { self.hazard_epoch.add_node(first) };
                return Ok(v);
            }
        }
    }

    /// Alias of `enqueue`.
    #[inline]
    pub fn push(&self, v: T) {
        self.enqueue(v)
    }

    /// Alias of `dequeue`.
    #[inline]
    pub fn pop(&self) -> Result<T, EmptyError> {
        self.dequeue()
    }

    pub fn is_empty(&self) -> bool {
        let _guard = self.hazard_epoch.pin();
        unsafe { (*self.atomic_load_head()).next().is_null() }
    }

    #[cfg(test)]
    fn hazard_epoch(&self) -> &HazardEpoch {
        &self.hazard_epoch
    }
}

impl<T> Drop for LockFreeQueue<T> {
    fn drop(&mut self) {
        let sentinel = *self.head.get_mut();
        unsafe {
            let mut cur = (*sentinel).next();
            drop(Box::from_raw(sentinel));
            while !cur.is_null() {
                let mut node = Box::from_raw(cur);
                ptr::drop_in_place(node.value.as_mut_ptr());
                cur = node.next();
            }
        }
        *self.head.get_mut() = ptr::null_mut();
        *self.tail.get_mut() = ptr::null_mut();
    }
}

impl<T: Send> Container<T> for LockFreeQueue<T> {
    fn push(&self, value: T) {
        self.enqueue(value)
    }

    fn pop(&self) -> Result<T, EmptyError> {
        self.dequeue()
    }

    fn name(&self) -> &'static str {
        "lockfree_queue"
    }
}
