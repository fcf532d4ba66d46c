//! Treiber stack with an elimination array.
//!
//! A push and a pop that meet in the same slot exchange the value directly and never touch `top`.
//! Both operations first probe one random slot for a partner that is already waiting. If the
//! probe misses they go to the shared stack, and when a CAS on `top` loses a race they offer
//! themselves in a random free slot for a bounded number of spins before retrying.
//!
//! Slot states:
//!
//! ```text
//!  FREE --owner--> CLAIMED --owner--> PUSH_WAITING --partner--> EXCHANGING --partner--> TAKEN --owner--> FREE
//!                                         \--owner (timeout)--> CLAIMED --owner--> FREE
//!  FREE --owner--> POP_WAITING --partner--> EXCHANGING --partner--> DELIVERED --owner--> FREE
//!                      \--owner (timeout)--> FREE
//! ```
//!
//! Only the owner that published a waiting state moves the slot back to `FREE`, so a partner can
//! never resolve a slot that was recycled under it.

use crate::container::Container;
use crate::error::EmptyError;
use crate::lockfree_stack::{LIFONode, LockFreeStack, PopAttempt};
use crate::util::WrappedAlign64Type;
use crossbeam_utils::Backoff;
use rand::Rng;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

const FREE: usize = 0;
const PUSH_WAITING: usize = 1;
const POP_WAITING: usize = 2;
const CLAIMED: usize = 3;
const EXCHANGING: usize = 4;
const TAKEN: usize = 5;
const DELIVERED: usize = 6;

struct EliminationSlot<T> {
    state: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> EliminationSlot<T> {
    fn new() -> Self {
        EliminationSlot {
            state: AtomicUsize::new(FREE),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    #[inline]
    fn cas(&self, current: usize, new: usize) -> bool {
        self.state
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    fn state(&self) -> usize {
        self.state.load(Ordering::Acquire)
    }

    /// The caller must own the slot exclusively (`CLAIMED` or `EXCHANGING`).
    unsafe fn write(&self, value: T) {
        ptr::write((*self.value.get()).as_mut_ptr(), value);
    }

    /// The caller must own the slot exclusively and the value must have been written.
    unsafe fn read(&self) -> T {
        ptr::read((*self.value.get()).as_ptr())
    }

    fn wait_for(&self, state: usize) {
        let backoff = Backoff::new();
        while self.state() != state {
            backoff.snooze();
        }
    }
}

/// Tuning of the elimination array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EliminationConfig {
    /// Number of rendezvous slots.
    pub slot_count: usize,
    /// How many backoff steps an offer waits for a partner before withdrawing.
    pub spin_limit: u32,
}

impl Default for EliminationConfig {
    fn default() -> Self {
        EliminationConfig {
            slot_count: 8,
            spin_limit: 128,
        }
    }
}

pub struct EliminationStack<T> {
    stack: LockFreeStack<T>,
    slots: Box<[WrappedAlign64Type<EliminationSlot<T>>]>,
    spin_limit: u32,
    eliminated: AtomicUsize,
}

unsafe impl<T: Send> Send for EliminationStack<T> {}
unsafe impl<T: Send> Sync for EliminationStack<T> {}

impl<T> Default for EliminationStack<T> {
    fn default() -> Self {
        EliminationStack::new()
    }
}

impl<T> EliminationStack<T> {
    pub fn new() -> EliminationStack<T> {
        Self::with_config(EliminationConfig::default())
    }

    /// # Panics
    ///
    /// Panics if `config.slot_count` is zero.
    pub fn with_config(config: EliminationConfig) -> EliminationStack<T> {
        assert!(config.slot_count > 0, "slot_count must be non-zero");
        EliminationStack {
            stack: LockFreeStack::new(),
            slots: (0..config.slot_count)
                .map(|_| WrappedAlign64Type(EliminationSlot::new()))
                .collect(),
            spin_limit: config.spin_limit,
            eliminated: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn random_slot(&self) -> &EliminationSlot<T> {
        let idx = rand::thread_rng().gen_range(0..self.slots.len());
        &self.slots[idx]
    }

    pub fn push(&self, v: T) {
        let v = match self.try_deliver(v) {
            Ok(()) => return,
            Err(v) => v,
        };
        let node = LIFONode::new_raw(v);
        let _guard = self.stack.hazard_epoch().pin();
        loop {
            if unsafe { self.stack.try_push_node(node) } {
                return;
            }
            let v = unsafe { LIFONode::take_value(node) };
            match self.offer_push(v) {
                Ok(()) => {
                    unsafe { LIFONode::free_empty(node) };
                    return;
                }
                Err(v) => unsafe { LIFONode::put_value(node, v) },
            }
        }
    }

    pub fn pop(&self) -> Result<T, EmptyError> {
        if let Some(v) = self.try_take() {
            return Ok(v);
        }
        let _guard = self.stack.hazard_epoch().pin();
        loop {
            match unsafe { self.stack.try_pop_once() } {
                PopAttempt::Popped(v) => return Ok(v),
                PopAttempt::Empty => return Err(EmptyError),
                PopAttempt::Contended => {
                    if let Some(v) = self.offer_pop() {
                        return Ok(v);
                    }
                }
            }
        }
    }

    /// Hand `v` to a pop waiting in a random slot.
    fn try_deliver(&self, v: T) -> Result<(), T> {
        let slot = self.random_slot();
        if !slot.cas(POP_WAITING, EXCHANGING) {
            return Err(v);
        }
        unsafe { slot.write(v) };
        slot.state.store(DELIVERED, Ordering::Release);
        self.eliminated.fetch_add(1, Ordering::Relaxed);
        trace!("push eliminated against a waiting pop");
        Ok(())
    }

    /// Take the value of a push waiting in a random slot.
    fn try_take(&self) -> Option<T> {
        let slot = self.random_slot();
        if !slot.cas(PUSH_WAITING, EXCHANGING) {
            return None;
        }
        let v = unsafe { slot.read() };
        slot.state.store(TAKEN, Ordering::Release);
        self.eliminated.fetch_add(1, Ordering::Relaxed);
        trace!("pop eliminated against a waiting push");
        Some(v)
    }

    /// Wait in a free slot for a pop to take `v`. Gives `v` back if no partner showed up.
    fn offer_push(&self, v: T) -> Result<(), T> {
        let slot = self.random_slot();
        if !slot.cas(FREE, CLAIMED) {
            return Err(v);
        }
        unsafe { slot.write(v) };
        slot.state.store(PUSH_WAITING, Ordering::Release);

        let backoff = Backoff::new();
        for _ in 0..self.spin_limit {
            if slot.state() == TAKEN {
                slot.state.store(FREE, Ordering::Release);
                return Ok(());
            }
            backoff.snooze();
        }
        if slot.cas(PUSH_WAITING, CLAIMED) {
            let v = unsafe { slot.read() };
            slot.state.store(FREE, Ordering::Release);
            return Err(v);
        }
        // a pop claimed the slot before the withdrawal
        slot.wait_for(TAKEN);
        slot.state.store(FREE, Ordering::Release);
        Ok(())
    }

    /// Wait in a free slot for a push to deliver a value.
    fn offer_pop(&self) -> Option<T> {
        let slot = self.random_slot();
        if !slot.cas(FREE, POP_WAITING) {
            return None;
        }

        let backoff = Backoff::new();
        for _ in 0..self.spin_limit {
            if slot.state() == DELIVERED {
                return Some(Self::collect(slot));
            }
            backoff.snooze();
        }
        if slot.cas(POP_WAITING, FREE) {
            return None;
        }
        slot.wait_for(DELIVERED);
        Some(Self::collect(slot))
    }

    fn collect(slot: &EliminationSlot<T>) -> T {
        let v = unsafe { slot.read() };
        slot.state.store(FREE, Ordering::Release);
        v
    }

    /// Number of push/pop pairs resolved through the elimination array.
    pub fn eliminations(&self) -> usize {
        self.eliminated.load(Ordering::Relaxed)
    }

    /// Number of nodes linked in the shared stack, see `LockFreeStack::len`.
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

impl<T: Send> Container<T> for EliminationStack<T> {
    fn push(&self, value: T) {
        EliminationStack::push(self, value)
    }

    fn pop(&self) -> Result<T, EmptyError> {
        EliminationStack::pop(self)
    }

    fn name(&self) -> &'static str {
        "elimination_stack"
    }
}
