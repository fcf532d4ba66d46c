//! Flat combining: threads publish requests in per-thread slots and whichever thread wins the
//! combiner lock serves every published request against a plain sequential container.

use crate::spin_lock::SpinLock;
use crate::util::{self, WrappedAlign64Type, MAX_THREAD_COUNT};
use crossbeam_utils::Backoff;
use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};

/// Sequential container driven by a combiner. Only ever accessed under the combiner lock.
pub trait Sequential: Default {
    type Item;

    fn insert(&mut self, value: Self::Item);

    fn remove(&mut self) -> Option<Self::Item>;

    fn len(&self) -> usize;
}

/// LIFO
impl<T> Sequential for Vec<T> {
    type Item = T;

    fn insert(&mut self, value: T) {
        self.push(value);
    }

    fn remove(&mut self) -> Option<T> {
        self.pop()
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }
}

/// FIFO
impl<T> Sequential for VecDeque<T> {
    type Item = T;

    fn insert(&mut self, value: T) {
        self.push_back(value);
    }

    fn remove(&mut self) -> Option<T> {
        self.pop_front()
    }

    fn len(&self) -> usize {
        VecDeque::len(self)
    }
}

// Operation tag and completion flag share one word: IDLE -> *_PENDING (owner), *_PENDING -> DONE
// (combiner), DONE -> IDLE (owner).
const IDLE: u8 = 0;
const PUSH_PENDING: u8 = 1;
const POP_PENDING: u8 = 2;
const DONE: u8 = 3;

/// `operand` and `result` are handed over through the Release/Acquire edges on `state`.
struct CombinerSlot<T> {
    state: AtomicU8,
    operand: UnsafeCell<Option<T>>,
    result: UnsafeCell<Option<T>>,
}

impl<T> Default for CombinerSlot<T> {
    fn default() -> Self {
        CombinerSlot {
            state: AtomicU8::new(IDLE),
            operand: UnsafeCell::new(None),
            result: UnsafeCell::new(None),
        }
    }
}

pub enum Request<T> {
    Push(T),
    Pop,
}

pub struct FlatCombiner<S: Sequential> {
    lock: WrappedAlign64Type<SpinLock>,
    data: UnsafeCell<S>,
    slots: Box<[WrappedAlign64Type<CombinerSlot<S::Item>>]>,
}

unsafe impl<S> Send for FlatCombiner<S>
where
    S: Sequential + Send,
    S::Item: Send,
{
}

unsafe impl<S> Sync for FlatCombiner<S>
where
    S: Sequential + Send,
    S::Item: Send,
{
}

impl<S: Sequential> Default for FlatCombiner<S> {
    fn default() -> Self {
        FlatCombiner::new()
    }
}

impl<S: Sequential> FlatCombiner<S> {
    pub fn new() -> FlatCombiner<S> {
        FlatCombiner {
            lock: WrappedAlign64Type(SpinLock::default()),
            data: UnsafeCell::new(S::default()),
            slots: (0..MAX_THREAD_COUNT)
                .map(|_| WrappedAlign64Type(CombinerSlot::default()))
                .collect(),
        }
    }

    /// Publish `request` in the slot of the calling thread and wait until a combiner has served
    /// it. Returns the removed element of a `Pop`, `None` if the container was empty.
    pub fn execute(&self, request: Request<S::Item>) -> Option<S::Item> {
        let slot = &self.slots[util::get_thread_id()];
        let tag = match request {
            Request::Push(v) => {
                unsafe { *slot.operand.get() = Some(v) };
                PUSH_PENDING
            }
            Request::Pop => POP_PENDING,
        };
        slot.state.store(tag, Ordering::Release);

        let backoff = Backoff::new();
        while slot.state.load(Ordering::Acquire) != DONE {
            // keep competing for the lock, a combiner may have scanned past this slot already
            if let Some(_guard) = self.lock.try_lock_guard() {
                self.combine();
            } else {
                backoff.snooze();
            }
        }

        let result = unsafe { (*slot.result.get()).take() };
        slot.state.store(IDLE, Ordering::Release);
        result
    }

    /// Serve every pending request in slot order. Must be called with `lock` held.
    fn combine(&self) {
        let data = unsafe { &mut *self.data.get() };
        let limit = util::thread_id_high_water().min(self.slots.len());
        let mut served = 0;
        for slot in self.slots[..limit].iter() {
            match slot.state.load(Ordering::Acquire) {
                PUSH_PENDING => {
                    if let Some(v) = unsafe { (*slot.operand.get()).take() } {
                        data.insert(v);
                    }
                    slot.state.store(DONE, Ordering::Release);
                    served += 1;
                }
                POP_PENDING => {
                    unsafe { *slot.result.get() = data.remove() };
                    slot.state.store(DONE, Ordering::Release);
                    served += 1;
                }
                _ => {}
            }
        }
        trace!("combine pass served={}, len={}", served, data.len());
    }

    pub fn len(&self) -> usize {
        let _guard = self.lock.lock_guard();
        unsafe { (*self.data.get()).len() }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_sequential_orders() {
        let lifo = FlatCombiner::<Vec<i32>>::new();
        let fifo = FlatCombiner::<VecDeque<i32>>::new();
        for i in 0..3 {
            assert_eq!(lifo.execute(Request::Push(i)), None);
            assert_eq!(fifo.execute(Request::Push(i)), None);
        }
        assert_eq!(lifo.len(), 3);
        assert_eq!(lifo.execute(Request::Pop), Some(2));
        assert_eq!(fifo.execute(Request::Pop), Some(0));
    }

    #[test]
    fn test_empty_pop_leaves_no_stale_result() {
        let fc = FlatCombiner::<Vec<i32>>::new();
        fc.execute(Request::Push(9));
        assert_eq!(fc.execute(Request::Pop), Some(9));
        assert_eq!(fc.execute(Request::Pop), None);
        assert_eq!(fc.execute(Request::Pop), None);
        assert!(fc.is_empty());
    }

    #[test]
    fn test_served_while_lock_held() {
        use std::sync::atomic::AtomicBool;

        let fc = Arc::new(FlatCombiner::<Vec<i32>>::new());
        let finished = Arc::new(AtomicBool::new(false));
        let guard = fc.lock.lock_guard();
        let worker = {
            let fc = fc.clone();
            let finished = finished.clone();
            thread::spawn(move || {
                let ret = fc.execute(Request::Push(5));
                finished.store(true, Ordering::SeqCst);
                ret
            })
        };
        // the worker has published its request but cannot combine
        thread::sleep(std::time::Duration::from_millis(50));
        assert!(!finished.load(Ordering::SeqCst));
        drop(guard);
        assert_eq!(worker.join().unwrap(), None);
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(fc.execute(Request::Pop), Some(5));
    }
}
