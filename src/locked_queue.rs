use crate::container::Container;
use crate::error::EmptyError;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Baseline FIFO, every operation runs under one global mutex.
pub struct LockedQueue<T> {
    data: Mutex<VecDeque<T>>,
}

impl<T> Default for LockedQueue<T> {
    fn default() -> Self {
        LockedQueue::new()
    }
}

impl<T> LockedQueue<T> {
    pub fn new() -> LockedQueue<T> {
        LockedQueue {
            data: Mutex::new(VecDeque::new()),
        }
    }

    pub fn enqueue(&self, v: T) {
        self.data.lock().push_back(v);
    }

    pub fn dequeue(&self) -> Result<T, EmptyError> {
        self.data.lock().pop_front().ok_or(EmptyError)
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}

impl<T: Send> Container<T> for LockedQueue<T> {
    fn push(&self, value: T) {
        self.enqueue(value)
    }

    fn pop(&self) -> Result<T, EmptyError> {
        self.dequeue()
    }

    fn name(&self) -> &'static str {
        "locked_queue"
    }
}
