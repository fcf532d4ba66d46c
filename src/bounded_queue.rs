//! Fixed-capacity blocking FIFO: a ring buffer under one mutex, with producers parked on
//! `not_full` and consumers on `not_empty`.

use crate::epoch_condvar::EpochCondvar;
use crate::error::EmptyError;
use parking_lot::Mutex;

const DEFAULT_CAPACITY: usize = 50;

struct RingBuffer<T> {
    buffer: Box<[Option<T>]>,
    head: usize,
    tail: usize,
    count: usize,
}

impl<T> RingBuffer<T> {
    fn new(capacity: usize) -> RingBuffer<T> {
        RingBuffer {
            buffer: (0..capacity).map(|_| None).collect(),
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.count == self.capacity()
    }

    fn push(&mut self, v: T) {
        debug_assert!(!self.is_full());
        self.buffer[self.tail] = Some(v);
        self.tail = (self.tail + 1) % self.capacity();
        self.count += 1;
    }

    fn pop(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        let v = self.buffer[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.count -= 1;
        v
    }
}

pub struct BoundedQueue<T> {
    inner: Mutex<RingBuffer<T>>,
    not_full: EpochCondvar,
    not_empty: EpochCondvar,
}

impl<T> Default for BoundedQueue<T> {
    fn default() -> Self {
        BoundedQueue::new(DEFAULT_CAPACITY)
    }
}

impl<T> BoundedQueue<T> {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> BoundedQueue<T> {
        assert!(capacity > 0, "capacity must be non-zero");
        BoundedQueue {
            inner: Mutex::new(RingBuffer::new(capacity)),
            not_full: EpochCondvar::new(),
            not_empty: EpochCondvar::new(),
        }
    }

    /// Append `v`, blocking while the queue is full.
    pub fn enqueue(&self, v: T) {
        let mut inner = self.inner.lock();
        while inner.is_full() {
            self.not_full.wait(&mut inner);
        }
        inner.push(v);
        self.not_empty.signal();
    }

    /// Remove the oldest element, blocking while the queue is empty.
    pub fn dequeue(&self) -> T {
        let mut inner = self.inner.lock();
        loop {
            if let Some(v) = inner.pop() {
                self.not_full.signal();
                return v;
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Append `v` unless the queue is full, in which case `v` is handed back.
    pub fn try_enqueue(&self, v: T) -> Result<(), T> {
        let mut inner = self.inner.lock();
        if inner.is_full() {
            return Err(v);
        }
        inner.push(v);
        self.not_empty.signal();
        Ok(())
    }

    pub fn try_dequeue(&self) -> Result<T, EmptyError> {
        let mut inner = self.inner.lock();
        let v = inner.pop().ok_or(EmptyError)?;
        self.not_full.signal();
        Ok(v)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().count
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.inner.lock().is_full()
    }
}
