use crate::combining::{FlatCombiner, Request};
use crate::container::Container;
use crate::error::EmptyError;
use std::collections::VecDeque;

/// Flat combining queue over a `VecDeque`.
pub struct CombiningQueue<T> {
    combiner: FlatCombiner<VecDeque<T>>,
}

impl<T> Default for CombiningQueue<T> {
    fn default() -> Self {
        CombiningQueue::new()
    }
}

impl<T> CombiningQueue<T> {
    pub fn new() -> CombiningQueue<T> {
        CombiningQueue {
            combiner: FlatCombiner::new(),
        }
    }

    pub fn enqueue(&self, v: T) {
        self.combiner.execute(Request::Push(v));
    }

    pub fn dequeue(&self) -> Result<T, EmptyError> {
        self.combiner.execute(Request::Pop).ok_or(EmptyError)
    }

    pub fn len(&self) -> usize {
        self.combiner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combiner.is_empty()
    }
}

impl<T: Send> Container<T> for CombiningQueue<T> {
    fn push(&self, value: T) {
        self.enqueue(value)
    }

    fn pop(&self) -> Result<T, EmptyError> {
        self.dequeue()
    }

    fn name(&self) -> &'static str {
        "combining_queue"
    }
}

#[cfg(test)]
mod test {
    use super::CombiningQueue;
    use crate::error::EmptyError;

    #[test]
    fn test_base() {
        let queue = CombiningQueue::new();
        assert_eq!(queue.dequeue(), Err(EmptyError));
        for i in 1..=3 {
            queue.enqueue(i);
        }
        assert_eq!(queue.dequeue(), Ok(1));
        assert_eq!(queue.dequeue(), Ok(2));
        assert_eq!(queue.dequeue(), Ok(3));
        assert!(queue.is_empty());
        assert_eq!(queue.dequeue(), Err(EmptyError));
    }
}
