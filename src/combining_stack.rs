use crate::combining::{FlatCombiner, Request};
use crate::container::Container;
use crate::error::EmptyError;

/// Flat combining stack over a `Vec`.
pub struct CombiningStack<T> {
    combiner: FlatCombiner<Vec<T>>,
}

impl<T> Default for CombiningStack<T> {
    fn default() -> Self {
        CombiningStack::new()
    }
}

impl<T> CombiningStack<T> {
    pub fn new() -> CombiningStack<T> {
        CombiningStack {
            combiner: FlatCombiner::new(),
        }
    }

    pub fn push(&self, v: T) {
        self.combiner.execute(Request::Push(v));
    }

    pub fn pop(&self) -> Result<T, EmptyError> {
        self.combiner.execute(Request::Pop).ok_or(EmptyError)
    }

    pub fn len(&self) -> usize {
        self.combiner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combiner.is_empty()
    }
}

impl<T: Send> Container<T> for CombiningStack<T> {
    fn push(&self, value: T) {
        CombiningStack::push(self, value)
    }

    fn pop(&self) -> Result<T, EmptyError> {
        CombiningStack::pop(self)
    }

    fn name(&self) -> &'static str {
        "combining_stack"
    }
}
