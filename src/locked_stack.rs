use crate::container::Container;
use crate::error::EmptyError;
use parking_lot::Mutex;

/// Baseline LIFO, every operation runs under one global mutex.
pub struct LockedStack<T> {
    data: Mutex<Vec<T>>,
}

impl<T> Default for LockedStack<T> {
    fn default() -> Self {
        LockedStack::new()
    }
}

impl<T> LockedStack<T> {
    pub fn new() -> LockedStack<T> {
        LockedStack {
            data: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, v: T) {
        self.data.lock().push(v);
    }

    pub fn pop(&self) -> Result<T, EmptyError> {
        self.data.lock().pop().ok_or(EmptyError)
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}

impl<T: Send> Container<T> for LockedStack<T> {
    fn push(&self, value: T) {
        LockedStack::push(self, value)
    }

    fn pop(&self) -> Result<T, EmptyError> {
        LockedStack::pop(self)
    }

    fn name(&self) -> &'static str {
        "locked_stack"
    }
}

#[cfg(test)]
mod test {
    use super::LockedStack;
    use crate::error::EmptyError;

    #[test]
    fn test_base() {
        let stack = LockedStack::new();
        assert_eq!(stack.pop(), Err(EmptyError));
        stack.push(1);
        stack.push(2);
        stack.push(3);
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.pop(), Ok(3));
        assert_eq!(stack.pop(), Ok(2));
        assert_eq!(stack.pop(), Ok(1));
        assert!(stack.is_empty());
        assert_eq!(stack.pop(), Err(EmptyError));
    }
}
