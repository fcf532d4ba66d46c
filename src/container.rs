//! Contract shared by every unbounded container of this crate.

use crate::error::EmptyError;

/// A sequential container with concurrent access: any number of threads may call `push` and `pop`
/// on a shared reference at the same time.
///
/// For stacks `pop` returns the most recently pushed element, for queues the oldest one. Queues
/// implement it with `push = enqueue` and `pop = dequeue`.
pub trait Container<T>: Send + Sync {
    /// Insert `value`. Never fails.
    fn push(&self, value: T);

    /// Remove one element, or `EmptyError` if there is none at the moment of the call.
    fn pop(&self) -> Result<T, EmptyError>;

    /// Short name of the implementation, used in logs and reports.
    fn name(&self) -> &'static str;
}
