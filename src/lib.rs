//! Concurrent stacks and queues, from a single global mutex to lock-free algorithms.
//!
//! The crate offers several implementations of the same two abstract containers so they can be
//! compared under contention:
//!
//! * `LockedStack` / `LockedQueue`: one `parking_lot::Mutex` around a `Vec` / `VecDeque`.
//! * `LockFreeStack`: Treiber stack, one CAS-swung `top`.
//! * `LockFreeQueue`: Michael & Scott queue with a sentinel node and tail helping.
//! * `EliminationStack`: `LockFreeStack` plus an elimination array where a push and a pop that
//!   collide exchange the value without touching `top`.
//! * `CombiningStack` / `CombiningQueue`: flat combining, one thread serves the published
//!   requests of all others under a single lock.
//! * `BoundedQueue`: fixed-capacity blocking FIFO built on `EpochCondvar`, a condition variable
//!   that never returns on a spurious wakeup.
//!
//! Nodes unlinked by the lock-free structures are reclaimed through `HazardEpoch`, a practical
//! variant of [`Hazard Pointers`](http://www.cs.otago.ac.nz/cosc440/readings/hazard-pointers.pdf)
//! based on a global incremental version. A node is dropped only once no thread holds a
//! reservation older than its retire version, which also rules out the
//! [`ABA problem`](https://en.wikipedia.org/wiki/ABA_problem) on `top`/`head`.
//!
//! Every unbounded container implements `Container`, `pop` returning `EmptyError` when there is
//! nothing to remove.
//!
//! ```
//! use lockfree_containers::{Container, EliminationStack, LockFreeQueue};
//!
//! let containers: Vec<Box<dyn Container<i32>>> =
//!     vec![Box::new(LockFreeQueue::new()), Box::new(EliminationStack::new())];
//! for c in containers.iter() {
//!     c.push(1);
//!     assert_eq!(c.pop(), Ok(1));
//!     assert!(c.pop().is_err());
//! }
//! ```

#[macro_use]
extern crate log;

#[macro_use]
extern crate cfg_if;

mod hazard_pointer;
pub mod util;
pub mod error;
pub mod hazard_epoch;
pub mod spin_lock;
pub mod container;
pub mod locked_stack;
pub mod locked_queue;
pub mod lockfree_stack;
pub mod lockfree_queue;
pub mod elimination_stack;
pub mod combining;
pub mod combining_stack;
pub mod combining_queue;
pub mod epoch_condvar;
pub mod bounded_queue;

pub use crate::bounded_queue::BoundedQueue;
pub use crate::combining_queue::CombiningQueue;
pub use crate::combining_stack::CombiningStack;
pub use crate::container::Container;
pub use crate::elimination_stack::{EliminationConfig, EliminationStack};
pub use crate::epoch_condvar::EpochCondvar;
pub use crate::error::{EmptyError, Status};
pub use crate::hazard_epoch::HazardEpoch;
pub use crate::locked_queue::LockedQueue;
pub use crate::locked_stack::LockedStack;
pub use crate::lockfree_queue::LockFreeQueue;
pub use crate::lockfree_stack::LockFreeStack;
