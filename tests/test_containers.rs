extern crate crossbeam_utils;
extern crate env_logger;
extern crate lockfree_containers;

use crossbeam_utils::thread;
use lockfree_containers::{
    CombiningQueue, CombiningStack, Container, EliminationConfig, EliminationStack, EmptyError,
    LockFreeQueue, LockFreeStack, LockedQueue, LockedStack,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn stacks<T: Send + 'static>() -> Vec<Box<dyn Container<T>>> {
    vec![
        Box::new(LockedStack::new()),
        Box::new(LockFreeStack::new()),
        Box::new(EliminationStack::new()),
        Box::new(EliminationStack::with_config(EliminationConfig {
            slot_count: 1,
            spin_limit: 16,
        })),
        Box::new(CombiningStack::new()),
    ]
}

fn queues<T: Send + 'static>() -> Vec<Box<dyn Container<T>>> {
    vec![
        Box::new(LockedQueue::new()),
        Box::new(LockFreeQueue::new()),
        Box::new(CombiningQueue::new()),
    ]
}

#[test]
fn test_lifo_law() {
    let _ = env_logger::try_init();
    for c in stacks::<u64>() {
        for i in 0..10 {
            c.push(i);
        }
        for i in (0..10).rev() {
            assert_eq!(c.pop(), Ok(i), "{}", c.name());
        }
        assert_eq!(c.pop(), Err(EmptyError), "{}", c.name());
    }
}

#[test]
fn test_fifo_law() {
    let _ = env_logger::try_init();
    for c in queues::<u64>() {
        for i in 0..10 {
            c.push(i);
        }
        for i in 0..10 {
            assert_eq!(c.pop(), Ok(i), "{}", c.name());
        }
        assert_eq!(c.pop(), Err(EmptyError), "{}", c.name());
    }
}

#[test]
fn test_empty_then_reuse() {
    for c in stacks::<u64>().into_iter().chain(queues()) {
        assert_eq!(c.pop(), Err(EmptyError), "{}", c.name());
        assert_eq!(c.pop(), Err(EmptyError), "{}", c.name());
        c.push(7);
        assert_eq!(c.pop(), Ok(7), "{}", c.name());
        assert_eq!(c.pop(), Err(EmptyError), "{}", c.name());
    }
}

/// Every thread pushes its own range and pops as many times. Whatever was popped plus whatever is
/// left must be exactly the pushed multiset.
fn check_conservation(c: &dyn Container<u64>, thread_num: u64, per_thread: u64) {
    let popped: Vec<Vec<u64>> = thread::scope(|s| {
        let handles: Vec<_> = (0..thread_num)
            .map(|t| {
                s.spawn(move |_| {
                    let mut got = Vec::new();
                    for i in 0..per_thread {
                        c.push(t * per_thread + i);
                        if let Ok(v) = c.pop() {
                            got.push(v);
                        }
                    }
                    got
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
    .unwrap();

    let mut all: Vec<u64> = popped.into_iter().flatten().collect();
    while let Ok(v) = c.pop() {
        all.push(v);
    }
    all.sort();
    let expected: Vec<u64> = (0..thread_num * per_thread).collect();
    assert_eq!(all, expected, "{}", c.name());
}

#[test]
fn test_conservation() {
    let _ = env_logger::try_init();
    for c in stacks::<u64>().into_iter().chain(queues()) {
        check_conservation(c.as_ref(), 4, 5_000);
    }
}

struct Tracked {
    v: u64,
    drops: Arc<AtomicUsize>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Pushes `thread_num * per_thread` elements and pops two of every three while the threads run.
/// Popped elements are dropped at once, the rest with the container. Each must be dropped once.
fn check_drops(c: Box<dyn Container<Tracked>>, drops: &Arc<AtomicUsize>, thread_num: u64) {
    let per_thread = 5_000;
    let name = c.name();
    let popped = AtomicUsize::new(0);
    thread::scope(|s| {
        for t in 0..thread_num {
            let (c, popped) = (c.as_ref(), &popped);
            s.spawn(move |_| {
                for i in 0..per_thread {
                    c.push(Tracked {
                        v: t * per_thread + i,
                        drops: drops.clone(),
                    });
                    if i % 3 != 0 {
                        if let Ok(e) = c.pop() {
                            assert!(e.v < thread_num * per_thread);
                            popped.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            });
        }
    })
    .unwrap();

    let total = (thread_num * per_thread) as usize;
    assert_eq!(drops.load(Ordering::SeqCst), popped.load(Ordering::SeqCst), "{}", name);
    drop(c);
    assert_eq!(drops.load(Ordering::SeqCst), total, "{}", name);
}

#[test]
fn test_drop_exactly_once() {
    let _ = env_logger::try_init();
    for c in stacks::<Tracked>().into_iter().chain(queues()) {
        let drops = Arc::new(AtomicUsize::new(0));
        check_drops(c, &drops, 8);
    }
}
