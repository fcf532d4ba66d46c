extern crate core_affinity;
extern crate env_logger;
extern crate lockfree_containers;

use lockfree_containers::error::Status;
use lockfree_containers::hazard_epoch::{BaseHazardNode, HazardEpoch, HazardNodeT};
use lockfree_containers::util;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicPtr, Ordering};
use std::sync::Arc;
use std::thread;
use std::time;

struct TestObj {
    base: BaseHazardNode,
    cnt: Arc<AtomicI64>,
    data: Option<i32>,
}

impl PartialEq for TestObj {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl HazardNodeT for TestObj {
    unsafe fn get_base_hazard_node(node: *mut Self) -> *mut BaseHazardNode {
        &mut (*node).base
    }
}

impl Drop for TestObj {
    fn drop(&mut self) {
        // a second drop would panic here
        self.data.take().unwrap();
        self.cnt.fetch_sub(1, Ordering::SeqCst);
    }
}

impl TestObj {
    fn new(cnt: &Arc<AtomicI64>) -> TestObj {
        cnt.fetch_add(1, Ordering::SeqCst);
        TestObj {
            base: BaseHazardNode::default(),
            cnt: cnt.clone(),
            data: Some(0),
        }
    }

    fn new_raw(cnt: &Arc<AtomicI64>) -> *mut TestObj {
        Box::into_raw(Box::new(TestObj::new(cnt)))
    }
}

struct GlobalConf {
    stop: AtomicBool,
    cnt: Arc<AtomicI64>,
    read_loops: i64,
    write_loops: i64,
    v: AtomicPtr<TestObj>,
    h: HazardEpoch,
}

fn set_cpu_affinity() {
    if let Some(cpus) = core_affinity::get_core_ids() {
        let tid = util::get_thread_id();
        core_affinity::set_for_current(cpus[tid % cpus.len()]);
        println!("set_cpu_affinity {} {}", tid, tid % cpus.len());
    }
}

fn read_thread_func(global_conf: &GlobalConf) {
    set_cpu_affinity();
    let checker = TestObj::new(&global_conf.cnt);
    for _ in 0..global_conf.read_loops {
        let handle = global_conf.h.acquire();
        let v = global_conf.v.load(Ordering::Acquire);
        assert!(unsafe { &*v } == &checker);
        assert_eq!(global_conf.h.release(handle), Status::Success);
    }
}

fn write_thread_func(global_conf: &GlobalConf) {
    set_cpu_affinity();
    for _ in 0..global_conf.write_loops {
        let v = TestObj::new_raw(&global_conf.cnt);
        let old = global_conf.v.swap(v, Ordering::AcqRel);
        assert_eq!(unsafe { global_conf.h.add_node(old) }, Status::Success);
    }
}

fn debug_thread_func(global_conf: &GlobalConf) {
    while !global_conf.stop.load(Ordering::Acquire) {
        println!(
            "hazard_waiting_count={}",
            global_conf.h.atomic_load_hazard_waiting_count()
        );
        thread::sleep(time::Duration::from_millis(100));
    }
}

#[test]
fn test_multi_thread() {
    let _ = env_logger::try_init();

    let cpu_count = core_affinity::get_core_ids().map_or(2, |ids| ids.len()).min(8);
    let read_count = (cpu_count + 1) / 2;
    let write_count = (cpu_count + 1) / 2;
    println!("read thread {}, write thread {}", read_count, write_count);

    let cnt = Arc::new(AtomicI64::new(0));
    let loops = 50_000;
    let global_conf = Arc::new(GlobalConf {
        stop: AtomicBool::new(false),
        cnt: cnt.clone(),
        read_loops: loops,
        write_loops: loops,
        v: AtomicPtr::new(TestObj::new_raw(&cnt)),
        h: HazardEpoch::default(),
    });

    let dpd = {
        let global_conf = global_conf.clone();
        thread::spawn(move || debug_thread_func(&global_conf))
    };
    let mut rpd = vec![];
    let mut wpd = vec![];
    for _ in 0..read_count {
        let global_conf = global_conf.clone();
        rpd.push(thread::spawn(move || read_thread_func(&global_conf)));
    }
    for _ in 0..write_count {
        let global_conf = global_conf.clone();
        wpd.push(thread::spawn(move || write_thread_func(&global_conf)));
    }
    for t in rpd {
        t.join().unwrap();
    }
    println!("read threads joined");
    for t in wpd {
        t.join().unwrap();
    }
    println!("write threads joined");

    global_conf.stop.store(true, Ordering::Release);
    dpd.join().unwrap();

    let global_conf = Arc::try_unwrap(global_conf).ok().unwrap();
    global_conf.h.retire();
    assert_eq!(global_conf.h.atomic_load_hazard_waiting_count(), 0);
    unsafe { drop(Box::from_raw(global_conf.v.load(Ordering::Acquire))) };
    drop(global_conf);
    assert_eq!(0, cnt.load(Ordering::SeqCst));
}

#[test]
fn test_base() {
    let _ = env_logger::try_init();

    let he = HazardEpoch::default();
    let cnt = Arc::new(AtomicI64::new(0));

    let handle = he.acquire();
    for i in 0..64i64 {
        let ret = unsafe { he.add_node(TestObj::new_raw(&cnt)) };
        assert_eq!(Status::Success, ret);
        assert_eq!(i + 1, cnt.load(Ordering::SeqCst));
    }
    he.retire();
    assert_eq!(cnt.load(Ordering::SeqCst), 64);
    assert_eq!(he.release(handle), Status::Success);
    he.retire();
    assert_eq!(cnt.load(Ordering::SeqCst), 0);

    for i in 0..32i64 {
        assert_eq!(
            unsafe { he.add_node(TestObj::new_raw(&cnt)) },
            Status::Success
        );
        assert_eq!(cnt.load(Ordering::SeqCst), i + 1);
    }

    let handle = he.acquire();
    for i in 32..64i64 {
        let ret = unsafe { he.add_node(TestObj::new_raw(&cnt)) };
        assert_eq!(Status::Success, ret);
        assert_eq!(i + 1, cnt.load(Ordering::SeqCst));
    }
    he.retire();
    assert_eq!(32, cnt.load(Ordering::SeqCst));
    assert_eq!(he.release(handle), Status::Success);
    he.retire();
    assert_eq!(cnt.load(Ordering::SeqCst), 0);

    for _ in 0..2 {
        let outer = he.acquire();
        let inner = he.acquire();
        assert_eq!(he.release(inner), Status::Success);
        assert_eq!(he.release(outer), Status::Success);
        // the reservation has ended, the handle is stale
        assert_eq!(he.release(outer), Status::InvalidParam);
    }
}

#[test]
fn test_drop_reclaims_waiting() {
    let cnt = Arc::new(AtomicI64::new(0));
    {
        let he = HazardEpoch::default();
        let _guard = he.pin();
        for _ in 0..16 {
            unsafe { he.add_node(TestObj::new_raw(&cnt)) };
        }
        assert_eq!(cnt.load(Ordering::SeqCst), 16);
        drop(_guard);
    }
    assert_eq!(cnt.load(Ordering::SeqCst), 0);
}
