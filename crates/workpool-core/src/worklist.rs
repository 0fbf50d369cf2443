//! The bounded, concurrent FIFO ring at the heart of the pool.
//!
//! Grounded on `examples/original_source/hthpool.c`'s `worklist_*`
//! functions: two mutexes (one per side of the ring), two condvars, a
//! `stop` flag, and saturation-episode counters (`adding`/`taking`) that
//! fire an at-most-once-per-episode event when every expected producer
//! (resp. consumer) is blocked.
//!
//! The ring itself is `qsize = capacity + 2` slots long — two sentinel
//! positions so that "full" and "empty" are distinguishable purely from
//! the head/tail indices, with no separate length counter to keep in sync.

use std::cell::{Cell, UnsafeCell};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, RwLock};

use crate::error::{WorkPoolError, WorkPoolResult};
use crate::item::{SaturationEvent, WorkItem};
use crate::{wp_debug, wp_trace};

/// Which of the two ring-side mutexes, if any, the current thread is
/// already holding while it is inside a saturation-event callback.
///
/// `add`'s `full_event` runs with `head_lock` held (the opposite side's
/// mutex, per spec.md §4.1); `take`'s `empty_event` runs with `tail_lock`
/// held. A host event is allowed to call back into `hard_stop`/`stop`
/// (spec.md §8 scenario 3), and `Worklist::stop` would otherwise try to
/// re-lock whichever mutex this same thread already holds — `std::sync::
/// Mutex` isn't reentrant, so that second lock call would hang the
/// calling thread (and with it anything joining it) forever. This
/// thread-local lets `stop` notice it and skip the lock it already owns.
thread_local! {
    static HELD_SIDE: Cell<Option<Side>> = const { Cell::new(None) };
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Head,
    Tail,
}

/// Runs `f` while marking the current thread as already holding `side`'s
/// mutex, restoring the previous marker afterwards (events don't nest in
/// practice, but this stays correct if a future host ever layers them).
fn with_held_side<T>(side: Side, f: impl FnOnce() -> T) -> T {
    let previous = HELD_SIDE.with(|h| h.replace(Some(side)));
    let result = f();
    HELD_SIDE.with(|h| h.set(previous));
    result
}

/// Default ring capacity when the host passes `0` to `Worklist::init`,
/// mirroring the C original's `DEFAULT_SIZE` fallback in `worklist_init`.
pub const DEFAULT_CAPACITY: usize = 256;

/// Construction-time tunables for a `Worklist` (spec.md §4.1 `init`).
///
/// `empty_event`/`full_event` here are only the *initial* registration —
/// `register` (spec.md §6.1) may be called again later while the pool is
/// `Paused`, which goes through `Worklist::set_events` instead.
#[derive(Clone, Default)]
pub struct WorklistAttr {
    /// Saturation events are armed only when this is `true`.
    pub trigger: bool,
    /// Expected number of concurrent producers/consumers — in practice
    /// always the worker count `N`, filled in by `PoolController::create`
    /// (the original's `thread_num` plays the same role for
    /// `MAX_CONCURRENCY`). `0` means "never fires".
    pub concurrency: usize,
    pub empty_event: Option<SaturationEvent>,
    pub full_event: Option<SaturationEvent>,
    /// When set, a producer/consumer that would become the
    /// `concurrency`-th blocked party returns `Busy` instead of waiting.
    /// See DESIGN.md's Open Question resolution for the `Busy` error kind.
    pub drop_on_saturation: bool,
}

impl WorklistAttr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm both saturation events with the given expected concurrency. A
    /// `None` side falls back to a no-op, mirroring `hthpool_register`
    /// substituting `_wl_dry_run` for a `NULL` callback.
    pub fn with_events(
        concurrency: usize,
        empty_event: Option<SaturationEvent>,
        full_event: Option<SaturationEvent>,
    ) -> Self {
        Self {
            trigger: true,
            concurrency,
            empty_event: Some(empty_event.unwrap_or_else(SaturationEvent::noop)),
            full_event: Some(full_event.unwrap_or_else(SaturationEvent::noop)),
            drop_on_saturation: false,
        }
    }
}

struct RingSlot {
    cell: UnsafeCell<Option<WorkItem>>,
}

impl RingSlot {
    fn empty() -> Self {
        RingSlot { cell: UnsafeCell::new(None) }
    }
}

// Safety: a slot is written only by the single producer holding
// `tail_lock` at the `tail` index, and read only by the single consumer
// holding `head_lock` at `(head + 1) % qsize` — the ring's full/empty
// invariants (enforced by the two sides' mutexes and the atomics below)
// guarantee those two indices never coincide while both sides are live.
unsafe impl Send for RingSlot {}
unsafe impl Sync for RingSlot {}

/// The bounded FIFO described in spec.md §4.1.
pub struct Worklist {
    ring: Box<[RingSlot]>,
    qsize: usize,
    // Written only from `take` (under `head_lock`); read from `add`
    // without holding `head_lock` to test the full predicate.
    head: AtomicUsize,
    // Written only from `add` (under `tail_lock`); read from `take`
    // without holding `tail_lock` to test the empty predicate.
    tail: AtomicUsize,
    // Guards the producer-side critical section (checking full, waiting,
    // writing `queue[tail]`, advancing `tail`) and holds the `adding`
    // saturation counter.
    tail_lock: Mutex<usize>,
    // Guards the consumer-side critical section and holds `taking`.
    head_lock: Mutex<usize>,
    cond_nonempty: Condvar,
    cond_nonfull: Condvar,
    stop: AtomicBool,
    trigger: AtomicBool,
    concurrency: usize,
    drop_on_saturation: bool,
    empty_event: RwLock<Option<SaturationEvent>>,
    full_event: RwLock<Option<SaturationEvent>>,
}

impl Worklist {
    /// `init(capacity, attr)` from spec.md §4.1.
    pub fn init(capacity: usize, attr: WorklistAttr) -> WorkPoolResult<Self> {
        let capacity = if capacity == 0 { DEFAULT_CAPACITY } else { capacity };
        let qsize = capacity
            .checked_add(2)
            .ok_or(WorkPoolError::AllocError)?;
        let mut ring = Vec::new();
        ring.try_reserve_exact(qsize).map_err(|_| WorkPoolError::AllocError)?;
        ring.resize_with(qsize, RingSlot::empty);

        Ok(Worklist {
            ring: ring.into_boxed_slice(),
            qsize,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(1),
            tail_lock: Mutex::new(0),
            head_lock: Mutex::new(0),
            cond_nonempty: Condvar::new(),
            cond_nonfull: Condvar::new(),
            stop: AtomicBool::new(false),
            trigger: AtomicBool::new(attr.trigger),
            concurrency: attr.concurrency,
            drop_on_saturation: attr.drop_on_saturation,
            empty_event: RwLock::new(attr.empty_event),
            full_event: RwLock::new(attr.full_event),
        })
    }

    /// (Re-)register saturation events, arming `trigger`. Valid any time
    /// no saturation episode is in progress — in practice, before
    /// `create` or while the pool is `Paused` before `continue_`
    /// (spec.md §6.1), enforced by the caller (`PoolController`).
    pub fn set_events(&self, empty_event: Option<SaturationEvent>, full_event: Option<SaturationEvent>) {
        *self.empty_event.write().unwrap() = Some(empty_event.unwrap_or_else(SaturationEvent::noop));
        *self.full_event.write().unwrap() = Some(full_event.unwrap_or_else(SaturationEvent::noop));
        self.trigger.store(true, Ordering::Release);
    }

    #[inline]
    fn is_full(&self, tail: usize, head: usize) -> bool {
        (tail + 1) % self.qsize == head
    }

    #[inline]
    fn is_empty(&self, head: usize, tail: usize) -> bool {
        (head + 1) % self.qsize == tail
    }

    /// Blocking enqueue (spec.md §4.1 `add`).
    pub fn add(&self, item: WorkItem) -> WorkPoolResult<()> {
        let mut adding = self.tail_lock.lock().unwrap();
        let mut registered = false;
        let tail = loop {
            let tail = self.tail.load(Ordering::Relaxed);
            let head = self.head.load(Ordering::Acquire);
            if !self.is_full(tail, head) {
                break tail;
            }
            if self.stop.load(Ordering::Acquire) {
                if registered {
                    *adding -= 1;
                }
                return Err(WorkPoolError::Stopped);
            }
            if !registered {
                registered = true;
                *adding += 1;
                let saturated = *adding == self.concurrency;
                let fired = saturated && self.trigger.load(Ordering::Acquire);
                if fired {
                    wp_debug!("worklist saturated full, firing full_event");
                    // Release tail, acquire head, call, release head,
                    // reacquire tail (spec.md §4.1) — lets a symmetric
                    // `take` unblocked by the event proceed without
                    // deadlocking on the mutex the event is invoked under.
                    drop(adding);
                    {
                        let _head_guard = self.head_lock.lock().unwrap();
                        with_held_side(Side::Head, || {
                            if let Some(ev) = self.full_event.read().unwrap().as_ref() {
                                ev.call();
                            }
                        });
                    }
                    adding = self.tail_lock.lock().unwrap();
                }
                // Independent of whether the event fired: the triggering
                // producer is dropped with `Busy` when configured to, same
                // episode, same producer (see DESIGN.md's Open Question 3).
                if saturated && self.drop_on_saturation {
                    *adding -= 1;
                    return Err(WorkPoolError::Busy);
                }
                if fired {
                    continue;
                }
            }
            adding = self.cond_nonfull.wait(adding).unwrap();
        };
        if registered {
            *adding -= 1;
        }
        // Safety: sole writer of this slot; see `RingSlot`'s Safety note.
        unsafe {
            *self.ring[tail].cell.get() = Some(item);
        }
        self.tail.store((tail + 1) % self.qsize, Ordering::Release);
        drop(adding);
        self.cond_nonempty.notify_one();
        Ok(())
    }

    /// Blocking dequeue (spec.md §4.1 `take`). Returns `WorkItem::empty()`
    /// rather than an error when aborted by `stop` — see spec.md §7.
    pub fn take(&self) -> WorkItem {
        let mut taking = self.head_lock.lock().unwrap();
        let mut registered = false;
        let head = loop {
            let head = self.head.load(Ordering::Relaxed);
            let tail = self.tail.load(Ordering::Acquire);
            if !self.is_empty(head, tail) {
                break head;
            }
            if !registered {
                registered = true;
                *taking += 1;
                if self.trigger.load(Ordering::Acquire) && *taking == self.concurrency {
                    wp_debug!("worklist saturated empty, firing empty_event");
                    drop(taking);
                    {
                        let _tail_guard = self.tail_lock.lock().unwrap();
                        with_held_side(Side::Tail, || {
                            if let Some(ev) = self.empty_event.read().unwrap().as_ref() {
                                ev.call();
                            }
                        });
                    }
                    taking = self.head_lock.lock().unwrap();
                    continue;
                }
            }
            if self.stop.load(Ordering::Acquire) {
                if registered {
                    *taking -= 1;
                }
                return WorkItem::empty();
            }
            taking = self.cond_nonempty.wait(taking).unwrap();
        };
        if registered {
            *taking -= 1;
        }
        let idx = (head + 1) % self.qsize;
        // Safety: sole reader of this slot; see `RingSlot`'s Safety note.
        let item = unsafe { (*self.ring[idx].cell.get()).take() }
            .unwrap_or_else(WorkItem::empty);
        self.head.store(idx, Ordering::Release);
        drop(taking);
        self.cond_nonfull.notify_one();
        item
    }

    /// Set the stop flag and release every waiter on both sides
    /// (spec.md §4.1 `stop`). Mutexes are acquired head-before-tail and
    /// released the same way, matching `hthpool.c`'s `worklist_stop`.
    ///
    /// A registered `empty_event`/`full_event` is allowed to call this
    /// from inside itself (spec.md §8 scenario 3's `empty_event` that
    /// calls `hard_stop`) — at that point the calling thread already
    /// holds one side's mutex (see `HELD_SIDE`), so this only locks the
    /// side it doesn't already own instead of re-locking both and
    /// deadlocking on itself.
    pub fn stop(&self) {
        match HELD_SIDE.with(Cell::get) {
            Some(Side::Head) => {
                let tail_guard = self.tail_lock.lock().unwrap();
                self.stop.store(true, Ordering::Release);
                drop(tail_guard);
            }
            Some(Side::Tail) => {
                let head_guard = self.head_lock.lock().unwrap();
                self.stop.store(true, Ordering::Release);
                drop(head_guard);
            }
            None => {
                let head_guard = self.head_lock.lock().unwrap();
                let tail_guard = self.tail_lock.lock().unwrap();
                self.stop.store(true, Ordering::Release);
                drop(tail_guard);
                drop(head_guard);
            }
        }
        self.cond_nonfull.notify_all();
        self.cond_nonempty.notify_all();
        wp_trace!("worklist stop broadcast");
    }

    /// Whether the worklist is currently in stop state.
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Reset indices and counters and clear stored items. Caller must
    /// guarantee no concurrent `add`/`take` (spec.md §4.1 precondition) —
    /// in practice this means the controller only calls it from
    /// `continue_` after `wait()` has returned.
    ///
    /// Acquires `head_lock` before `tail_lock`, matching `stop()`'s
    /// head-before-tail order — `WorkPool::destroy()` and
    /// `WorkPool::continue_()` are both callable while `Paused` and reach
    /// `stop()`/`reset()` through independent `RwLock` read guards with no
    /// other serialization between them, so the two methods locking in
    /// opposite orders would be a real lock-order inversion.
    pub fn reset(&self) {
        let mut taking = self.head_lock.lock().unwrap();
        let mut adding = self.tail_lock.lock().unwrap();
        *adding = 0;
        *taking = 0;
        self.head.store(0, Ordering::Relaxed);
        self.tail.store(1, Ordering::Relaxed);
        self.stop.store(false, Ordering::Relaxed);
        for slot in self.ring.iter() {
            // Safety: no concurrent accessor per this method's precondition.
            unsafe {
                *slot.cell.get() = None;
            }
        }
    }

    /// Release ring storage and synchronization primitives. Precondition:
    /// no thread is parked on this worklist. In Rust this is simply
    /// `Drop`; the method exists for parity with spec.md's operation list.
    pub fn destroy(self) {}

    /// Configured capacity (excluding the two sentinel slots).
    pub fn capacity(&self) -> usize {
        self.qsize - 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    fn counting_item(counter: &Arc<AtomicUsize>) -> WorkItem {
        let c = counter.clone();
        WorkItem::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn fifo_within_single_producer() {
        let wl = Worklist::init(8, WorklistAttr::new()).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = order.clone();
            wl.add(WorkItem::new(move || order.lock().unwrap().push(i))).unwrap();
        }
        for _ in 0..5 {
            wl.take().run();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn add_blocks_until_capacity_frees_up() {
        let wl = Arc::new(Worklist::init(1, WorklistAttr::new()).unwrap());
        let counter = Arc::new(AtomicUsize::new(0));
        wl.add(counting_item(&counter)).unwrap();

        let wl2 = wl.clone();
        let counter2 = counter.clone();
        let handle = thread::spawn(move || {
            wl2.add(counting_item(&counter2)).unwrap();
        });

        // Give the second add a chance to actually block.
        thread::sleep(std::time::Duration::from_millis(50));
        assert!(!handle.is_finished());

        wl.take().run();
        handle.join().unwrap();
        wl.take().run();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stop_releases_blocked_take_with_empty_item() {
        let wl = Arc::new(Worklist::init(4, WorklistAttr::new()).unwrap());
        let wl2 = wl.clone();
        let handle = thread::spawn(move || wl2.take());
        thread::sleep(std::time::Duration::from_millis(50));
        wl.stop();
        let item = handle.join().unwrap();
        // Must not panic; the empty item is a no-op.
        item.run();
    }

    #[test]
    fn add_after_stop_returns_stopped() {
        let wl = Worklist::init(4, WorklistAttr::new()).unwrap();
        wl.stop();
        let err = wl.add(WorkItem::empty()).unwrap_err();
        assert!(matches!(err, WorkPoolError::Stopped));
    }

    #[test]
    fn capacity_bound_is_never_exceeded() {
        let wl = Arc::new(Worklist::init(3, WorklistAttr::new()).unwrap());
        for _ in 0..3 {
            wl.add(WorkItem::empty()).unwrap();
        }
        // A 4th add would block; prove it does by racing it against a stop.
        let wl2 = wl.clone();
        let handle = thread::spawn(move || wl2.add(WorkItem::empty()));
        thread::sleep(std::time::Duration::from_millis(50));
        assert!(!handle.is_finished());
        wl.stop();
        assert!(matches!(handle.join().unwrap(), Err(WorkPoolError::Stopped)));
    }

    #[test]
    fn drop_on_saturation_returns_busy_without_blocking() {
        let attr = WorklistAttr { concurrency: 1, drop_on_saturation: true, ..WorklistAttr::new() };
        let wl = Worklist::init(1, attr).unwrap();
        wl.add(WorkItem::empty()).unwrap();
        // The ring is now full; this producer becomes the `concurrency`-th
        // blocked party and must return `Busy` immediately instead of
        // parking on `cond_nonfull`.
        let err = wl.add(WorkItem::empty()).unwrap_err();
        assert!(matches!(err, WorkPoolError::Busy));
    }

    #[test]
    fn drop_on_saturation_and_full_event_both_fire_for_the_triggering_producer() {
        let fire_count = Arc::new(AtomicUsize::new(0));
        let fc = fire_count.clone();
        let attr = WorklistAttr {
            trigger: true,
            concurrency: 1,
            empty_event: Some(SaturationEvent::noop()),
            full_event: Some(SaturationEvent::new(move || {
                fc.fetch_add(1, Ordering::SeqCst);
            })),
            drop_on_saturation: true,
        };
        let wl = Worklist::init(1, attr).unwrap();
        wl.add(WorkItem::empty()).unwrap();

        let err = wl.add(WorkItem::empty()).unwrap_err();
        assert!(matches!(err, WorkPoolError::Busy));
        assert_eq!(fire_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn full_event_fires_exactly_once_per_episode() {
        let fire_count = Arc::new(AtomicUsize::new(0));
        let fc = fire_count.clone();
        let attr = WorklistAttr::with_events(
            1,
            None,
            Some(SaturationEvent::new(move || {
                fc.fetch_add(1, Ordering::SeqCst);
            })),
        );
        let wl = Arc::new(Worklist::init(1, attr).unwrap());
        wl.add(WorkItem::empty()).unwrap();

        let wl2 = wl.clone();
        let handle = thread::spawn(move || wl2.add(WorkItem::empty()));
        thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(fire_count.load(Ordering::SeqCst), 1);

        wl.take().run();
        handle.join().unwrap();
        assert_eq!(fire_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_event_fires_exactly_once_per_episode() {
        let fire_count = Arc::new(AtomicUsize::new(0));
        let fc = fire_count.clone();
        let attr = WorklistAttr::with_events(
            1,
            Some(SaturationEvent::new(move || {
                fc.fetch_add(1, Ordering::SeqCst);
            })),
            None,
        );
        let wl = Arc::new(Worklist::init(4, attr).unwrap());

        let wl2 = wl.clone();
        let handle = thread::spawn(move || wl2.take());
        thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(fire_count.load(Ordering::SeqCst), 1);

        wl.add(WorkItem::empty()).unwrap();
        handle.join().unwrap().run();
        assert_eq!(fire_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_clears_indices_and_status() {
        let wl = Worklist::init(4, WorklistAttr::new()).unwrap();
        wl.add(WorkItem::empty()).unwrap();
        wl.stop();
        wl.reset();
        assert!(!wl.is_stopped());
        // Ring should be fully usable again up to capacity.
        for _ in 0..4 {
            wl.add(WorkItem::empty()).unwrap();
        }
    }

    #[test]
    fn zero_capacity_falls_back_to_default() {
        let wl = Worklist::init(0, WorklistAttr::new()).unwrap();
        assert_eq!(wl.capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn set_events_arms_trigger_after_construction() {
        let wl = Worklist::init(1, WorklistAttr { concurrency: 1, ..WorklistAttr::new() }).unwrap();
        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();
        wl.set_events(None, Some(SaturationEvent::new(move || f.store(true, Ordering::SeqCst))));

        let wl = Arc::new(wl);
        wl.add(WorkItem::empty()).unwrap();
        let wl2 = wl.clone();
        let handle = thread::spawn(move || wl2.add(WorkItem::empty()));
        thread::sleep(std::time::Duration::from_millis(50));
        assert!(fired.load(Ordering::SeqCst));
        wl.take().run();
        handle.join().unwrap();
    }

    #[test]
    fn empty_event_calling_stop_does_not_deadlock() {
        // empty_event runs holding tail_lock (see `take`); it calls
        // `stop()` on the very thread that holds it. Before the
        // `HELD_SIDE` fix this would try to re-lock `tail_lock` and hang.
        let wl = Arc::new(
            Worklist::init(4, WorklistAttr { concurrency: 1, ..WorklistAttr::new() }).unwrap(),
        );
        let wl2 = wl.clone();
        wl.set_events(Some(SaturationEvent::new(move || wl2.stop())), None);

        let handle = thread::spawn({
            let wl = wl.clone();
            move || wl.take()
        });
        let item = handle
            .join()
            .expect("take() must return instead of hanging once stop() is reentrant-safe");
        item.run();
        assert!(wl.is_stopped());
    }

    #[test]
    fn full_event_calling_stop_does_not_deadlock() {
        // full_event runs holding head_lock (see `add`); same hazard as
        // above but on the producer side.
        let wl = Arc::new(
            Worklist::init(1, WorklistAttr { concurrency: 1, ..WorklistAttr::new() }).unwrap(),
        );
        wl.add(WorkItem::empty()).unwrap();
        let wl2 = wl.clone();
        wl.set_events(None, Some(SaturationEvent::new(move || wl2.stop())));

        let handle = thread::spawn({
            let wl = wl.clone();
            move || wl.add(WorkItem::empty())
        });
        let result = handle
            .join()
            .expect("add() must return instead of hanging once stop() is reentrant-safe");
        assert!(matches!(result, Err(WorkPoolError::Stopped)));
    }
}
