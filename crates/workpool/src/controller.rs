//! Owns the worker threads and the pause/resume/shutdown coordination
//! state described in spec.md §4.2.
//!
//! Grounded on `examples/original_source/hthpool.c`'s `daemon_run` (the
//! worker loop), `hthpool_hard_stop`/`hthpool_soft_stop`/`hthpool_wait`/
//! `hthpool_continue`/`hthpool_destroy` (the controller operations), and
//! on the teacher's `ksvc-module/src/fixed_pool.rs` for the
//! thread-spawning, `Arc`-shared-state pattern this module generalizes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Condvar, Mutex};
use std::thread::JoinHandle;

use workpool_core::error::{DestroyError, WorkPoolError, WorkPoolResult};
use workpool_core::item::{SaturationEvent, WorkItem};
use workpool_core::trace;
use workpool_core::worklist::{Worklist, WorklistAttr};
use workpool_core::{wp_debug, wp_trace};

struct PauseState {
    stopped_threads: usize,
    blocked_threads: usize,
}

struct Shared {
    worklist: Worklist,
    n: usize,
    pause_mu: Mutex<PauseState>,
    all_stopped: Condvar,
    may_resume: Condvar,
    barrier: Barrier,
    // Read by workers without `pause_mu` held (spec.md §9); written only
    // under `pause_mu`.
    stop_requested: AtomicBool,
    closing: AtomicBool,
}

/// Drives `N` worker threads against a `Worklist` (spec.md §4.2).
pub struct PoolController {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

impl PoolController {
    /// `create(N, empty_event, full_event)`. `queue_capacity` of `0`
    /// falls back to the worklist's own default.
    pub fn create(
        num_workers: usize,
        queue_capacity: usize,
        drop_on_saturation: bool,
        empty_event: Option<SaturationEvent>,
        full_event: Option<SaturationEvent>,
    ) -> WorkPoolResult<Self> {
        if num_workers == 0 {
            return Err(WorkPoolError::InvalidArg);
        }
        let trigger = empty_event.is_some() || full_event.is_some();
        let attr = WorklistAttr {
            trigger,
            concurrency: num_workers,
            empty_event,
            full_event,
            drop_on_saturation,
        };
        let worklist = Worklist::init(queue_capacity, attr)?;

        let shared = Arc::new(Shared {
            worklist,
            n: num_workers,
            pause_mu: Mutex::new(PauseState { stopped_threads: 0, blocked_threads: 0 }),
            all_stopped: Condvar::new(),
            may_resume: Condvar::new(),
            barrier: Barrier::new(num_workers),
            stop_requested: AtomicBool::new(false),
            closing: AtomicBool::new(false),
        });

        let mut handles = Vec::with_capacity(num_workers);
        for id in 0..num_workers {
            let shared = shared.clone();
            let handle = std::thread::Builder::new()
                .name(format!("workpool-{id}"))
                .spawn(move || worker_loop(shared, id as u32))
                .map_err(|_| WorkPoolError::ThreadSpawnError)?;
            handles.push(handle);
        }

        wp_debug!("pool created with {} workers", num_workers);
        Ok(PoolController { shared, handles })
    }

    /// Re-arm saturation events. Caller (`WorkPool::register`) is
    /// responsible for only calling this while `Paused`.
    pub fn register_events(&self, empty_event: Option<SaturationEvent>, full_event: Option<SaturationEvent>) {
        self.shared.worklist.set_events(empty_event, full_event);
    }

    pub fn submit(&self, item: WorkItem) -> WorkPoolResult<()> {
        self.shared.worklist.add(item)
    }

    /// Unblocks any worker parked in `worklist.take`/`add` too. Safe to
    /// call from inside a registered saturation event (spec.md §8
    /// scenario 3) — `Worklist::stop` notices it's already running on a
    /// thread that holds one of the ring's mutexes and doesn't re-lock it.
    pub fn hard_stop(&self) {
        self.shared.stop_requested.store(true, Ordering::Release);
        self.shared.worklist.stop();
        wp_debug!("hard_stop issued");
    }

    /// Only flips the controller flag; workers already blocked in
    /// `worklist.take` stay blocked until a `hard_stop`/`destroy`.
    pub fn soft_stop(&self) {
        self.shared.stop_requested.store(true, Ordering::Release);
        wp_debug!("soft_stop issued");
    }

    pub fn wait(&self) {
        let mut state = self.shared.pause_mu.lock().unwrap();
        while state.stopped_threads != self.shared.n {
            state = self.shared.all_stopped.wait(state).unwrap();
        }
    }

    /// Precondition: `wait()` has returned. Resets the worklist and
    /// releases all workers to rendezvous on the resume barrier.
    pub fn continue_(&self) {
        let mut state = self.shared.pause_mu.lock().unwrap();
        self.shared.stop_requested.store(false, Ordering::Release);
        state.stopped_threads = 0;
        state.blocked_threads = self.shared.n;
        self.shared.worklist.reset();
        drop(state);
        self.shared.may_resume.notify_all();
        wp_debug!("continue issued, resuming {} workers", self.shared.n);
    }

    /// Joins every worker. Issues a `hard_stop` first so a worker parked
    /// in `worklist.take` is guaranteed to reach the park protocol and
    /// observe `closing` (spec.md §4.2 `destroy` precondition).
    ///
    /// Unlike `hard_stop`, this is **not** safe to call from inside a
    /// saturation event: a worker thread running an event is still
    /// inside its own `take`/`add` call, not yet back at the join point
    /// this method waits on, so joining that thread's own handle would
    /// wait on itself forever. Call `hard_stop` from an event and let the
    /// host's own thread call `destroy` afterwards.
    pub fn destroy(mut self) -> WorkPoolResult<()> {
        self.hard_stop();
        {
            let mut state = self.shared.pause_mu.lock().unwrap();
            self.shared.closing.store(true, Ordering::Release);
            state.blocked_threads = self.shared.n;
        }
        self.shared.may_resume.notify_all();

        let mut panicked = false;
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                panicked = true;
            }
        }
        self.shared.worklist.destroy();
        wp_debug!("pool destroyed");
        if panicked {
            return Err(WorkPoolError::Destroy(DestroyError::WorkerPanicked));
        }
        Ok(())
    }
}

fn worker_loop(shared: Arc<Shared>, id: u32) {
    trace::set_worker_id(id);
    loop {
        if shared.stop_requested.load(Ordering::Acquire) {
            let mut state = shared.pause_mu.lock().unwrap();
            state.stopped_threads += 1;
            if state.stopped_threads == shared.n {
                shared.all_stopped.notify_all();
            }
            while state.blocked_threads == 0 {
                state = shared.may_resume.wait(state).unwrap();
            }
            state.blocked_threads -= 1;
            drop(state);

            if shared.closing.load(Ordering::Acquire) {
                wp_trace!("worker exiting");
                return;
            }
            // Collective rendezvous: no worker starts the next round of
            // `take` until every worker has resumed (spec.md §9).
            shared.barrier.wait();
            wp_trace!("worker resumed past barrier");
        }

        let item = shared.worklist.take();
        item.run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn runs_submitted_items() {
        let controller = PoolController::create(2, 4, false, None, None).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let c = counter.clone();
            controller
                .submit(WorkItem::new(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }
        controller.hard_stop();
        controller.wait();
        assert_eq!(counter.load(Ordering::SeqCst), 50);
        controller.destroy().unwrap();
    }

    #[test]
    fn wait_returns_once_all_workers_parked() {
        let controller = PoolController::create(3, 4, false, None, None).unwrap();
        controller.hard_stop();
        controller.wait();
        controller.destroy().unwrap();
    }

    #[test]
    fn continue_resumes_and_drains_fresh_submissions() {
        let controller = PoolController::create(2, 4, false, None, None).unwrap();
        controller.hard_stop();
        controller.wait();
        controller.continue_();

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let c = counter.clone();
            controller
                .submit(WorkItem::new(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }
        controller.hard_stop();
        controller.wait();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        controller.destroy().unwrap();
    }

    #[test]
    fn destroy_immediately_after_create_does_not_deadlock() {
        let controller = PoolController::create(1, 4, false, None, None).unwrap();
        controller.destroy().unwrap();
    }

    #[test]
    fn soft_stop_lets_inflight_items_finish_before_parking() {
        let controller = PoolController::create(1, 4, false, None, None).unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        let r = ran.clone();
        controller
            .submit(WorkItem::new(move || {
                std::thread::sleep(Duration::from_millis(30));
                r.store(true, Ordering::SeqCst);
            }))
            .unwrap();
        controller.soft_stop();
        controller.wait();
        assert!(ran.load(Ordering::SeqCst));
        controller.destroy().unwrap();
    }
}
