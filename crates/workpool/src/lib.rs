//! # workpool
//!
//! An embeddable worker-pool: a fixed set of threads consuming callable
//! work items from a shared bounded queue, with "totally empty" and
//! "totally full" saturation events and an explicit
//! run / stop / resume / destroy lifecycle.
//!
//! Two crates divide the work the way `gvthread-core`/`gvthread` do in
//! the sibling scheduler library: `workpool-core` holds the
//! platform-agnostic `Worklist`, `WorkItem`, and error types; this crate
//! (`workpool`) owns the OS threads and exposes the host-facing facade.
//!
//! ```
//! use workpool::{WorkPool, PoolConfig, WorkItem};
//!
//! let pool = WorkPool::create(PoolConfig::new().num_workers(4)).unwrap();
//! pool.submit(WorkItem::new(|| { /* ... */ })).unwrap();
//! pool.hard_stop().unwrap();
//! pool.wait().unwrap();
//! pool.destroy().unwrap();
//! ```

mod config;
mod controller;

pub use config::PoolConfig;
pub use workpool_core::error::{DestroyError, WorkPoolError, WorkPoolResult};
pub use workpool_core::item::{SaturationEvent, WorkItem};

use controller::PoolController;
use std::sync::{Mutex, RwLock};
use workpool_core::wp_warn;

/// Host-visible lifecycle states (spec.md §3, §4.3). `Resuming` and
/// `Closing` are real intermediate states on the worker side but are not
/// separately observable here: `continue_` returns once the resume is
/// broadcast (the next observable state is `Running`), and `destroy`
/// blocks until every worker has joined (the next observable state is
/// `Destroyed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Stopping,
    Paused,
    Destroyed,
}

/// A worker-pool handle (spec.md's PublicAPI). Cloneable handles are not
/// provided; share a `WorkPool` behind an `Arc` if multiple owners need
/// to submit concurrently — every method here takes `&self`.
pub struct WorkPool {
    state: Mutex<State>,
    // A `RwLock` rather than a plain `Mutex` so that two long-running
    // calls (e.g. a `submit` blocked on a full queue and a concurrent
    // `wait`) don't serialize on this handle's own lock — they serialize,
    // if at all, inside `PoolController`'s own synchronization.
    controller: RwLock<Option<PoolController>>,
}

/// Builder for the two-step `register` (optional) then `create` flow in
/// spec.md §6.1: saturation events may be installed before the pool's
/// threads exist.
#[derive(Default)]
pub struct WorkPoolBuilder {
    empty_event: Option<SaturationEvent>,
    full_event: Option<SaturationEvent>,
}

impl WorkPoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install saturation callbacks used by the pool this builder
    /// eventually creates. A `None` side is a no-op event.
    pub fn register(
        mut self,
        empty_event: Option<SaturationEvent>,
        full_event: Option<SaturationEvent>,
    ) -> Self {
        self.empty_event = empty_event;
        self.full_event = full_event;
        self
    }

    /// `create(N)` (spec.md §6.2). Spawns `N` worker threads immediately;
    /// the returned pool starts in the `Running` state.
    pub fn create(self, config: PoolConfig) -> WorkPoolResult<WorkPool> {
        let controller = PoolController::create(
            config.num_workers,
            config.queue_capacity,
            config.drop_on_saturation,
            self.empty_event,
            self.full_event,
        )?;
        Ok(WorkPool {
            state: Mutex::new(State::Running),
            controller: RwLock::new(Some(controller)),
        })
    }
}

impl WorkPool {
    pub fn builder() -> WorkPoolBuilder {
        WorkPoolBuilder::new()
    }

    /// Equivalent to `builder().create(config)` with no saturation
    /// events registered.
    pub fn create(config: PoolConfig) -> WorkPoolResult<Self> {
        WorkPoolBuilder::new().create(config)
    }

    /// (Re-)install saturation callbacks. Valid only while `Paused`,
    /// before `continue_` (spec.md §6.1) — to register before the pool
    /// exists at all, use `WorkPool::builder().register(..)`.
    pub fn register(
        &self,
        empty_event: Option<SaturationEvent>,
        full_event: Option<SaturationEvent>,
    ) -> WorkPoolResult<()> {
        if *self.state.lock().unwrap() != State::Paused {
            return Err(WorkPoolError::InvalidState);
        }
        let guard = self.controller.read().unwrap();
        let controller = guard.as_ref().ok_or(WorkPoolError::InvalidState)?;
        controller.register_events(empty_event, full_event);
        Ok(())
    }

    /// Enqueue a work item. Permitted while `Running`, and (spec.md
    /// §4.3) from within a worker's own callback — in practice that
    /// means `Stopping` is allowed too, since a `soft_stop` lets
    /// in-flight items keep running and they may resubmit.
    pub fn submit(&self, item: WorkItem) -> WorkPoolResult<()> {
        match *self.state.lock().unwrap() {
            State::Paused | State::Destroyed => return Err(WorkPoolError::InvalidState),
            State::Running | State::Stopping => {}
        }
        let guard = self.controller.read().unwrap();
        let controller = guard.as_ref().ok_or(WorkPoolError::InvalidState)?;
        controller.submit(item)
    }

    /// Flip `stop_requested` and release any party parked in the
    /// worklist (spec.md §4.2 `hard_stop`).
    pub fn hard_stop(&self) -> WorkPoolResult<()> {
        {
            let mut state = self.state.lock().unwrap();
            match *state {
                State::Paused | State::Destroyed => return Err(WorkPoolError::InvalidState),
                State::Running | State::Stopping => *state = State::Stopping,
            }
        }
        let guard = self.controller.read().unwrap();
        guard.as_ref().ok_or(WorkPoolError::InvalidState)?.hard_stop();
        Ok(())
    }

    /// Flip `stop_requested` only; workers parked in `worklist.take`
    /// stay parked until `hard_stop` or `destroy` (spec.md §4.2 `soft_stop`).
    pub fn soft_stop(&self) -> WorkPoolResult<()> {
        {
            let mut state = self.state.lock().unwrap();
            match *state {
                State::Paused | State::Destroyed => return Err(WorkPoolError::InvalidState),
                State::Running | State::Stopping => *state = State::Stopping,
            }
        }
        let guard = self.controller.read().unwrap();
        guard.as_ref().ok_or(WorkPoolError::InvalidState)?.soft_stop();
        Ok(())
    }

    /// Block until every worker has parked. Returns with the pool
    /// `Paused`.
    pub fn wait(&self) -> WorkPoolResult<()> {
        if *self.state.lock().unwrap() == State::Destroyed {
            return Err(WorkPoolError::InvalidState);
        }
        {
            let guard = self.controller.read().unwrap();
            guard.as_ref().ok_or(WorkPoolError::InvalidState)?.wait();
        }
        let mut state = self.state.lock().unwrap();
        if *state != State::Destroyed {
            *state = State::Paused;
        }
        Ok(())
    }

    /// Precondition `Paused` (spec.md §6). Resets the worklist and
    /// returns the pool to `Running`.
    pub fn continue_(&self) -> WorkPoolResult<()> {
        if *self.state.lock().unwrap() != State::Paused {
            return Err(WorkPoolError::InvalidState);
        }
        {
            let guard = self.controller.read().unwrap();
            guard.as_ref().ok_or(WorkPoolError::InvalidState)?.continue_();
        }
        *self.state.lock().unwrap() = State::Running;
        Ok(())
    }

    /// Join and free every worker thread. Valid from any state but
    /// `Destroyed`; issues a `hard_stop` internally first (spec.md §4.2),
    /// so it never deadlocks regardless of what workers were doing.
    ///
    /// The `hard_stop` must run before the write-lock `take()` below, not
    /// after: `submit`/`register`/`wait` hold `controller`'s read lock for
    /// as long as their (potentially indefinitely blocking) call into
    /// `PoolController` takes. A `submit` parked on a full, untriggered
    /// queue only returns once the worklist's own `stop` flag is set —
    /// which happens inside `hard_stop` — so taking the write lock first
    /// would wait on a reader that itself is waiting on this call.
    pub fn destroy(&self) -> WorkPoolResult<()> {
        {
            let mut state = self.state.lock().unwrap();
            if *state == State::Destroyed {
                return Err(WorkPoolError::InvalidState);
            }
            *state = State::Destroyed;
        }
        {
            let guard = self.controller.read().unwrap();
            if let Some(controller) = guard.as_ref() {
                controller.hard_stop();
            }
        }
        match self.controller.write().unwrap().take() {
            Some(controller) => controller.destroy(),
            None => {
                wp_warn!("destroy called with no controller present");
                Ok(())
            }
        }
    }
}
