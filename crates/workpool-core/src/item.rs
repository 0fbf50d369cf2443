//! Work items — the opaque `(callable, argument)` pairs the worklist carries.
//!
//! The C original (`examples/original_source/common.h`) represents a work
//! item as a raw function pointer plus a raw `void*` argument:
//!
//! ```c
//! typedef void* (*task)(void*);
//! struct work_item { task run; void* arg; };
//! ```
//!
//! Rust closures already capture their argument, so `WorkItem` collapses
//! the pair into a single boxed `FnOnce`. The opaque-callable-plus-opaque-
//! argument contract is unchanged; the return value is still discarded.

/// An opaque unit of work: a callable that takes no further argument
/// (any argument it needs is captured in the closure) and whose return
/// value is discarded by the caller.
pub struct WorkItem {
    run: Box<dyn FnOnce() + Send + 'static>,
}

impl WorkItem {
    /// Wrap a closure as a work item.
    pub fn new<F>(run: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        WorkItem { run: Box::new(run) }
    }

    /// The distinguished empty item: a no-op, returned by `Worklist::take`
    /// when the take is aborted by `stop` instead of yielding a real item.
    pub fn empty() -> Self {
        WorkItem::new(|| {})
    }

    /// Invoke the item's callable, discarding the result.
    pub fn run(self) {
        (self.run)()
    }
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WorkItem(..)")
    }
}

/// A saturation-event callback: registered once via `register`, invoked at
/// most once per saturation episode (§4.1), possibly many times over the
/// worklist's life. Unlike `WorkItem` (a one-shot `FnOnce`, consumed by the
/// single item it represents), an event must be callable again the next time
/// the ring saturates, so it wraps a reusable `Fn` behind an `Arc`.
#[derive(Clone)]
pub struct SaturationEvent {
    call: std::sync::Arc<dyn Fn() + Send + Sync + 'static>,
}

impl SaturationEvent {
    /// Wrap a closure as a reusable saturation-event callback.
    pub fn new<F>(call: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        SaturationEvent { call: std::sync::Arc::new(call) }
    }

    /// The no-op event substituted when a side passes `None` to `register`
    /// (mirrors the C original's fallback to `_wl_dry_run` for a `NULL`
    /// callback).
    pub fn noop() -> Self {
        SaturationEvent::new(|| {})
    }

    /// Invoke the callback. Does not consume it — may be called again on a
    /// later saturation episode.
    pub fn call(&self) {
        (self.call)()
    }
}

impl std::fmt::Debug for SaturationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SaturationEvent(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn run_invokes_closure_once() {
        let flag = Arc::new(AtomicBool::new(false));
        let f = flag.clone();
        let item = WorkItem::new(move || f.store(true, Ordering::SeqCst));
        item.run();
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn empty_item_is_a_noop() {
        // Must not panic and must not do anything observable.
        WorkItem::empty().run();
    }

    #[test]
    fn saturation_event_fires_every_call() {
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let c = count.clone();
        let ev = SaturationEvent::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        ev.call();
        ev.call();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn noop_event_does_nothing_observable() {
        SaturationEvent::noop().call();
    }
}
