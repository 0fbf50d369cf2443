//! # workpool-core
//!
//! Core types for the workpool library: the bounded worklist, work items,
//! and the crate's error vocabulary. Platform-agnostic — no thread
//! spawning happens here, that's `workpool::PoolController`'s job.
//!
//! ## Modules
//!
//! - `item` - `WorkItem`, `EMPTY_ITEM` analogue, and `SaturationEvent`
//! - `worklist` - the bounded FIFO ring with saturation-event hooks
//! - `error` - the crate's error taxonomy
//! - `env` - environment-variable parsing helpers
//! - `trace` - kernel-style trace macros

pub mod env;
pub mod error;
pub mod item;
pub mod trace;
pub mod worklist;

pub use error::{DestroyError, WorkPoolError, WorkPoolResult};
pub use item::{SaturationEvent, WorkItem};
pub use worklist::{Worklist, WorklistAttr, DEFAULT_CAPACITY};
