//! Error types for the workpool library.

use std::fmt;

/// Result type for workpool operations.
pub type WorkPoolResult<T> = std::result::Result<T, WorkPoolError>;

/// Errors a workpool operation can return.
#[derive(Debug)]
pub enum WorkPoolError {
    /// `create` was called with a non-positive worker count.
    InvalidArg,
    /// Allocation of the worklist ring or a thread handle vector failed.
    AllocError,
    /// A mutex, condvar or barrier failed to initialize.
    SyncInitError,
    /// `std::thread::Builder::spawn` failed for a worker.
    ThreadSpawnError,
    /// `add`/`submit` was called while the worklist is in stop state.
    Stopped,
    /// The worklist is saturated and `drop_on_saturation` is set.
    Busy,
    /// An API operation was called from a lifecycle state that doesn't
    /// admit it (e.g. `continue_` while `Running`, anything on `Destroyed`).
    InvalidState,
    /// Teardown failed: a worker thread panicked (join returned `Err`) or a
    /// synchronization primitive could not be destroyed. Fatal — the host
    /// should treat the pool as unusable beyond reporting this.
    Destroy(DestroyError),
}

impl fmt::Display for WorkPoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArg => write!(f, "invalid argument (worker count must be > 0)"),
            Self::AllocError => write!(f, "allocation failed"),
            Self::SyncInitError => write!(f, "failed to initialize a synchronization primitive"),
            Self::ThreadSpawnError => write!(f, "failed to spawn a worker thread"),
            Self::Stopped => write!(f, "worklist is stopped"),
            Self::Busy => write!(f, "worklist is saturated"),
            Self::InvalidState => write!(f, "operation not valid in the current lifecycle state"),
            Self::Destroy(e) => write!(f, "destroy failed: {}", e),
        }
    }
}

impl std::error::Error for WorkPoolError {}

impl From<DestroyError> for WorkPoolError {
    fn from(e: DestroyError) -> Self {
        WorkPoolError::Destroy(e)
    }
}

/// Failure during `destroy()` — joining a worker or tearing down a
/// synchronization primitive.
#[derive(Debug)]
pub enum DestroyError {
    /// A worker thread panicked; `JoinHandle::join` returned `Err`.
    WorkerPanicked,
}

impl fmt::Display for DestroyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkerPanicked => write!(f, "a worker thread panicked before it could be joined"),
        }
    }
}

impl std::error::Error for DestroyError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_stable() {
        assert_eq!(format!("{}", WorkPoolError::InvalidArg), "invalid argument (worker count must be > 0)");
        assert_eq!(format!("{}", WorkPoolError::Stopped), "worklist is stopped");
        assert_eq!(format!("{}", WorkPoolError::Busy), "worklist is saturated");
    }

    #[test]
    fn destroy_error_converts() {
        let e: WorkPoolError = DestroyError::WorkerPanicked.into();
        assert!(matches!(e, WorkPoolError::Destroy(DestroyError::WorkerPanicked)));
    }
}
