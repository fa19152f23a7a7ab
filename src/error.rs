//! Error taxonomy shared by every fallible public operation.
//!
//! End-of-stream is deliberately **not** a variant here: linear- and
//! circular-buffer reads return a plain byte count, and a short read
//! (including zero) after the writer goes `Inactive` is the EOF signal,
//! not an error.

/// The kinds of failure a `straph` operation can report.
#[derive(Debug, thiserror::Error)]
pub enum StraphError {
    /// An unknown buffer variant, or a state transition that isn't legal
    /// from the node/buffer's current status (e.g. reconfiguring an
    /// active node's output buffer).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation named a slot that was never configured.
    #[error("not found: {0}")]
    NotFound(String),

    /// Growing a preallocated collection (a neighbor list, a slot array)
    /// failed.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// A poisoned mutex (a prior panic while the lock was held), a failed
    /// thread spawn, or a worker thread that panicked. These indicate a
    /// programmer or OS fault and are propagated unchanged rather than
    /// recovered.
    #[error("synchronization failure: {0}")]
    Synchronization(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StraphError>;

impl StraphError {
    pub(crate) fn poisoned(what: &str) -> Self {
        StraphError::Synchronization(format!("{what}: lock poisoned by a prior panic"))
    }

    pub(crate) fn thread_spawn(err: &std::io::Error) -> Self {
        StraphError::Synchronization(format!("failed to spawn worker thread: {err}"))
    }

    pub(crate) fn worker_panicked(payload: &(dyn std::any::Any + Send)) -> Self {
        let msg = panic_message(payload);
        StraphError::Synchronization(format!("worker thread panicked: {msg}"))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

impl<T> From<std::sync::PoisonError<T>> for StraphError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StraphError::poisoned("mutex")
    }
}

/// Mapping for `Vec::try_reserve` failures at scheduler/assembly growth
/// points (see `DESIGN.md`: "Out of memory" kind).
impl From<std::collections::TryReserveError> for StraphError {
    fn from(err: std::collections::TryReserveError) -> Self {
        StraphError::OutOfMemory(err.to_string())
    }
}
