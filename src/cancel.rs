//! The process-wide "first error" slot.
//!
//! Set once by whichever worker first hits a fatal error; every later
//! suspension point (lock-retry backoff, recipe-process polling) reads it
//! back and re-raises the stored error instead of continuing, so a failure
//! in one top-level target aborts the others promptly.
//!
//! Not `OnceLock`: callers need the *value* back at every check, not just a
//! presence bit, so `Arc<BuildError>` can be cloned out and returned.

use std::sync::{Arc, Mutex};

use crate::error::BuildError;

#[derive(Debug, Clone, Default)]
pub struct CancelSlot {
    inner: Arc<Mutex<Option<Arc<BuildError>>>>,
}

impl CancelSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `error` as the cancellation cause, if none is set yet. Returns
    /// the error that ends up stored (ours, or a prior one that won the
    /// race) so callers never need to re-derive "which error was first" by
    /// any other means, such as completion order.
    pub fn set(&self, error: Arc<BuildError>) -> Arc<BuildError> {
        let mut guard = self.inner.lock().expect("cancel slot poisoned");
        if guard.is_none() {
            *guard = Some(error);
        }
        guard.as_ref().expect("just set").clone()
    }

    /// The stored error, if cancellation has been triggered.
    pub fn get(&self) -> Option<Arc<BuildError>> {
        self.inner.lock().expect("cancel slot poisoned").clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().expect("cancel slot poisoned").is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_error_wins() {
        let slot = CancelSlot::new();
        assert!(!slot.is_cancelled());
        slot.set(Arc::new(BuildError::Other("first".to_string())));
        slot.set(Arc::new(BuildError::Other("second".to_string())));
        let stored = slot.get().unwrap();
        assert_eq!(stored.to_string(), "first");
    }
}
