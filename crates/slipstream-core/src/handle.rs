//! Lazily-initialized shared client handles.
//!
//! Backends create their HTTP clients on first use. The slot mutex is held
//! for the whole construction, so concurrent first callers see exactly one
//! handle. A failed construction leaves the slot empty and the next caller
//! tries again.

use std::sync::{Arc, Mutex, PoisonError};

/// A once-constructed handle shared by every caller.
pub struct LazyHandle<T> {
    slot: Mutex<Option<Arc<T>>>,
}

impl<T> LazyHandle<T> {
    /// Create an empty handle.
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Return the handle, constructing it with `init` if this is the first
    /// successful access.
    pub fn get_or_try_init<E, F>(&self, init: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.as_ref() {
            return Ok(Arc::clone(handle));
        }

        let handle = Arc::new(init()?);
        *slot = Some(Arc::clone(&handle));
        Ok(handle)
    }

    /// Whether the handle has been constructed.
    pub fn is_initialized(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl<T> Default for LazyHandle<T> {
    fn default() -> Self {
        Self::new()
    }
}
