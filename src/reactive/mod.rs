//! Reactive values that can be bound to topics.
//!
//! [`Reactive`] is the contract a value must satisfy to be bound by a
//! [`crate::Binding`]: a readable (and possibly writable) current value, change
//! listeners that detach through a guard, and a dispose hook. [`Observable`] and
//! [`Computed`] are the implementations shipped with the crate.

mod computed;
mod observable;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

pub use computed::Computed;
pub use observable::Observable;

/// Change listener, called with the new value.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A value that can be read, observed and (optionally) written.
pub trait Reactive<T>: Send + Sync {
    /// The current value.
    fn get(&self) -> T;

    /// Write a new value. Read-only values ignore writes.
    fn set(&self, value: T);

    /// Whether [`Reactive::set`] has any effect.
    fn is_writable(&self) -> bool;

    /// Call `listener` after every change until the guard is disposed or dropped.
    fn observe(&self, listener: Listener<T>) -> ListenerGuard;

    /// Release the value's own resources. Must tolerate repeated calls.
    fn dispose(&self) {}
}

/// Detaches a listener when disposed or dropped.
pub struct ListenerGuard {
    detach: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ListenerGuard {
    /// Guard running `detach` once.
    pub fn new<F>(detach: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            detach: Mutex::new(Some(Box::new(detach))),
        }
    }

    /// Guard with nothing to detach.
    #[must_use]
    pub fn noop() -> Self {
        Self {
            detach: Mutex::new(None),
        }
    }

    /// Detach the listener. Idempotent.
    pub fn dispose(&self) {
        let detach = self.detach.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(detach) = detach {
            detach();
        }
    }

    /// Whether the listener is detached.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.detach.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerGuard")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Ordered listener list shared by the reactive implementations.
pub(crate) struct Listeners<T> {
    inner: Arc<Mutex<Vec<(u64, Listener<T>)>>>,
    next_id: AtomicU64,
}

impl<T: 'static> Listeners<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    pub(crate) fn add(&self, listener: Listener<T>) -> ListenerGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));

        let list: Weak<Mutex<Vec<(u64, Listener<T>)>>> = Arc::downgrade(&self.inner);
        ListenerGuard::new(move || {
            if let Some(list) = list.upgrade() {
                list.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .retain(|(other, _)| *other != id);
            }
        })
    }

    /// Call every listener with `value`, outside the lock. A listener detached by an
    /// earlier one during the same notification is skipped.
    pub(crate) fn notify(&self, value: &T) {
        let snapshot: Vec<(u64, Listener<T>)> = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for (id, listener) in snapshot {
            let live = self
                .inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .any(|(other, _)| *other == id);
            if live {
                listener(value);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub(crate) fn clear(&self) {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
