use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::{Listener, ListenerGuard, Listeners, Reactive};

/// A writable reactive value.
///
/// Writes equal to the current value are ignored, so echoing a value back into the
/// observable it came from does not notify again. Use [`Observable::mutate`] or
/// [`Observable::notify`] when a payload was changed in place.
pub struct Observable<T> {
    value: RwLock<T>,
    listeners: Listeners<T>,
    disposed: AtomicBool,
}

impl<T> Observable<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create an observable holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
            listeners: Listeners::new(),
            disposed: AtomicBool::new(false),
        }
    }

    /// Create an observable ready to be shared and bound.
    pub fn shared(value: T) -> Arc<Self> {
        Arc::new(Self::new(value))
    }

    /// Change the value in place and notify unconditionally.
    pub fn mutate<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        let current = {
            let mut guard = self.value.write().unwrap_or_else(PoisonError::into_inner);
            f(&mut guard);
            guard.clone()
        };
        self.listeners.notify(&current);
    }

    /// Notify listeners with the current value without changing it.
    pub fn notify(&self) {
        let current = self.get();
        self.listeners.notify(&current);
    }

    /// Number of attached listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Whether [`Reactive::dispose`] has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl<T> Reactive<T> for Observable<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn get(&self) -> T {
        self.value.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set(&self, value: T) {
        {
            let mut guard = self.value.write().unwrap_or_else(PoisonError::into_inner);
            if *guard == value {
                return;
            }
            *guard = value.clone();
        }
        self.listeners.notify(&value);
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn observe(&self, listener: Listener<T>) -> ListenerGuard {
        self.listeners.add(listener)
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            self.listeners.clear();
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("value", &*self.value.read().unwrap_or_else(PoisonError::into_inner))
            .field("disposed", &self.disposed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn record<T: Clone + Send + 'static>(seen: &Arc<Mutex<Vec<T>>>) -> Listener<T> {
        let sink = Arc::clone(seen);
        Arc::new(move |v: &T| sink.lock().unwrap().push(v.clone()))
    }

    #[test]
    fn test_set_notifies_with_new_value() {
        let obs = Observable::new(1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _guard = obs.observe(record(&seen));

        obs.set(2);
        assert_eq!(obs.get(), 2);
        assert_eq!(*seen.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_equal_write_is_suppressed() {
        let obs = Observable::new("a".to_string());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _guard = obs.observe(record(&seen));

        obs.set("a".to_string());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_mutate_always_notifies() {
        let obs = Observable::new(vec![1]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _guard = obs.observe(record(&seen));

        obs.mutate(|v| v.push(2));
        obs.notify();
        assert_eq!(*seen.lock().unwrap(), vec![vec![1, 2], vec![1, 2]]);
    }

    #[test]
    fn test_listener_may_write_back() {
        let obs = Observable::shared(0);
        let inner = Arc::clone(&obs);
        let _guard = obs.observe(Arc::new(move |v: &i32| {
            if *v < 3 {
                inner.set(v + 1);
            }
        }));
        obs.set(1);
        assert_eq!(obs.get(), 3);
    }

    #[test]
    fn test_dispose_clears_listeners_and_is_idempotent() {
        let obs = Observable::new(0);
        let _guard = obs.observe(Arc::new(|_| {}));
        obs.dispose();
        obs.dispose();
        assert!(obs.is_disposed());
        assert_eq!(obs.listener_count(), 0);
    }
}
