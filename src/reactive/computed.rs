use std::sync::{Arc, PoisonError, RwLock};

use super::{Listener, ListenerGuard, Listeners, Reactive};

type WriteFn<T> = Box<dyn Fn(T) + Send + Sync>;

struct ComputedState<T> {
    value: RwLock<T>,
    listeners: Listeners<T>,
}

/// A value derived from another reactive value.
///
/// Read-only unless built with [`Computed::writable`], in which case writes are mapped
/// back onto the source.
pub struct Computed<T> {
    state: Arc<ComputedState<T>>,
    source_guard: ListenerGuard,
    write: Option<WriteFn<T>>,
}

impl<T> Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Read-only value computed from `source` through `read`.
    pub fn new<S, R, F>(source: &Arc<R>, read: F) -> Self
    where
        S: 'static,
        R: Reactive<S> + ?Sized + 'static,
        F: Fn(&S) -> T + Send + Sync + 'static,
    {
        let read = Arc::new(read);
        let state = Arc::new(ComputedState {
            value: RwLock::new(read(&source.get())),
            listeners: Listeners::new(),
        });

        let target = Arc::downgrade(&state);
        let source_guard = source.observe(Arc::new(move |s: &S| {
            let Some(state) = target.upgrade() else {
                return;
            };
            let next = read(s);
            {
                let mut current = state.value.write().unwrap_or_else(PoisonError::into_inner);
                if *current == next {
                    return;
                }
                *current = next.clone();
            }
            state.listeners.notify(&next);
        }));

        Self {
            state,
            source_guard,
            write: None,
        }
    }

    /// Read/write value: reads go through `read`, writes through `write` into `source`.
    pub fn writable<S, R, F, W>(source: &Arc<R>, read: F, write: W) -> Self
    where
        S: 'static,
        R: Reactive<S> + ?Sized + 'static,
        F: Fn(&S) -> T + Send + Sync + 'static,
        W: Fn(T) -> S + Send + Sync + 'static,
    {
        let mut computed = Self::new(source, read);
        let target = Arc::clone(source);
        computed.write = Some(Box::new(move |value| target.set(write(value))));
        computed
    }

    /// Shared read-only value.
    pub fn shared<S, R, F>(source: &Arc<R>, read: F) -> Arc<Self>
    where
        S: 'static,
        R: Reactive<S> + ?Sized + 'static,
        F: Fn(&S) -> T + Send + Sync + 'static,
    {
        Arc::new(Self::new(source, read))
    }
}

impl<T> Reactive<T> for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn get(&self) -> T {
        self.state.value.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set(&self, value: T) {
        match &self.write {
            Some(write) => write(value),
            None => tracing::trace!("write to read-only computed ignored"),
        }
    }

    fn is_writable(&self) -> bool {
        self.write.is_some()
    }

    fn observe(&self, listener: Listener<T>) -> ListenerGuard {
        self.state.listeners.add(listener)
    }

    fn dispose(&self) {
        self.source_guard.dispose();
        self.state.listeners.clear();
    }
}
