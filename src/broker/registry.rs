//! Subscription registry and the public subscription handle.
//!
//! Registrations are keyed by id; delivery order per topic is kept in a separate
//! list. Teardown hooks attached to a registration run exactly once, after it has
//! been removed from the registry and outside the registry lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::topic::{SubscriptionId, Topic};

/// Delivery callback held by the broker.
pub(crate) type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// One-shot cleanup run when a registration is disposed; receives the registration id.
pub(crate) type Teardown = Box<dyn FnOnce(SubscriptionId) + Send>;

pub(crate) enum RegistrationKind<T> {
    /// Receives values published on the topic.
    Delivery(Callback<T>),
    /// Publishes into the topic from a bound value; owns only teardown.
    Publisher,
}

pub(crate) struct Registration<T> {
    pub(crate) id: SubscriptionId,
    pub(crate) topic: Topic,
    pub(crate) kind: RegistrationKind<T>,
    disposed: Arc<AtomicBool>,
    teardown: Mutex<Vec<Teardown>>,
}

impl<T> Registration<T> {
    pub(crate) fn new(id: SubscriptionId, topic: Topic, kind: RegistrationKind<T>, teardown: Option<Teardown>) -> Self {
        Self {
            id,
            topic,
            kind,
            disposed: Arc::new(AtomicBool::new(false)),
            teardown: Mutex::new(teardown.into_iter().collect()),
        }
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn callback(&self) -> Option<&Callback<T>> {
        match &self.kind {
            RegistrationKind::Delivery(cb) => Some(cb),
            RegistrationKind::Publisher => None,
        }
    }

    /// Mark disposed and run teardown hooks. Only the first call does anything.
    pub(crate) fn finish(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let hooks = std::mem::take(&mut *self.teardown.lock().unwrap_or_else(PoisonError::into_inner));
        for hook in hooks {
            hook(self.id);
        }
    }
}

pub(crate) struct Registry<T> {
    entries: HashMap<SubscriptionId, Arc<Registration<T>>>,
    by_topic: HashMap<Topic, Vec<SubscriptionId>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            by_topic: HashMap::new(),
        }
    }
}

impl<T> Registry<T> {
    pub(crate) fn insert(&mut self, registration: Arc<Registration<T>>) {
        if registration.callback().is_some() {
            self.by_topic
                .entry(registration.topic.clone())
                .or_default()
                .push(registration.id);
        }
        self.entries.insert(registration.id, registration);
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> Option<Arc<Registration<T>>> {
        let registration = self.entries.remove(&id)?;
        if let Some(ids) = self.by_topic.get_mut(&registration.topic) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_topic.remove(&registration.topic);
            }
        }
        Some(registration)
    }

    /// Delivery registrations for `topic`, in registration order.
    pub(crate) fn snapshot(&self, topic: &Topic) -> Vec<Arc<Registration<T>>> {
        self.by_topic
            .get(topic)
            .map(|ids| ids.iter().filter_map(|id| self.entries.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    pub(crate) fn drain(&mut self) -> Vec<Arc<Registration<T>>> {
        self.by_topic.clear();
        self.entries.drain().map(|(_, registration)| registration).collect()
    }

    pub(crate) fn contains(&self, id: SubscriptionId) -> bool {
        self.entries.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn topic_len(&self, topic: &Topic) -> usize {
        self.by_topic.get(topic).map_or(0, Vec::len)
    }
}

/// Type-erased view of a broker used by handles to unregister themselves.
pub(crate) trait Unregister: Send + Sync {
    fn unregister(&self, id: SubscriptionId);
}

/// Handle to a topic subscription.
///
/// Dropping a handle does not dispose the subscription; call [`Subscription::dispose`].
/// Clones refer to the same registration.
#[derive(Clone)]
pub struct Subscription {
    id: SubscriptionId,
    topic: Topic,
    disposed: Arc<AtomicBool>,
    broker: Weak<dyn Unregister>,
}

impl Subscription {
    pub(crate) fn new<T>(registration: &Registration<T>, broker: Weak<dyn Unregister>) -> Self {
        Self {
            id: registration.id,
            topic: registration.topic.clone(),
            disposed: Arc::clone(&registration.disposed),
            broker,
        }
    }

    /// The id this subscription is registered under.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The topic this subscription listens to (or publishes on).
    #[must_use]
    pub const fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Whether the subscription has been disposed, by this handle or by the broker.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Remove the subscription from the broker. Idempotent.
    pub fn dispose(&self) {
        if self.is_disposed() {
            return;
        }
        match self.broker.upgrade() {
            Some(broker) => broker.unregister(self.id),
            None => self.disposed.store(true, Ordering::Release),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery(topic: &str) -> Arc<Registration<u8>> {
        let cb: Callback<u8> = Arc::new(|_| {});
        Arc::new(Registration::new(
            SubscriptionId::new(),
            Topic::parse(topic).unwrap(),
            RegistrationKind::Delivery(cb),
            None,
        ))
    }

    #[test]
    fn test_snapshot_keeps_registration_order() {
        let mut registry = Registry::default();
        let a = delivery("t");
        let b = delivery("t");
        registry.insert(Arc::clone(&a));
        registry.insert(Arc::clone(&b));

        let ids: Vec<_> = registry.snapshot(&Topic::parse("t").unwrap()).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[test]
    fn test_publisher_is_not_delivered_to() {
        let mut registry = Registry::<u8>::default();
        let topic = Topic::parse("t").unwrap();
        registry.insert(Arc::new(Registration::new(
            SubscriptionId::new(),
            topic.clone(),
            RegistrationKind::Publisher,
            None,
        )));
        assert_eq!(registry.len(), 1);
        assert!(registry.snapshot(&topic).is_empty());
    }

    #[test]
    fn test_remove_cleans_topic_index() {
        let mut registry = Registry::default();
        let a = delivery("t");
        registry.insert(Arc::clone(&a));
        assert!(registry.remove(a.id).is_some());
        assert!(registry.remove(a.id).is_none());
        assert_eq!(registry.topic_len(&a.topic), 0);
        assert!(!registry.contains(a.id));
    }

    #[test]
    fn test_finish_runs_teardown_once() {
        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let registration = Registration::<u8>::new(
            SubscriptionId::new(),
            Topic::parse("t").unwrap(),
            RegistrationKind::Publisher,
            Some(Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );
        registration.finish();
        registration.finish();
        assert!(registration.is_disposed());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
