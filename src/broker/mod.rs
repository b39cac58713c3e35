//! The topic broker.
//!
//! Publishing writes the topic's [`CacheEntry`] and then synchronously calls every live
//! subscriber of the topic, in registration order. Delivery works on a snapshot of the
//! subscriber list taken after the cache write. Publishes on one broker are serialized
//! across threads by a re-entrant lock covering both the cache write and delivery, so
//! the cache and every subscriber agree on the last value. The same thread may publish
//! again from inside a callback; no other lock is held while a callback runs, so
//! callbacks may also subscribe or dispose re-entrantly.
//!
//! A broker is an explicit value: construct one per process (or per test) and share it
//! by cloning the handle. [`TopicBroker::reset`] tears everything down.

mod registry;
/// Channel-backed subscriptions.
pub mod stream;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use parking_lot::ReentrantMutex;
use serde::Serialize;

use crate::cache::{CacheEntry, TopicCache};
use crate::comparer::{CompareFn, Comparer};
use crate::config::BrokerConfig;
use crate::serializer::Serializer;
use crate::topic::{SubscriptionId, Topic};

pub(crate) use registry::Teardown;
use registry::{Callback, Registration, RegistrationKind, Registry, Unregister};
pub use registry::Subscription;
pub use stream::TopicStream;

thread_local! {
    /// Nesting depth of publish calls on this thread, per broker.
    static PUBLISH_DEPTH: RefCell<HashMap<usize, usize>> = RefCell::new(HashMap::new());
}

/// Options for [`TopicBroker::subscribe_with`] and friends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Deliver the topic's cached value immediately at registration, if there is one.
    pub init_from_cache: bool,
}

impl SubscribeOptions {
    /// Options requesting the cached value at registration.
    #[must_use]
    pub const fn from_cache() -> Self {
        Self { init_from_cache: true }
    }
}

pub(crate) struct BrokerInner<T> {
    config: BrokerConfig,
    cache: TopicCache<T>,
    registry: Mutex<Registry<T>>,
    /// Held for the whole of a publish, and while cached values are handed to new subscribers.
    publishing: ReentrantMutex<()>,
    serializer: RwLock<Serializer<T>>,
    default_comparer: RwLock<Option<Arc<CompareFn<T>>>>,
}

impl<T> BrokerInner<T> {
    fn registry(&self) -> MutexGuard<'_, Registry<T>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send + Sync + 'static> Unregister for BrokerInner<T> {
    fn unregister(&self, id: SubscriptionId) {
        let removed = self.registry().remove(id);
        if let Some(registration) = removed {
            tracing::debug!(broker = %self.config.name, topic = %registration.topic, %id, "subscription disposed");
            registration.finish();
        }
    }
}

/// In-process publish/subscribe broker with a last-value cache per topic.
pub struct TopicBroker<T = serde_json::Value> {
    inner: Arc<BrokerInner<T>>,
}

impl<T> Clone for TopicBroker<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for TopicBroker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicBroker")
            .field("name", &self.inner.config.name)
            .field("subscriptions", &self.inner.registry().len())
            .finish_non_exhaustive()
    }
}

impl<T> TopicBroker<T>
where
    T: Clone + PartialEq + Serialize + Send + Sync + 'static,
{
    /// Broker with the JSON serializer and default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    /// Broker with the JSON serializer and the given configuration.
    #[must_use]
    pub fn with_config(config: BrokerConfig) -> Self {
        Self::with_serializer(Serializer::json(), config)
    }

    /// Go back to the JSON serializer.
    pub fn restore_default_serializer(&self) {
        self.set_serializer(Serializer::json());
    }
}

impl<T> Default for TopicBroker<T>
where
    T: Clone + PartialEq + Serialize + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TopicBroker<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Broker with an explicit serializer, for payloads that are not `Serialize`.
    #[must_use]
    pub fn with_serializer(serializer: Serializer<T>, config: BrokerConfig) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                config,
                cache: TopicCache::new(),
                registry: Mutex::new(Registry::default()),
                publishing: ReentrantMutex::new(()),
                serializer: RwLock::new(serializer),
                default_comparer: RwLock::new(None),
            }),
        }
    }

    /// The broker's configuration.
    #[must_use]
    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    /// The serializer currently in use.
    #[must_use]
    pub fn serializer(&self) -> Serializer<T> {
        self.inner
            .serializer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the serializer for every subsequent publish and comparison.
    pub fn set_serializer(&self, serializer: Serializer<T>) {
        *self.inner.serializer.write().unwrap_or_else(PoisonError::into_inner) = serializer;
    }

    /// Replace the policy that [`Comparer::Default`] resolves to.
    ///
    /// Passing [`Comparer::Default`] restores the built-in identity-and-serialized check.
    pub fn set_default_comparer(&self, comparer: Comparer<T>) {
        let resolved = match comparer {
            Comparer::Default => None,
            Comparer::Custom(f) => Some(f),
        };
        *self
            .inner
            .default_comparer
            .write()
            .unwrap_or_else(PoisonError::into_inner) = resolved;
    }

    /// Evaluate `comparer` for `new_value` against the cached value of `topic`.
    pub(crate) fn is_unchanged(&self, comparer: &Comparer<T>, topic: &Topic, new_value: &T) -> bool {
        let entry = self.inner.cache.get(topic);
        let serializer = self.serializer();
        let fallback = self
            .inner
            .default_comparer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        comparer.is_unchanged(new_value, entry.as_ref(), &serializer, fallback.as_ref())
    }

    /// Publish `value` on `topic`. The empty topic is ignored.
    ///
    /// A publish from another thread waits until the current one has been delivered to
    /// every subscriber. Callbacks must not block on another thread that publishes to
    /// the same broker.
    pub fn publish(&self, topic: &str, value: T) {
        let Some(topic) = self.topic_or_noop(topic, "publish") else {
            return;
        };
        self.publish_to(&topic, value);
    }

    pub(crate) fn publish_to(&self, topic: &Topic, value: T) {
        let _publishing = self.inner.publishing.lock();
        let serialized = self.serializer().serialize(&value);
        self.inner
            .cache
            .put(topic.clone(), CacheEntry::new(value.clone(), serialized));

        let key = self.depth_key();
        let depth = PUBLISH_DEPTH.with(|d| d.borrow().get(&key).copied().unwrap_or(0));
        if depth >= self.inner.config.max_publish_depth {
            tracing::warn!(
                broker = %self.inner.config.name,
                %topic,
                depth,
                "publish nested too deeply; delivery dropped"
            );
            return;
        }

        let subscribers = self.inner.registry().snapshot(topic);
        PUBLISH_DEPTH.with(|d| d.borrow_mut().insert(key, depth + 1));
        let _restore = DepthRestore { key, depth };
        for registration in subscribers {
            if registration.is_disposed() {
                continue;
            }
            if let Some(callback) = registration.callback() {
                callback(&value);
            }
        }
    }

    /// Subscribe to future publishes on `topic`.
    ///
    /// Returns `None` (and registers nothing) for the empty topic.
    pub fn subscribe<F>(&self, topic: &str, callback: F) -> Option<Subscription>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_with(topic, SubscribeOptions::default(), callback)
    }

    /// Subscribe with options, e.g. to receive the cached value right away.
    pub fn subscribe_with<F>(&self, topic: &str, options: SubscribeOptions, callback: F) -> Option<Subscription>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let topic = self.topic_or_noop(topic, "subscribe")?;
        Some(self.subscribe_to_topic(topic, options, Arc::new(callback), None))
    }

    /// Subscribe with a callback bound to `target`, which is passed as the receiver on
    /// every call (including the optional call made at registration).
    pub fn subscribe_on<C, F>(
        &self,
        topic: &str,
        target: Arc<C>,
        options: SubscribeOptions,
        callback: F,
    ) -> Option<Subscription>
    where
        C: Send + Sync + 'static + ?Sized,
        F: Fn(&C, &T) + Send + Sync + 'static,
    {
        self.subscribe_with(topic, options, move |value| callback(&*target, value))
    }

    pub(crate) fn subscribe_to_topic(
        &self,
        topic: Topic,
        options: SubscribeOptions,
        callback: Callback<T>,
        teardown: Option<Teardown>,
    ) -> Subscription {
        let registration = Arc::new(Registration::new(
            SubscriptionId::new(),
            topic,
            RegistrationKind::Delivery(Arc::clone(&callback)),
            teardown,
        ));
        let _publishing = self.inner.publishing.lock();
        let subscription = self.register(&registration);

        if options.init_from_cache {
            if let Some(entry) = self.inner.cache.get(&registration.topic) {
                callback(&entry.value);
            }
        }
        subscription
    }

    /// Register a publishing side; its teardown runs when disposed or on reset.
    pub(crate) fn register_publisher(&self, topic: Topic, teardown: Teardown) -> Subscription {
        let registration = Arc::new(Registration::new(
            SubscriptionId::new(),
            topic,
            RegistrationKind::Publisher,
            Some(teardown),
        ));
        self.register(&registration)
    }

    fn register(&self, registration: &Arc<Registration<T>>) -> Subscription {
        self.inner.registry().insert(Arc::clone(registration));
        tracing::debug!(
            broker = %self.inner.config.name,
            topic = %registration.topic,
            id = %registration.id,
            publisher = registration.callback().is_none(),
            "subscription registered"
        );
        let inner: Weak<BrokerInner<T>> = Arc::downgrade(&self.inner);
        let broker: Weak<dyn Unregister> = inner;
        Subscription::new(registration, broker)
    }

    /// Subscribe through a bounded channel instead of a callback.
    ///
    /// Capacity comes from [`BrokerConfig::stream_capacity`].
    pub fn stream(&self, topic: &str, options: SubscribeOptions) -> Option<TopicStream<T>> {
        let capacity = self.inner.config.stream_capacity;
        self.stream_with_capacity(topic, options, capacity)
    }

    /// Like [`TopicBroker::stream`] with an explicit channel capacity.
    pub fn stream_with_capacity(
        &self,
        topic: &str,
        options: SubscribeOptions,
        capacity: usize,
    ) -> Option<TopicStream<T>> {
        let topic = self.topic_or_noop(topic, "stream")?;
        Some(TopicStream::open(self, topic, options, capacity))
    }

    /// A copy of the cached entry for `topic`.
    #[must_use]
    pub fn cache_entry(&self, topic: &str) -> Option<CacheEntry<T>> {
        Topic::parse(topic).and_then(|t| self.inner.cache.get(&t))
    }

    /// The last value published on `topic`.
    #[must_use]
    pub fn latest(&self, topic: &str) -> Option<T> {
        self.cache_entry(topic).map(|entry| entry.value)
    }

    /// Topics that have a cached value, sorted by name.
    #[must_use]
    pub fn cached_topics(&self) -> Vec<Topic> {
        self.inner.cache.topics()
    }

    /// Number of topics with a cached value.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.inner.cache.len()
    }

    /// Whether a subscription id is still registered.
    #[must_use]
    pub fn is_registered(&self, id: SubscriptionId) -> bool {
        self.inner.registry().contains(id)
    }

    /// Number of live registrations, publishers included.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.registry().len()
    }

    /// Number of live delivery subscriptions on `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        Topic::parse(topic).map_or(0, |t| self.inner.registry().topic_len(&t))
    }

    /// Dispose every registration (including those owned by bindings) and clear the cache.
    ///
    /// The serializer and default comparer are kept.
    pub fn reset(&self) {
        let _publishing = self.inner.publishing.lock();
        let drained = self.inner.registry().drain();
        self.inner.cache.clear();
        tracing::debug!(broker = %self.inner.config.name, disposed = drained.len(), "broker reset");
        for registration in drained {
            registration.finish();
        }
    }

    fn depth_key(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    pub(crate) fn topic_or_noop(&self, topic: &str, op: &'static str) -> Option<Topic> {
        let parsed = Topic::parse(topic);
        if parsed.is_none() && self.inner.config.log_noops {
            tracing::trace!(broker = %self.inner.config.name, op, "ignored call without a topic");
        }
        parsed
    }

    pub(crate) fn log_noop(&self, op: &'static str, topic: &Topic, reason: &'static str) {
        if self.inner.config.log_noops {
            tracing::debug!(broker = %self.inner.config.name, op, %topic, reason, "ignored call");
        }
    }
}

struct DepthRestore {
    key: usize,
    depth: usize,
}

impl Drop for DepthRestore {
    fn drop(&mut self) {
        PUBLISH_DEPTH.with(|d| {
            let mut depths = d.borrow_mut();
            if self.depth == 0 {
                depths.remove(&self.key);
            } else {
                depths.insert(self.key, self.depth);
            }
        });
    }
}
