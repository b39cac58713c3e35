//! Binding reactive values to topics.
//!
//! A [`Binding`] owns a reactive value together with the topic subscriptions made on
//! its behalf. Per topic it holds at most one subscription in each [`Direction`];
//! binding again in the same direction replaces the previous subscription. The broker
//! and the binding agree on which subscriptions are alive: disposing through either
//! side clears both.
//!
//! [`Binding::dispose`] is the single teardown entry point. It disposes every topic
//! subscription and then the value itself.

mod options;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::broker::{SubscribeOptions, Subscription, Teardown, TopicBroker};
use crate::error::{PostboxError, PostboxResult};
use crate::reactive::{Listener, Reactive};
use crate::topic::{SubscriptionId, Topic};

pub use options::{PublishOptions, SubscribeToOptions, SyncOptions, Transform};

/// Which way a topic subscription moves values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Topic to value.
    SubscribeTo,
    /// Value to topic.
    PublishOn,
}

#[derive(Debug, Default)]
struct TopicSlots {
    subscribe_to: Option<Subscription>,
    publish_on: Option<Subscription>,
}

impl TopicSlots {
    fn slot(&mut self, direction: Direction) -> &mut Option<Subscription> {
        match direction {
            Direction::SubscribeTo => &mut self.subscribe_to,
            Direction::PublishOn => &mut self.publish_on,
        }
    }

    fn get(&self, direction: Direction) -> Option<&Subscription> {
        match direction {
            Direction::SubscribeTo => self.subscribe_to.as_ref(),
            Direction::PublishOn => self.publish_on.as_ref(),
        }
    }

    fn is_empty(&self) -> bool {
        self.subscribe_to.is_none() && self.publish_on.is_none()
    }
}

#[derive(Debug, Default)]
struct BindingState {
    topics: HashMap<Topic, TopicSlots>,
    disposed: bool,
}

type SharedState = Arc<Mutex<BindingState>>;

fn lock(state: &Mutex<BindingState>) -> MutexGuard<'_, BindingState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Teardown hook clearing the slot, unless it already holds a newer subscription.
fn clear_slot(state: Weak<Mutex<BindingState>>, topic: Topic, direction: Direction) -> Teardown {
    Box::new(move |id: SubscriptionId| {
        let Some(state) = state.upgrade() else {
            return;
        };
        let mut guard = lock(&state);
        let Some(slots) = guard.topics.get_mut(&topic) else {
            return;
        };
        let slot = slots.slot(direction);
        if slot.as_ref().is_some_and(|sub| sub.id() == id) {
            *slot = None;
        }
        if slots.is_empty() {
            guard.topics.remove(&topic);
        }
    })
}

/// A reactive value bound to a broker.
///
/// Methods return `&Self` so calls chain. Subscriptions stay alive until unbound,
/// disposed, or the broker is reset; dropping the binding does not tear them down.
pub struct Binding<T> {
    broker: TopicBroker<T>,
    value: Arc<dyn Reactive<T>>,
    state: SharedState,
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        Self {
            broker: self.broker.clone(),
            value: Arc::clone(&self.value),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("state", &*lock(&self.state))
            .finish_non_exhaustive()
    }
}

impl<T> TopicBroker<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Attach `value` to this broker.
    pub fn bind<R>(&self, value: Arc<R>) -> Binding<T>
    where
        R: Reactive<T> + 'static,
    {
        self.bind_dyn(value)
    }

    /// Attach an already type-erased value.
    pub fn bind_dyn(&self, value: Arc<dyn Reactive<T>>) -> Binding<T> {
        Binding {
            broker: self.clone(),
            value,
            state: Arc::new(Mutex::new(BindingState::default())),
        }
    }
}

impl<T> Binding<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Publish the value's changes on `topic`.
    ///
    /// Unless `skip_initial_publish` is set, the current value is published right away,
    /// whatever the comparer says. Later changes are published when the comparer reports
    /// them as changed relative to the topic's cached value.
    pub fn publish_on(&self, topic: &str, options: PublishOptions<T>) -> &Self {
        let Some(topic) = self.broker.topic_or_noop(topic, "publish_on") else {
            return self;
        };
        self.dispose_slot(&topic, Direction::PublishOn);

        let PublishOptions {
            skip_initial_publish,
            comparer,
        } = options;

        let broker = self.broker.clone();
        let publish_topic = topic.clone();
        let listener: Listener<T> = Arc::new(move |new_value: &T| {
            if !broker.is_unchanged(&comparer, &publish_topic, new_value) {
                broker.publish_to(&publish_topic, new_value.clone());
            }
        });
        let guard = self.value.observe(listener);

        let clear = clear_slot(Arc::downgrade(&self.state), topic.clone(), Direction::PublishOn);
        let subscription = self.broker.register_publisher(
            topic.clone(),
            Box::new(move |id| {
                guard.dispose();
                clear(id);
            }),
        );
        self.store_slot(&topic, Direction::PublishOn, subscription);

        if !skip_initial_publish {
            self.broker.publish_to(&topic, self.value.get());
        }
        self
    }

    /// Stop publishing on `topic`. Safe when not publishing.
    pub fn stop_publishing_on(&self, topic: &str) -> &Self {
        if let Some(topic) = Topic::parse(topic) {
            self.dispose_slot(&topic, Direction::PublishOn);
        }
        self
    }

    /// Write values published on `topic` into the bound value.
    ///
    /// Ignored for the empty topic and for read-only values.
    pub fn subscribe_to(&self, topic: &str, options: SubscribeToOptions<T>) -> &Self {
        let Some(topic) = self.broker.topic_or_noop(topic, "subscribe_to") else {
            return self;
        };
        if !self.value.is_writable() {
            self.broker.log_noop("subscribe_to", &topic, "value is not writable");
            return self;
        }
        self.subscribe_to_topic(topic, options);
        self
    }

    /// Like [`Binding::subscribe_to`], reporting why nothing was bound.
    pub fn try_subscribe_to(&self, topic: &str, options: SubscribeToOptions<T>) -> PostboxResult<&Self> {
        let topic = self.writable_topic(topic)?;
        self.subscribe_to_topic(topic, options);
        Ok(self)
    }

    /// Stop receiving values from `topic`. Safe when not subscribed.
    pub fn unsubscribe_from(&self, topic: &str) -> &Self {
        if let Some(topic) = Topic::parse(topic) {
            self.dispose_slot(&topic, Direction::SubscribeTo);
        }
        self
    }

    /// Keep the value in sync with `topic` in both directions.
    ///
    /// Subscribes first, then publishes, so the initial publish is not echoed back as
    /// an incoming update. Ignored entirely for read-only values.
    pub fn sync_with(&self, topic: &str, options: SyncOptions<T>) -> &Self {
        let Some(parsed) = self.broker.topic_or_noop(topic, "sync_with") else {
            return self;
        };
        if !self.value.is_writable() {
            self.broker.log_noop("sync_with", &parsed, "value is not writable");
            return self;
        }
        let (subscribe, publish) = options.split();
        self.subscribe_to(topic, subscribe).publish_on(topic, publish)
    }

    /// Like [`Binding::sync_with`], reporting why nothing was bound.
    pub fn try_sync_with(&self, topic: &str, options: SyncOptions<T>) -> PostboxResult<&Self> {
        self.writable_topic(topic)?;
        Ok(self.sync_with(topic, options))
    }

    /// Stop syncing with `topic` in both directions.
    pub fn stop_syncing_with(&self, topic: &str) -> &Self {
        self.stop_publishing_on(topic).unsubscribe_from(topic)
    }

    /// Dispose every topic subscription, then the value. Idempotent.
    pub fn dispose(&self) {
        let (subscriptions, first) = {
            let mut state = lock(&self.state);
            let subscriptions: Vec<Subscription> = state
                .topics
                .drain()
                .flat_map(|(_, slots)| [slots.subscribe_to, slots.publish_on])
                .flatten()
                .collect();
            let first = !state.disposed;
            state.disposed = true;
            (subscriptions, first)
        };

        for subscription in &subscriptions {
            subscription.dispose();
        }
        if first {
            self.value.dispose();
        }
        tracing::debug!(
            broker = %self.broker.config().name,
            disposed = subscriptions.len(),
            "binding disposed"
        );
    }

    /// Whether [`Binding::dispose`] ran and nothing was bound since.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        lock(&self.state).disposed
    }

    /// Whether the value currently publishes on `topic`.
    #[must_use]
    pub fn is_publishing_on(&self, topic: &str) -> bool {
        self.subscription(topic, Direction::PublishOn).is_some()
    }

    /// Whether the value currently receives from `topic`.
    #[must_use]
    pub fn is_subscribed_to(&self, topic: &str) -> bool {
        self.subscription(topic, Direction::SubscribeTo).is_some()
    }

    /// The live subscription for `topic` in `direction`.
    #[must_use]
    pub fn subscription(&self, topic: &str, direction: Direction) -> Option<Subscription> {
        let topic = Topic::parse(topic)?;
        lock(&self.state)
            .topics
            .get(&topic)
            .and_then(|slots| slots.get(direction))
            .filter(|sub| !sub.is_disposed())
            .cloned()
    }

    /// Topics with at least one live subscription, sorted by name.
    #[must_use]
    pub fn bound_topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = lock(&self.state)
            .topics
            .iter()
            .filter(|(_, slots)| {
                [Direction::SubscribeTo, Direction::PublishOn]
                    .into_iter()
                    .any(|d| slots.get(d).is_some_and(|sub| !sub.is_disposed()))
            })
            .map(|(topic, _)| topic.clone())
            .collect();
        topics.sort();
        topics
    }

    /// The bound value.
    #[must_use]
    pub fn value(&self) -> &Arc<dyn Reactive<T>> {
        &self.value
    }

    /// The broker this binding publishes to and receives from.
    #[must_use]
    pub fn broker(&self) -> &TopicBroker<T> {
        &self.broker
    }

    fn writable_topic(&self, topic: &str) -> PostboxResult<Topic> {
        let topic = Topic::parse(topic).ok_or(PostboxError::MissingTopic)?;
        if !self.value.is_writable() {
            return Err(PostboxError::NotWritable {
                topic: topic.to_string(),
            });
        }
        Ok(topic)
    }

    fn subscribe_to_topic(&self, topic: Topic, options: SubscribeToOptions<T>) {
        self.dispose_slot(&topic, Direction::SubscribeTo);

        let SubscribeToOptions {
            init_with_latest,
            transform,
        } = options;

        let target: Weak<dyn Reactive<T>> = Arc::downgrade(&self.value);
        let callback = Arc::new(move |incoming: &T| {
            let Some(value) = target.upgrade() else {
                return;
            };
            let next = match &transform {
                Some(f) => f(incoming),
                None => incoming.clone(),
            };
            if value.get() != next {
                value.set(next);
            }
        });

        let clear = clear_slot(Arc::downgrade(&self.state), topic.clone(), Direction::SubscribeTo);
        // The slot is stored after registration, so a cached value delivered during
        // registration already goes through the callback.
        let subscription = self.broker.subscribe_to_topic(
            topic.clone(),
            SubscribeOptions {
                init_from_cache: init_with_latest,
            },
            callback,
            Some(clear),
        );
        self.store_slot(&topic, Direction::SubscribeTo, subscription);
    }

    fn store_slot(&self, topic: &Topic, direction: Direction, subscription: Subscription) {
        let displaced = {
            let mut state = lock(&self.state);
            state.disposed = false;
            if subscription.is_disposed() {
                return;
            }
            state
                .topics
                .entry(topic.clone())
                .or_default()
                .slot(direction)
                .replace(subscription)
        };
        if let Some(old) = displaced {
            old.dispose();
        }
    }

    fn dispose_slot(&self, topic: &Topic, direction: Direction) {
        let taken = {
            let mut state = lock(&self.state);
            let Some(slots) = state.topics.get_mut(topic) else {
                return;
            };
            let taken = slots.slot(direction).take();
            if slots.is_empty() {
                state.topics.remove(topic);
            }
            taken
        };
        if let Some(subscription) = taken {
            subscription.dispose();
        }
    }
}
