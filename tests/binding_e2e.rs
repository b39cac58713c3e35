use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::{json, Value};

use postbox::{
    CacheEntry, Computed, Direction, Observable, PublishOptions, Reactive, SubscribeToOptions, TopicBroker,
};

fn count_publishes(broker: &TopicBroker<Value>, topic: &str) -> Arc<AtomicUsize> {
    let hits = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&hits);
    broker.subscribe(topic, move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });
    hits
}

fn exclaim(v: &Value) -> Value {
    json!(format!("{}!", v.as_str().unwrap_or_default()))
}

#[test]
fn subscribe_to_updates_on_publish_only_for_its_topic() {
    let broker = TopicBroker::<Value>::new();
    let obs = Observable::shared(json!("test_value"));
    broker.bind(Arc::clone(&obs)).subscribe_to("test_topic", SubscribeToOptions::new());

    broker.publish("other_topic", json!("newer_value"));
    assert_eq!(obs.get(), json!("test_value"));

    broker.publish("test_topic", json!("newer_value"));
    assert_eq!(obs.get(), json!("newer_value"));
}

#[test]
fn subscribe_to_transform_without_latest() {
    let broker = TopicBroker::<Value>::new();
    broker.publish("test_topic", json!("early"));

    let obs = Observable::shared(json!("test_value"));
    broker
        .bind(Arc::clone(&obs))
        .subscribe_to("test_topic", SubscribeToOptions::new().with_transform(exclaim));
    assert_eq!(obs.get(), json!("test_value"));

    broker.publish("test_topic", json!("newer_value"));
    assert_eq!(obs.get(), json!("newer_value!"));
}

#[test]
fn subscribe_to_transform_with_latest() {
    let broker = TopicBroker::<Value>::new();
    broker.publish("test_topic", json!("x"));

    let obs = Observable::shared(json!(null));
    broker
        .bind(Arc::clone(&obs))
        .subscribe_to("test_topic", SubscribeToOptions::latest().with_transform(exclaim));
    assert_eq!(obs.get(), json!("x!"));
}

#[test]
fn subscribe_to_writable_computed() {
    let broker = TopicBroker::<Value>::new();
    let underlying = Observable::shared(json!("test_value"));
    let computed = Arc::new(Computed::writable(&underlying, Value::clone, |v: Value| v));
    broker.bind(Arc::clone(&computed)).subscribe_to("test_topic", SubscribeToOptions::new());

    broker.publish("test_topic", json!("newer_value"));
    assert_eq!(computed.get(), json!("newer_value"));
    assert_eq!(underlying.get(), json!("newer_value"));
}

#[test]
fn unsubscribe_from_stops_updates() {
    let broker = TopicBroker::<Value>::new();
    let obs = Observable::shared(json!("test_value"));
    let binding = broker.bind(Arc::clone(&obs));
    binding.subscribe_to("test_topic", SubscribeToOptions::new());
    binding.unsubscribe_from("test_topic").unsubscribe_from("test_topic");

    broker.publish("test_topic", json!("newer_value"));
    assert_eq!(obs.get(), json!("test_value"));
    assert_eq!(broker.subscriber_count("test_topic"), 0);
}

#[test]
fn publish_on_computed_follows_underlying() {
    let broker = TopicBroker::<Value>::new();
    let underlying = Observable::shared(json!("test_value"));
    let computed = Computed::shared(&underlying, |v: &Value| json!(format!("{}!", v.as_str().unwrap_or_default())));
    broker.bind(computed).publish_on("test_topic", PublishOptions::new());
    assert_eq!(broker.latest("test_topic"), Some(json!("test_value!")));

    underlying.set(json!("newer_value"));
    assert_eq!(broker.latest("test_topic"), Some(json!("newer_value!")));
}

#[test]
fn publish_on_with_comparer_still_publishes_initially() {
    let broker = TopicBroker::<Value>::new();
    let obs = Observable::shared(json!("test_value"));
    broker.bind(Arc::clone(&obs)).publish_on(
        "test_topic",
        PublishOptions::new().compare_with(|_: &Value, _: &CacheEntry<Value>| true),
    );
    assert_eq!(broker.latest("test_topic"), Some(json!("test_value")));

    let hits = count_publishes(&broker, "test_topic");
    obs.set(json!("newer_value"));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn publish_on_skip_initial_with_comparer() {
    let broker = TopicBroker::<Value>::new();
    let obs = Observable::shared(json!("test_value"));
    broker.bind(Arc::clone(&obs)).publish_on(
        "test_topic",
        PublishOptions::skip_initial().compare_with(|_: &Value, _: &CacheEntry<Value>| false),
    );
    assert!(broker.latest("test_topic").is_none());

    obs.set(json!("newer_value"));
    assert_eq!(broker.latest("test_topic"), Some(json!("newer_value")));
}

#[test]
fn custom_serializer_can_mask_changes() {
    let broker = TopicBroker::<Value>::new();
    broker.set_serializer(postbox::Serializer::from_fn(|_| "same".to_string()));
    let publisher = Observable::shared(json!(null));
    broker.bind(Arc::clone(&publisher)).publish_on("test_topic", PublishOptions::new());

    publisher.set(json!({"test": "test_value"}));
    let hits = count_publishes(&broker, "test_topic");
    // Different value, same serialized form: the default comparer still needs the
    // values to be equal, so this publishes.
    publisher.set(json!("newer_value"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    // Equal value and serialized form: suppressed.
    publisher.notify();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

/// A list shared by reference, compared by identity like a mutable array.
#[derive(Clone)]
struct SharedList(Arc<Mutex<Vec<String>>>);

impl PartialEq for SharedList {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Serialize for SharedList {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let items = self.0.lock().unwrap().clone();
        items.serialize(serializer)
    }
}

#[test]
fn shared_list_publishes_after_in_place_mutation_only() {
    let broker = TopicBroker::<SharedList>::new();
    let list = SharedList(Arc::new(Mutex::new(vec!["test_value".to_string()])));
    let obs = Observable::shared(list.clone());
    broker.bind(Arc::clone(&obs)).publish_on("test_topic", PublishOptions::new());

    let hits = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&hits);
    broker.subscribe("test_topic", move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    // Same reference, unchanged contents.
    obs.notify();
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    // Same reference, mutated in place.
    obs.mutate(|l| l.0.lock().unwrap().push("newer_value".to_string()));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn binding_reports_slots() {
    let broker = TopicBroker::<Value>::new();
    let binding = broker.bind(Observable::shared(json!(1)));
    binding
        .publish_on("b", PublishOptions::skip_initial())
        .subscribe_to("a", SubscribeToOptions::new());

    assert!(binding.is_publishing_on("b"));
    assert!(!binding.is_subscribed_to("b"));
    assert!(binding.is_subscribed_to("a"));
    let names: Vec<String> = binding.bound_topics().iter().map(ToString::to_string).collect();
    assert_eq!(names, vec!["a", "b"]);

    let sub = binding.subscription("a", Direction::SubscribeTo).unwrap();
    assert!(broker.is_registered(sub.id()));
    assert_eq!(binding.value().get(), json!(1));
}

#[test]
fn empty_topic_binding_is_noop() {
    let broker = TopicBroker::<Value>::new();
    let binding = broker.bind(Observable::shared(json!(1)));
    binding
        .publish_on("", PublishOptions::new())
        .subscribe_to("", SubscribeToOptions::latest())
        .sync_with("", postbox::SyncOptions::new())
        .stop_syncing_with("");
    assert_eq!(broker.subscription_count(), 0);
    assert_eq!(broker.cache_len(), 0);
    assert!(binding.bound_topics().is_empty());
}
