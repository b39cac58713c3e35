//! Property-based invariant tests for the topic broker.
//!
//! 1. The cache holds the last value published on each topic.
//! 2. Subscribers see every publish on their topic, in order, and nothing else.
//! 3. Disposed subscriptions receive nothing further.
//! 4. Values synced through one topic agree after every write.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use postbox::{Observable, Reactive, SyncOptions, TopicBroker};
use proptest::prelude::*;
use serde_json::{json, Value};

// ── Helpers ─────────────────────────────────────────────────────────────

const TOPICS: [&str; 4] = ["alpha", "beta", "gamma", "delta"];

fn publish_strategy() -> impl Strategy<Value = (usize, i64)> {
    (0..TOPICS.len(), -50i64..=50)
}

fn publishes(max_len: usize) -> impl Strategy<Value = Vec<(usize, i64)>> {
    proptest::collection::vec(publish_strategy(), 0..=max_len)
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Cache holds the last value per topic
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn cache_holds_last_value(ops in publishes(40)) {
        let broker = TopicBroker::<Value>::new();
        let mut expected = BTreeMap::new();
        for (topic, n) in &ops {
            broker.publish(TOPICS[*topic], json!(n));
            expected.insert(TOPICS[*topic], json!(n));
        }

        prop_assert_eq!(broker.cache_len(), expected.len());
        for (topic, value) in &expected {
            let entry = broker.cache_entry(topic).unwrap();
            prop_assert_eq!(&entry.value, value);
            prop_assert_eq!(entry.serialized, value.to_string());
        }
        let cached: Vec<String> = broker.cached_topics().iter().map(ToString::to_string).collect();
        let names: Vec<String> = expected.keys().map(ToString::to_string).collect();
        prop_assert_eq!(cached, names);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Subscribers see their topic's publishes in order
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn subscribers_see_their_topic_in_order(ops in publishes(40), watched in 0..TOPICS.len()) {
        let broker = TopicBroker::<Value>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        broker.subscribe(TOPICS[watched], move |v: &Value| sink.lock().unwrap().push(v.clone()));

        for (topic, n) in &ops {
            broker.publish(TOPICS[*topic], json!(n));
        }

        let expected: Vec<Value> = ops
            .iter()
            .filter(|(topic, _)| *topic == watched)
            .map(|(_, n)| json!(n))
            .collect();
        prop_assert_eq!(seen.lock().unwrap().clone(), expected);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Nothing is delivered after dispose
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn nothing_after_dispose(before in publishes(20), after in publishes(20)) {
        let broker = TopicBroker::<Value>::new();
        let count = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&count);
        let sub = broker.subscribe(TOPICS[0], move |_| *sink.lock().unwrap() += 1).unwrap();

        for (topic, n) in &before {
            broker.publish(TOPICS[*topic], json!(n));
        }
        let delivered = *count.lock().unwrap();
        sub.dispose();
        for (topic, n) in &after {
            broker.publish(TOPICS[*topic], json!(n));
        }

        prop_assert_eq!(*count.lock().unwrap(), delivered);
        prop_assert!(!broker.is_registered(sub.id()));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Synced values agree after every write
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn synced_values_agree(writes in proptest::collection::vec((any::<bool>(), -20i64..=20), 0..=30)) {
        let broker = TopicBroker::<Value>::new();
        let a = Observable::shared(json!(0));
        let b = Observable::shared(json!(0));
        broker.bind(Arc::clone(&a)).sync_with("shared", SyncOptions::new());
        broker.bind(Arc::clone(&b)).sync_with("shared", SyncOptions::new());

        for (to_a, n) in writes {
            let target = if to_a { &a } else { &b };
            target.set(json!(n));
            prop_assert_eq!(a.get(), json!(n));
            prop_assert_eq!(b.get(), json!(n));
            prop_assert_eq!(broker.latest("shared"), Some(json!(n)));
        }
    }
}
