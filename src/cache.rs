//! Last-value cache, one entry per topic.
//!
//! Entries are created by publish only and live until the broker is reset.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::topic::Topic;

/// The most recent value published on a topic, with its serialized form.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    /// The value as handed to publish.
    pub value: T,
    /// Serialized form computed at publish time.
    pub serialized: String,
    /// When the value was published.
    pub published_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    /// Create an entry stamped with the current time.
    #[must_use]
    pub fn new(value: T, serialized: String) -> Self {
        Self {
            value,
            serialized,
            published_at: Utc::now(),
        }
    }
}

/// Thread-safe map from topic to its latest [`CacheEntry`].
///
/// Reads clone entries out so no lock is held while callers compare or deliver.
#[derive(Debug)]
pub struct TopicCache<T> {
    entries: RwLock<HashMap<Topic, CacheEntry<T>>>,
}

impl<T> Default for TopicCache<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: Clone> TopicCache<T> {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the entry for `topic`.
    pub fn put(&self, topic: Topic, entry: CacheEntry<T>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(topic, entry);
    }

    /// A copy of the entry for `topic`, if anything was published on it.
    #[must_use]
    pub fn get(&self, topic: &Topic) -> Option<CacheEntry<T>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .cloned()
    }

    /// Whether `topic` has a cached value.
    #[must_use]
    pub fn contains(&self, topic: &Topic) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(topic)
    }

    /// Topics with a cached value, sorted by name.
    #[must_use]
    pub fn topics(&self) -> Vec<Topic> {
        let mut out: Vec<Topic> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        out.sort();
        out
    }

    /// Number of cached topics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True when nothing has been published since creation or the last clear.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
