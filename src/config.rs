//! Broker configuration.

use serde::{Deserialize, Serialize};

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Name reported in diagnostics, useful when several brokers coexist in tests.
    pub name: String,
    /// Max nesting of publish calls made from inside subscriber callbacks.
    ///
    /// Deliveries beyond this depth are dropped (the cache is still written).
    pub max_publish_depth: usize,
    /// Default channel capacity for [`crate::TopicBroker::stream`].
    pub stream_capacity: usize,
    /// Emit trace events for silently ignored calls (missing topic, read-only target).
    pub log_noops: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            name: "postbox".to_string(),
            max_publish_depth: 64,
            stream_capacity: 1024,
            log_noops: true,
        }
    }
}

impl BrokerConfig {
    /// Default configuration under a different diagnostic name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}
