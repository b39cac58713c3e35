//! # postbox - topics for reactive values
//!
//! postbox is an in-process topic broker. Publishers push values onto named topics,
//! subscribers receive them synchronously, and each topic remembers the last value
//! published on it. Reactive values can be bound to topics so that their changes are
//! published automatically, so that they absorb what others publish, or both.
//!
//! ## Core Concepts
//!
//! - **Topic**: a named channel carrying one value per publish
//! - **TopicBroker**: publish/subscribe core with a last-value cache per topic
//! - **Comparer**: decides whether a changed value is worth publishing again
//! - **Binding**: a reactive value plus the topic subscriptions it owns
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use postbox::{Observable, Reactive, SubscribeToOptions, SyncOptions, TopicBroker};
//! use serde_json::json;
//!
//! let broker = TopicBroker::<serde_json::Value>::new();
//! broker.publish("section", json!("Profile"));
//!
//! let section = Observable::shared(json!(null));
//! let binding = broker.bind(Arc::clone(&section));
//! binding.subscribe_to("section", SubscribeToOptions::latest());
//! assert_eq!(section.get(), json!("Profile"));
//!
//! // Two values synced through the same topic converge.
//! let a = Observable::shared(json!("a@example.com"));
//! let b = Observable::shared(json!("b@example.com"));
//! broker.bind(Arc::clone(&a)).sync_with("email", SyncOptions::new());
//! broker.bind(Arc::clone(&b)).sync_with("email", SyncOptions::new());
//! a.set(json!("new@example.com"));
//! assert_eq!(b.get(), json!("new@example.com"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod binding;
pub mod broker;
pub mod cache;
pub mod comparer;
pub mod config;
pub mod error;
pub mod reactive;
pub mod serializer;
pub mod topic;

// Re-export primary types at crate root for convenience
pub use binding::{Binding, Direction, PublishOptions, SubscribeToOptions, SyncOptions, Transform};
pub use broker::{SubscribeOptions, Subscription, TopicBroker, TopicStream};
pub use cache::{CacheEntry, TopicCache};
pub use comparer::{default_compare, CompareFn, Comparer};
pub use config::BrokerConfig;
pub use error::{PostboxError, PostboxResult};
pub use reactive::{Computed, Listener, ListenerGuard, Observable, Reactive};
pub use serializer::Serializer;
pub use topic::{SubscriptionId, Topic};
