//! Publish deduplication policy.
//!
//! A comparer answers "is this new value the same as what the topic already holds?".
//! `true` suppresses the publish.

use std::fmt;
use std::sync::Arc;

use crate::cache::CacheEntry;
use crate::serializer::Serializer;

/// Custom comparer function: `(new_value, cached_entry) -> unchanged`.
pub type CompareFn<T> = dyn Fn(&T, &CacheEntry<T>) -> bool + Send + Sync;

/// Comparer selection for a publishing binding.
pub enum Comparer<T> {
    /// Use the broker's current default comparer.
    Default,
    /// Use a specific policy.
    Custom(Arc<CompareFn<T>>),
}

impl<T> Comparer<T> {
    /// Wrap a custom policy.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&T, &CacheEntry<T>) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Whether this is the broker default.
    #[must_use]
    pub const fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }
}

impl<T: PartialEq> Comparer<T> {
    /// Decide whether `new_value` is unchanged relative to `entry`.
    ///
    /// Nothing cached means changed. `Default` falls back to `fallback` (the broker's
    /// configured default) or, when that is unset, to [`default_compare`].
    pub fn is_unchanged(
        &self,
        new_value: &T,
        entry: Option<&CacheEntry<T>>,
        serializer: &Serializer<T>,
        fallback: Option<&Arc<CompareFn<T>>>,
    ) -> bool {
        let Some(entry) = entry else {
            return false;
        };
        match (self, fallback) {
            (Self::Custom(f), _) | (Self::Default, Some(f)) => f(new_value, entry),
            (Self::Default, None) => default_compare(new_value, entry, serializer),
        }
    }
}

impl<T> Default for Comparer<T> {
    fn default() -> Self {
        Self::Default
    }
}

impl<T> Clone for Comparer<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Default => Self::Default,
            Self::Custom(f) => Self::Custom(Arc::clone(f)),
        }
    }
}

impl<T> fmt::Debug for Comparer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("Comparer::Default"),
            Self::Custom(_) => f.write_str("Comparer::Custom(..)"),
        }
    }
}

/// Built-in policy: equal to the cached value AND serializing to the cached form.
///
/// Equality is the payload's `PartialEq`; the serialized check catches a shared
/// container that was mutated in place after it was published.
pub fn default_compare<T: PartialEq>(new_value: &T, entry: &CacheEntry<T>, serializer: &Serializer<T>) -> bool {
    *new_value == entry.value && serializer.serialize(new_value) == entry.serialized
}
