//! Pluggable value serialization.
//!
//! The serialized form of a published value is cached next to the value and is the
//! second half of the default "unchanged" check. It is a policy of the broker and can
//! be swapped at runtime.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{PostboxError, PostboxResult};

type SerializeFn<T> = dyn Fn(&T) -> PostboxResult<String> + Send + Sync;

/// Serialization policy turning a payload into its cached string form.
pub struct Serializer<T> {
    inner: Arc<SerializeFn<T>>,
}

impl<T> Clone for Serializer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Serializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Serializer").finish_non_exhaustive()
    }
}

impl<T: Serialize> Serializer<T> {
    /// Structural JSON serialization via `serde_json`.
    #[must_use]
    pub fn json() -> Self {
        Self {
            inner: Arc::new(|value: &T| serde_json::to_string(value).map_err(PostboxError::from)),
        }
    }
}

impl<T> Serializer<T> {
    /// Wrap an infallible serialization function.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(move |value: &T| Ok(f(value))),
        }
    }

    /// Wrap a fallible serialization function.
    pub fn try_from_fn<F>(f: F) -> Self
    where
        F: Fn(&T) -> PostboxResult<String> + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    /// Serialize, returning the underlying error on failure.
    pub fn try_serialize(&self, value: &T) -> PostboxResult<String> {
        (self.inner)(value)
    }

    /// Serialize, falling back to an empty string on failure.
    ///
    /// Failures are logged; publishing never fails because of the serializer.
    pub fn serialize(&self, value: &T) -> String {
        match self.try_serialize(value) {
            Ok(s) => s,
            Err(err) => {
                tracing::warn!(error = %err, "serializer failed; caching empty serialized form");
                String::new()
            }
        }
    }
}

impl<T: Serialize> Default for Serializer<T> {
    fn default() -> Self {
        Self::json()
    }
}
