//! Named options for the binding operations.

use std::fmt;
use std::sync::Arc;

use crate::cache::CacheEntry;
use crate::comparer::Comparer;

/// Maps an incoming topic value before it is written into the bound value.
pub type Transform<T> = Arc<dyn Fn(&T) -> T + Send + Sync>;

/// Options for [`crate::Binding::publish_on`].
pub struct PublishOptions<T> {
    /// Do not publish the current value at bind time.
    pub skip_initial_publish: bool,
    /// Decides whether a change is republished.
    pub comparer: Comparer<T>,
}

impl<T> PublishOptions<T> {
    /// Publish initially, default comparer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip the publish at bind time.
    #[must_use]
    pub fn skip_initial() -> Self {
        Self::new().skip_initial_publish(true)
    }

    /// Set whether to skip the publish at bind time.
    #[must_use]
    pub fn skip_initial_publish(mut self, skip: bool) -> Self {
        self.skip_initial_publish = skip;
        self
    }

    /// Use `comparer` to suppress republishing.
    #[must_use]
    pub fn with_comparer(mut self, comparer: Comparer<T>) -> Self {
        self.comparer = comparer;
        self
    }

    /// Use a closure as the comparer.
    #[must_use]
    pub fn compare_with<F>(self, f: F) -> Self
    where
        F: Fn(&T, &CacheEntry<T>) -> bool + Send + Sync + 'static,
    {
        self.with_comparer(Comparer::custom(f))
    }
}

impl<T> Default for PublishOptions<T> {
    fn default() -> Self {
        Self {
            skip_initial_publish: false,
            comparer: Comparer::Default,
        }
    }
}

impl<T> Clone for PublishOptions<T> {
    fn clone(&self) -> Self {
        Self {
            skip_initial_publish: self.skip_initial_publish,
            comparer: self.comparer.clone(),
        }
    }
}

impl<T> fmt::Debug for PublishOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishOptions")
            .field("skip_initial_publish", &self.skip_initial_publish)
            .field("comparer", &self.comparer)
            .finish()
    }
}

/// Options for [`crate::Binding::subscribe_to`].
pub struct SubscribeToOptions<T> {
    /// Take the topic's cached value immediately at bind time.
    pub init_with_latest: bool,
    /// Applied to every incoming value, including the cached one.
    pub transform: Option<Transform<T>>,
}

impl<T> SubscribeToOptions<T> {
    /// Future values only, untransformed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the latest cached value.
    #[must_use]
    pub fn latest() -> Self {
        Self {
            init_with_latest: true,
            transform: None,
        }
    }

    /// Set whether to start from the latest cached value.
    #[must_use]
    pub fn init_with_latest(mut self, init: bool) -> Self {
        self.init_with_latest = init;
        self
    }

    /// Map incoming values through `f`.
    #[must_use]
    pub fn with_transform<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> T + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(f));
        self
    }
}

impl<T> Default for SubscribeToOptions<T> {
    fn default() -> Self {
        Self {
            init_with_latest: false,
            transform: None,
        }
    }
}

impl<T> Clone for SubscribeToOptions<T> {
    fn clone(&self) -> Self {
        Self {
            init_with_latest: self.init_with_latest,
            transform: self.transform.clone(),
        }
    }
}

impl<T> fmt::Debug for SubscribeToOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeToOptions")
            .field("init_with_latest", &self.init_with_latest)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

/// Options for [`crate::Binding::sync_with`].
///
/// There is no transform: mapping values on the way in would be republished on the
/// way out and never settle.
pub struct SyncOptions<T> {
    /// Take the topic's cached value immediately at bind time.
    pub init_with_latest: bool,
    /// Do not publish the current value at bind time.
    pub skip_initial_publish: bool,
    /// Decides whether a change is republished.
    pub comparer: Comparer<T>,
}

impl<T> SyncOptions<T> {
    /// Publish initially, no initial read, default comparer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the latest cached value.
    #[must_use]
    pub fn latest() -> Self {
        Self {
            init_with_latest: true,
            ..Self::default()
        }
    }

    /// Skip the publish at bind time.
    #[must_use]
    pub fn skip_initial() -> Self {
        Self::new().skip_initial_publish(true)
    }

    /// Set whether to start from the latest cached value.
    #[must_use]
    pub fn init_with_latest(mut self, init: bool) -> Self {
        self.init_with_latest = init;
        self
    }

    /// Set whether to skip the publish at bind time.
    #[must_use]
    pub fn skip_initial_publish(mut self, skip: bool) -> Self {
        self.skip_initial_publish = skip;
        self
    }

    /// Use `comparer` to suppress republishing.
    #[must_use]
    pub fn with_comparer(mut self, comparer: Comparer<T>) -> Self {
        self.comparer = comparer;
        self
    }

    pub(crate) fn split(self) -> (SubscribeToOptions<T>, PublishOptions<T>) {
        (
            SubscribeToOptions {
                init_with_latest: self.init_with_latest,
                transform: None,
            },
            PublishOptions {
                skip_initial_publish: self.skip_initial_publish,
                comparer: self.comparer,
            },
        )
    }
}

impl<T> Default for SyncOptions<T> {
    fn default() -> Self {
        Self {
            init_with_latest: false,
            skip_initial_publish: false,
            comparer: Comparer::Default,
        }
    }
}

impl<T> Clone for SyncOptions<T> {
    fn clone(&self) -> Self {
        Self {
            init_with_latest: self.init_with_latest,
            skip_initial_publish: self.skip_initial_publish,
            comparer: self.comparer.clone(),
        }
    }
}

impl<T> fmt::Debug for SyncOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOptions")
            .field("init_with_latest", &self.init_with_latest)
            .field("skip_initial_publish", &self.skip_initial_publish)
            .field("comparer", &self.comparer)
            .finish()
    }
}
