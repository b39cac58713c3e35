use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError, TrySendError};

use crate::error::{PostboxError, PostboxResult};
use crate::topic::Topic;

use super::{Subscription, SubscribeOptions, TopicBroker};

/// A topic subscription read through a bounded channel.
///
/// Publishing never blocks on a slow reader: values that do not fit are dropped
/// and counted. Dropping the stream disposes the subscription.
#[derive(Debug)]
pub struct TopicStream<T> {
    subscription: Subscription,
    rx: Receiver<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> TopicStream<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub(crate) fn open(broker: &TopicBroker<T>, topic: Topic, options: SubscribeOptions, capacity: usize) -> Self {
        let (tx, rx) = bounded::<T>(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&dropped);
        let subscription = broker.subscribe_to_topic(
            topic,
            options,
            Arc::new(move |value: &T| match tx.try_send(value.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            }),
            None,
        );

        Self {
            subscription,
            rx,
            dropped,
        }
    }
}

impl<T> TopicStream<T> {
    /// The underlying subscription.
    #[must_use]
    pub const fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Values dropped because the channel was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop receiving new values. Already buffered values can still be read. Idempotent.
    pub fn unsubscribe(&self) {
        self.subscription.dispose();
    }

    /// Receive the next value (blocking).
    ///
    /// Fails once the subscription is disposed and the buffer is drained.
    pub fn recv(&self) -> PostboxResult<T> {
        self.rx.recv().map_err(|_| self.disconnected())
    }

    /// Receive a buffered value without blocking.
    pub fn try_recv(&self) -> PostboxResult<Option<T>> {
        match self.rx.try_recv() {
            Ok(value) => Ok(Some(value)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(self.disconnected()),
        }
    }

    /// Receive the next value with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> PostboxResult<T> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => PostboxError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            RecvTimeoutError::Disconnected => self.disconnected(),
        })
    }

    fn disconnected(&self) -> PostboxError {
        PostboxError::Disconnected {
            topic: self.subscription.topic().to_string(),
        }
    }
}

impl<T> Drop for TopicStream<T> {
    fn drop(&mut self) {
        self.subscription.dispose();
    }
}
