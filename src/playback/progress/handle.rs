use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use tokio::sync::mpsc as tokio_mpsc;
use tracing::debug;

type SubscriptionId = u64;

struct Subscription<T> {
    tx: tokio_mpsc::UnboundedSender<T>,
}

/// Fan-out of progress events to any number of subscribers
///
/// Publishing is synchronous, so it can be called from the single-threaded playback core.
/// A subscription is removed the first time a send to it fails (receiver dropped).
pub struct ProgressHandle<T> {
    subscriptions: Arc<Mutex<HashMap<SubscriptionId, Subscription<T>>>>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for ProgressHandle<T> {
    fn clone(&self) -> Self {
        Self {
            subscriptions: self.subscriptions.clone(),
            next_id: self.next_id.clone(),
        }
    }
}

impl<T> Default for ProgressHandle<T> {
    fn default() -> Self {
        Self {
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl<T: Clone> ProgressHandle<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to all progress updates
    /// Subscription is automatically removed when receiver is dropped
    pub fn subscribe_all(&self) -> tokio_mpsc::UnboundedReceiver<T> {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, Subscription { tx });
        rx
    }

    pub fn publish(&self, progress: T) {
        let mut subs = self
            .subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut to_remove = Vec::new();
        for (id, subscription) in subs.iter() {
            if subscription.tx.send(progress.clone()).is_err() {
                to_remove.push(*id);
            }
        }

        for id in to_remove {
            debug!("Dropping closed progress subscription {}", id);
            subs.remove(&id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
