use crate::models::Subscription;
use parking_lot::Mutex;
use std::collections::HashSet;

/// Set of desired order-book subscriptions, replayed after every reconnect.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: Mutex<HashSet<Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the pair was already registered.
    pub fn insert(&self, sub: Subscription) -> bool {
        self.entries.lock().insert(sub)
    }

    pub fn remove(&self, sub: &Subscription) -> bool {
        self.entries.lock().remove(sub)
    }

    /// Snapshot of every entry, in no particular order.
    pub fn all(&self) -> Vec<Subscription> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
