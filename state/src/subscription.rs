//! Mutation, action and state-path subscribers

use modux_core::{ActionPayload, MutationPayload, Payload};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Called after every committed (non-silent) mutation with the new root state
pub type MutationSubscriber =
    dyn Fn(&MutationPayload, &Payload) -> anyhow::Result<()> + Send + Sync;

/// Called around every dispatched action
pub type ActionSubscriber = dyn Fn(&ActionEvent<'_>) -> anyhow::Result<()> + Send + Sync;

/// Where in the dispatch an action subscriber is being called
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionPhase {
    Before,
    After,
    Error,
}

/// What an action subscriber receives
#[derive(Debug)]
pub struct ActionEvent<'a> {
    pub phase: ActionPhase,
    pub action: &'a ActionPayload,
    pub state: &'a Payload,
    /// Set in the `After` phase
    pub result: Option<&'a Payload>,
    /// Set in the `Error` phase
    pub error: Option<&'a str>,
}

/// Options for state-path watchers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Fire once on subscribe with `(current, None)`
    pub immediate: bool,
    /// Compare full structure instead of the first level only
    pub deep: bool,
}

pub(crate) struct StateWatcher {
    pub select: Box<dyn Fn(&Payload) -> Payload + Send + Sync>,
    pub callback: Box<dyn Fn(&Payload, Option<&Payload>) -> anyhow::Result<()> + Send + Sync>,
    pub deep: bool,
    pub last: Mutex<Payload>,
}

type Entries<T> = Mutex<Vec<(u64, Arc<T>)>>;

/// Ordered subscriber list with removal by id
pub(crate) struct SubscriberList<T: ?Sized> {
    entries: Arc<Entries<T>>,
    next_id: AtomicU64,
}

impl<T: ?Sized + Send + Sync + 'static> SubscriberList<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn add(&self, item: Arc<T>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().push((id, item));

        let entries: Weak<Entries<T>> = Arc::downgrade(&self.entries);
        Subscription::new(move || {
            if let Some(entries) = entries.upgrade() {
                entries.lock().retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    /// Copy of the current list, so callbacks run without the lock held
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries.lock().iter().map(|(_, item)| item.clone()).collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Handle returned by every `subscribe_*` call
///
/// Dropping the handle keeps the subscription alive; call
/// [`Subscription::unsubscribe`] to remove it.
#[must_use = "keep the handle to be able to unsubscribe"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new(remove: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Callback = dyn Fn() -> u32 + Send + Sync;

    #[test]
    fn test_subscribers_keep_order_and_unsubscribe_by_handle() {
        let list: SubscriberList<Callback> = SubscriberList::new();
        let first = list.add(Arc::new(|| 1));
        let _second = list.add(Arc::new(|| 2));
        let _third = list.add(Arc::new(|| 3));

        let values: Vec<u32> = list.snapshot().iter().map(|f| f()).collect();
        assert_eq!(values, vec![1, 2, 3]);

        first.unsubscribe();
        let values: Vec<u32> = list.snapshot().iter().map(|f| f()).collect();
        assert_eq!(values, vec![2, 3]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_unsubscribe_after_list_dropped_is_noop() {
        let list: SubscriberList<Callback> = SubscriberList::new();
        let handle = list.add(Arc::new(|| 1));
        drop(list);
        handle.unsubscribe();
    }
}
