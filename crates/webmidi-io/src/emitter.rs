//! Listener registry shared by ports, channels and the registry.
//!
//! Each entity owns an [`EventEmitter`] and delegates its listener methods to it.
//! Callbacks are invoked after the internal lock is released, so a listener may add or
//! remove listeners (including itself) while it runs.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type Callback<P> = Arc<dyn Fn(&P) + Send + Sync>;

/// Handle returned by [`EventEmitter::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Number of calls before the listener removes itself. `None` keeps it forever.
    pub remaining: Option<u32>,
}

impl ListenerOptions {
    pub fn once() -> Self {
        Self { remaining: Some(1) }
    }

    pub fn times(count: u32) -> Self {
        Self {
            remaining: Some(count),
        }
    }
}

struct Listener<P> {
    id: ListenerId,
    callback: Callback<P>,
    remaining: Option<u32>,
    suspended: bool,
}

pub struct EventEmitter<K, P> {
    listeners: RwLock<HashMap<K, Vec<Listener<P>>>>,
    next_id: AtomicU64,
}

impl<K, P> Default for EventEmitter<K, P>
where
    K: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P> EventEmitter<K, P>
where
    K: Copy + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn add_listener<F>(&self, kind: K, callback: F, options: ListenerOptions) -> ListenerId
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().entry(kind).or_default().push(Listener {
            id,
            callback: Arc::new(callback),
            remaining: options.remaining,
            suspended: false,
        });
        id
    }

    pub fn has_listener(&self, kind: K, id: ListenerId) -> bool {
        self.listeners
            .read()
            .get(&kind)
            .is_some_and(|list| list.iter().any(|l| l.id == id))
    }

    /// Whether any listener is registered for `kind`.
    pub fn has_listeners(&self, kind: K) -> bool {
        self.listeners
            .read()
            .get(&kind)
            .is_some_and(|list| !list.is_empty())
    }

    pub fn listener_count(&self, kind: K) -> usize {
        self.listeners.read().get(&kind).map_or(0, Vec::len)
    }

    pub fn remove_listener(&self, kind: K, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(list) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|l| l.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(&kind);
        }
        removed
    }

    /// Removes every listener for `kind`, or every listener at all when `kind` is `None`.
    pub fn remove_all(&self, kind: Option<K>) {
        let mut listeners = self.listeners.write();
        match kind {
            Some(kind) => {
                listeners.remove(&kind);
            }
            None => listeners.clear(),
        }
    }

    /// Suspended listeners stay registered but are skipped by [`emit`](Self::emit).
    pub fn set_suspended(&self, kind: K, id: ListenerId, suspended: bool) -> bool {
        let mut listeners = self.listeners.write();
        match listeners
            .get_mut(&kind)
            .and_then(|list| list.iter_mut().find(|l| l.id == id))
        {
            Some(listener) => {
                listener.suspended = suspended;
                true
            }
            None => false,
        }
    }

    /// Calls every active listener for `kind`. Returns how many were called.
    pub fn emit(&self, kind: K, payload: &P) -> usize {
        let callbacks: Vec<Callback<P>> = {
            let mut listeners = self.listeners.write();
            let Some(list) = listeners.get_mut(&kind) else {
                return 0;
            };
            let mut callbacks = Vec::with_capacity(list.len());
            for listener in list.iter_mut().filter(|l| !l.suspended) {
                if let Some(remaining) = listener.remaining.as_mut() {
                    *remaining = remaining.saturating_sub(1);
                }
                callbacks.push(Arc::clone(&listener.callback));
            }
            list.retain(|l| l.remaining != Some(0));
            if list.is_empty() {
                listeners.remove(&kind);
            }
            callbacks
        };

        for callback in &callbacks {
            callback(payload);
        }
        callbacks.len()
    }
}
