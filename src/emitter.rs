//! Typed event handler tables
//!
//! Each router and route owns an [`Emitter`] keyed by its event kind enum.
//! Delivery is synchronous. Listeners of one event fire last-registered
//! first, and their errors are collected instead of stopping delivery.

use crate::error::RouteError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Event listener
pub type Listener<E> = Arc<dyn Fn(&E) -> Result<(), RouteError> + Send + Sync>;

/// Handle returned by `on`/`one`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Entry<K, E> {
    id: ListenerId,
    kind: K,
    once: bool,
    handler: Listener<E>,
}

pub struct Emitter<K, E> {
    entries: Mutex<Vec<Entry<K, E>>>,
    next_id: AtomicU64,
}

impl<K, E> Emitter<K, E>
where
    K: Copy + Eq,
{
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn register(&self, kind: K, once: bool, handler: Listener<E>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push(Entry {
            id,
            kind,
            once,
            handler,
        });
        id
    }

    /// Subscribe to every `kind` event
    pub fn on<F>(&self, kind: K, handler: F) -> ListenerId
    where
        F: Fn(&E) -> Result<(), RouteError> + Send + Sync + 'static,
    {
        self.register(kind, false, Arc::new(handler))
    }

    /// Subscribe to the next `kind` event only
    pub fn one<F>(&self, kind: K, handler: F) -> ListenerId
    where
        F: Fn(&E) -> Result<(), RouteError> + Send + Sync + 'static,
    {
        self.register(kind, true, Arc::new(handler))
    }

    /// Unsubscribe; returns false if the listener was already gone
    pub fn off(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    pub fn listener_count(&self, kind: K) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.kind == kind)
            .count()
    }

    /// Deliver `event` to the `kind` listeners and return their errors
    ///
    /// Handlers run outside the table lock, so they may subscribe or
    /// unsubscribe while being called.
    pub fn emit(&self, kind: K, event: &E) -> Vec<RouteError> {
        let handlers: Vec<Listener<E>> = {
            let mut entries = self.entries.lock();
            let handlers = entries
                .iter()
                .rev()
                .filter(|entry| entry.kind == kind)
                .map(|entry| Arc::clone(&entry.handler))
                .collect();
            entries.retain(|entry| !(entry.once && entry.kind == kind));
            handlers
        };

        handlers
            .iter()
            .filter_map(|handler| handler(event).err())
            .collect()
    }
}

impl<K: Copy + Eq, E> Default for Emitter<K, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, E> std::fmt::Debug for Emitter<K, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.entries.lock().len())
            .finish()
    }
}
