//! Listener registries
//!
//! A [`Registry`] is an ordered multicast list of callbacks for one concern. Every
//! `subscribe` returns a [`Subscription`] handle that removes exactly that callback.
//! [`EventRegistry`] keys independent registries by envelope tag.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use serde_json::Value;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Listeners<T> {
    label: String,
    next_id: AtomicU64,
    entries: RwLock<Vec<(u64, Callback<T>)>>,
}

impl<T> Listeners<T> {
    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }
}

/// Ordered multicast of `&T` to registered callbacks
///
/// Clones share the same listener list.
pub struct Registry<T> {
    inner: Arc<Listeners<T>>,
}

impl<T> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Registry<T> {
    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no callbacks are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> std::fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("label", &self.inner.label)
            .field("listeners", &self.len())
            .finish()
    }
}

impl<T: 'static> Registry<T> {
    /// Create an empty registry; `label` only shows up in logs
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Listeners {
                label: label.into(),
                next_id: AtomicU64::new(0),
                entries: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Register a callback; it runs after every callback registered before it
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));

        let weak: Weak<Listeners<T>> = Arc::downgrade(&self.inner);
        Subscription::new(move || weak.upgrade().is_some_and(|listeners| listeners.remove(id)))
    }

    /// Deliver `value` to every callback in subscription order
    ///
    /// Iterates a snapshot, so callbacks may subscribe or unsubscribe during delivery.
    /// A panicking callback is logged and skipped. Returns the number of callbacks
    /// that completed.
    pub fn emit(&self, value: &T) -> usize {
        let snapshot: Vec<Callback<T>> = self
            .inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        let mut delivered = 0;
        for (index, callback) in snapshot.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| callback(value))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    tracing::error!(
                        registry = %self.inner.label,
                        listener = index,
                        "listener panicked: {}",
                        panic_message(panic.as_ref())
                    );
                }
            }
        }
        delivered
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Handle to one registered callback
///
/// [`unsubscribe`](Subscription::unsubscribe) removes the callback; further calls are
/// no-ops. Dropping the handle unsubscribes as well.
#[must_use = "dropping a Subscription unsubscribes its listener"]
pub struct Subscription {
    remove: Mutex<Option<Box<dyn FnOnce() -> bool + Send>>>,
}

impl Subscription {
    fn new<F>(remove: F) -> Self
    where
        F: FnOnce() -> bool + Send + 'static,
    {
        Self {
            remove: Mutex::new(Some(Box::new(remove))),
        }
    }

    /// Remove the listener; returns `true` only on the call that actually removed it
    pub fn unsubscribe(&self) -> bool {
        let remove = self
            .remove
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        remove.is_some_and(|remove| remove())
    }

    /// Whether `unsubscribe` has not been called yet
    pub fn is_active(&self) -> bool {
        self.remove
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Registries of raw payloads keyed by the literal envelope tag
#[derive(Clone, Default)]
pub struct EventRegistry {
    registries: Arc<RwLock<HashMap<String, Registry<Value>>>>,
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registries = self
            .registries
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f.debug_map()
            .entries(registries.iter().map(|(kind, registry)| (kind, registry.len())))
            .finish()
    }
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for envelopes tagged `kind`
    pub fn subscribe<F>(&self, kind: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let registry = {
            let mut registries = self
                .registries
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            registries
                .entry(kind.to_string())
                .or_insert_with(|| Registry::new(format!("event:{kind}")))
                .clone()
        };
        registry.subscribe(callback)
    }

    /// Deliver a payload to the callbacks registered for `kind`, if any
    pub fn emit(&self, kind: &str, payload: &Value) -> usize {
        let registry = self
            .registries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .cloned();
        registry.map_or(0, |registry| registry.emit(payload))
    }

    /// Number of callbacks registered for `kind`
    pub fn listener_count(&self, kind: &str) -> usize {
        self.registries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .map_or(0, Registry::len)
    }
}
