//! Per-category subscribe/publish broker with replay of the last value.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, error};

use super::subscription::Subscription;

/// Receiver of events for one category.
///
/// Closures `Fn(&T) + Send + Sync` implement this trait directly.
pub trait Observer<T>: Send + Sync {
    /// Called once per published event.
    fn on_event(&self, event: &T);
}

impl<T, F> Observer<T> for F
where
    F: Fn(&T) + Send + Sync,
{
    fn on_event(&self, event: &T) {
        self(event)
    }
}

/// Shared handle to an observer.
pub type ObserverRef<T> = Arc<dyn Observer<T>>;

/// Identifier handed out by [`ObserverRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Lock serializing publishes and replays.
///
/// Reentrant so that an observer may register, unregister, or trigger a
/// nested publish from inside its own callback.
pub type DispatchLock = Arc<ReentrantMutex<()>>;

struct RegistryInner<T> {
    observers: Vec<(ObserverId, ObserverRef<T>)>,
    last: Option<T>,
    next_id: u64,
}

/// Subscriber list and last-value cache for one event category.
///
/// # Delivery rules
///
/// - `publish` caches the value, then calls every observer registered at the
///   moment of the call, in registration order. Observers added or removed
///   during the fan-out do not change who receives that value.
/// - `register` synchronously replays the cached value (if any) to the new
///   observer before returning.
/// - A panicking observer is logged and skipped; the rest still receive the
///   event.
///
/// The subscriber list is guarded by its own mutex, held only to copy or
/// edit the list, never while calling observers.
pub struct ObserverRegistry<T> {
    name: &'static str,
    dispatch: DispatchLock,
    inner: Mutex<RegistryInner<T>>,
    failures: AtomicU64,
}

impl<T> std::fmt::Debug for ObserverRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ObserverRegistry")
            .field("name", &self.name)
            .field("observers", &inner.observers.len())
            .field("has_last", &inner.last.is_some())
            .field("failures", &self.failures.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T> ObserverRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a registry with its own dispatch lock.
    pub fn new(name: &'static str) -> Self {
        Self::with_dispatch(name, Arc::new(ReentrantMutex::new(())))
    }

    /// Create a registry that serializes dispatch on a shared lock.
    ///
    /// Registries sharing a lock never interleave their deliveries.
    pub fn with_dispatch(name: &'static str, dispatch: DispatchLock) -> Self {
        Self {
            name,
            dispatch,
            inner: Mutex::new(RegistryInner {
                observers: Vec::new(),
                last: None,
                next_id: 0,
            }),
            failures: AtomicU64::new(0),
        }
    }

    /// Category name used in logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register an observer and replay the last value to it.
    ///
    /// Registering an observer that is already present is a no-op and
    /// returns its existing id.
    pub fn register(&self, observer: ObserverRef<T>) -> ObserverId {
        let _dispatch = self.dispatch.lock();

        let (id, replay) = {
            let mut inner = self.inner.lock();
            if let Some((existing, _)) = inner
                .observers
                .iter()
                .find(|(_, o)| same_observer(o, &observer))
            {
                return *existing;
            }
            let id = ObserverId(inner.next_id);
            inner.next_id += 1;
            inner.observers.push((id, Arc::clone(&observer)));
            (id, inner.last.clone())
        };

        debug!(category = self.name, observer = id.0, "Observer registered");

        if let Some(value) = replay {
            self.deliver(id, &observer, &value);
        }
        id
    }

    /// Register an observer and return a guard that unregisters it on drop.
    pub fn subscribe(self: &Arc<Self>, observer: ObserverRef<T>) -> Subscription {
        let id = self.register(observer);
        let registry = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.unregister(id);
            }
        })
    }

    /// Remove an observer by id. Returns `false` if it was not registered.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.observers.len();
        inner.observers.retain(|(existing, _)| *existing != id);
        let removed = inner.observers.len() != before;
        if removed {
            debug!(category = self.name, observer = id.0, "Observer unregistered");
        }
        removed
    }

    /// Remove an observer by identity. Returns `false` if it was not registered.
    pub fn unregister_observer(&self, observer: &ObserverRef<T>) -> bool {
        let id = {
            let inner = self.inner.lock();
            inner
                .observers
                .iter()
                .find(|(_, o)| same_observer(o, observer))
                .map(|(id, _)| *id)
        };
        match id {
            Some(id) => self.unregister(id),
            None => false,
        }
    }

    /// Cache `value` and deliver it to every currently registered observer.
    pub fn publish(&self, value: T) {
        let _dispatch = self.dispatch.lock();

        let snapshot = {
            let mut inner = self.inner.lock();
            inner.last = Some(value.clone());
            inner.observers.clone()
        };

        for (id, observer) in &snapshot {
            self.deliver(*id, observer, &value);
        }
    }

    /// Last published value.
    pub fn last(&self) -> Option<T> {
        self.inner.lock().last.clone()
    }

    /// Forget the last published value so new observers get no replay.
    pub fn clear_last(&self) {
        let _dispatch = self.dispatch.lock();
        self.inner.lock().last = None;
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.inner.lock().observers.len()
    }

    /// Whether no observers are registered.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().observers.is_empty()
    }

    /// Number of observer callbacks that panicked.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn deliver(&self, id: ObserverId, observer: &ObserverRef<T>, value: &T) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| observer.on_event(value)));
        if let Err(payload) = outcome {
            self.failures.fetch_add(1, Ordering::Relaxed);
            error!(
                category = self.name,
                observer = id.0,
                panic = panic_message(&payload),
                "Observer failed, continuing dispatch"
            );
        }
    }
}

/// Compare observers by the address of their data, ignoring vtables.
fn same_observer<T>(a: &ObserverRef<T>, b: &ObserverRef<T>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
