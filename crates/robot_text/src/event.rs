// ==============================================================================
// Typed multicast events
// ==============================================================================
//
// Listener lifetimes are tied to the `Subscription` handle returned by `add`:
// dropping the handle unregisters the listener (a generation-counted registry,
// replacing the weak-method tracking of listener-owner lifetimes). A listener
// may carry a filter predicate that is evaluated per notification. A
// panicking listener is captured and logged; the remaining listeners still
// run. Listener ordering is unspecified.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Callback<T, R> = Arc<dyn Fn(&T) -> R + Send + Sync>;
type Filter<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

struct ListenerEntry<T, R> {
    id: u64,
    callback: Callback<T, R>,
    filter: Option<Filter<T>>,
}

struct EventInner<T, R> {
    listeners: Mutex<Vec<ListenerEntry<T, R>>>,
    next_id: AtomicU64,
}

/// A captured listener panic.
#[derive(Debug, Clone, thiserror::Error)]
#[error("event listener panicked: {0}")]
pub struct ListenerError(pub String);

pub struct Event<T, R = ()> {
    inner: Arc<EventInner<T, R>>,
}

impl<T, R> Default for Event<T, R> {
    fn default() -> Self {
        Self {
            inner: Arc::new(EventInner {
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }
}

impl<T, R> Clone for Event<T, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static, R: 'static> Event<T, R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, callback: impl Fn(&T) -> R + Send + Sync + 'static) -> Subscription {
        self.add_entry(Arc::new(callback), None)
    }

    /// Register a listener invoked only for notifications passing `filter`.
    pub fn add_filtered(
        &self,
        filter: impl Fn(&T) -> bool + Send + Sync + 'static,
        callback: impl Fn(&T) -> R + Send + Sync + 'static,
    ) -> Subscription {
        self.add_entry(Arc::new(callback), Some(Arc::new(filter)))
    }

    fn add_entry(&self, callback: Callback<T, R>, filter: Option<Filter<T>>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push(ListenerEntry {
            id,
            callback,
            filter,
        });
        let inner = Arc::downgrade(&self.inner);
        Subscription {
            remove: Box::new(move || {
                if let Some(inner) = Weak::upgrade(&inner) {
                    inner.listeners.lock().retain(|e| e.id != id);
                }
            }),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Snapshot the live listeners applicable to `arg`.
    fn snapshot(&self, arg: &T) -> Vec<Callback<T, R>> {
        self.inner
            .listeners
            .lock()
            .iter()
            .filter(|e| e.filter.as_ref().is_none_or(|f| f(arg)))
            .map(|e| e.callback.clone())
            .collect()
    }

    /// Invoke all listeners, collecting each result or captured panic.
    pub fn emit(&self, arg: &T) -> Vec<Result<R, ListenerError>> {
        self.iter(arg).collect()
    }

    /// Lazily streamed variant of `emit`.
    pub fn iter<'a>(&self, arg: &'a T) -> impl Iterator<Item = Result<R, ListenerError>> + 'a
    where
        T: 'a,
    {
        self.snapshot(arg).into_iter().map(move |callback| {
            catch_unwind(AssertUnwindSafe(|| callback(arg))).map_err(|payload| {
                let msg = panic_message(&payload);
                log::error!("event listener panicked: {msg}");
                ListenerError(msg)
            })
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle returned by `Event::add`; dropping it unregisters the listener.
pub struct Subscription {
    remove: Box<dyn FnOnce() + Send>,
}

impl Subscription {
    /// Keep the listener registered for the lifetime of the event itself.
    pub fn detach(self) {
        std::mem::forget(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let remove = std::mem::replace(&mut self.remove, Box::new(|| {}));
        remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn listeners_receive_emissions() {
        let event: Event<u32> = Event::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let _sub = event.add(move |v| {
            h.fetch_add(*v as usize, Ordering::SeqCst);
        });
        event.emit(&2);
        event.emit(&3);
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn dropping_subscription_unregisters() {
        let event: Event<u32> = Event::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = event.add(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        event.emit(&0);
        drop(sub);
        event.emit(&0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(event.listener_count(), 0);
    }

    #[test]
    fn filter_gates_notifications() {
        let event: Event<u32> = Event::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let _sub = event.add_filtered(
            |v| *v % 2 == 0,
            move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            },
        );
        event.emit(&1);
        event.emit(&2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_listener_does_not_stop_others() {
        let event: Event<u32> = Event::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let _a = event.add(|_| panic!("boom"));
        let _b = event.add(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let results = event.emit(&0);
        assert_eq!(results.len(), 2);
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn collecting_returns_listener_results() {
        let event: Event<u32, u32> = Event::new();
        let _a = event.add(|v| v + 1);
        let _b = event.add(|v| v * 2);
        let mut results: Vec<u32> = event.emit(&10).into_iter().map(|r| r.unwrap()).collect();
        results.sort_unstable();
        assert_eq!(results, vec![11, 20]);
    }
}
