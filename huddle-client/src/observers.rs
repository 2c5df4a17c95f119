use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::error;

/// Token returned by a subscription; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

// Shared across all lists so a token can be matched against several of them.
static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

/// Ordered list of handlers for one event kind.
///
/// Handlers run synchronously in registration order. A panicking handler is
/// logged and the remaining handlers still run.
pub struct Observers<T> {
    name: &'static str,
    handlers: Mutex<Vec<(u64, Handler<T>)>>,
}

impl<T> Observers<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, Arc::new(handler)));
        Subscription(id)
    }

    /// Returns false when the token was not registered here.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut handlers = self.lock();
        let before = handlers.len();
        handlers.retain(|(id, _)| *id != subscription.0);
        handlers.len() != before
    }

    pub fn emit(&self, event: &T) {
        // Snapshot so a handler may (un)subscribe without deadlocking.
        let snapshot: Vec<Handler<T>> = self.lock().iter().map(|(_, h)| h.clone()).collect();

        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!("{} handler panicked; continuing with remaining handlers", self.name);
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Handler<T>)>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
