//! Lazily constructed service clients.
//!
//! # Responsibilities
//! - Defer client construction until the first `client()` call
//! - Run the initializer exactly once, even under concurrent first access
//! - Return the same realized value to every caller
//!
//! Backed by `OnceLock`: callers racing the first initialization block until it
//! finishes, later callers read the value without synchronization cost.

use std::fmt;
use std::sync::OnceLock;

use crate::observability::metrics;

type Initializer<T> = Box<dyn Fn() -> T + Send + Sync>;

/// A client of type `T` built on first use.
pub struct LazyClient<T> {
    name: &'static str,
    init: Initializer<T>,
    cell: OnceLock<T>,
}

impl<T> LazyClient<T> {
    /// Create a lazy slot that builds its value with `init`.
    pub fn new<F>(name: &'static str, init: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            name,
            init: Box::new(init),
            cell: OnceLock::new(),
        }
    }

    /// Return the client, constructing it if this is the first call.
    pub fn client(&self) -> &T {
        self.cell.get_or_init(|| {
            tracing::debug!(service = self.name, "Initializing service client");
            metrics::record_lazy_client_init(self.name);
            (self.init)()
        })
    }

    /// Return the client only if it has already been constructed.
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    /// Whether the initializer has run.
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    /// The name this slot was registered under.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: fmt::Debug> fmt::Debug for LazyClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyClient")
            .field("name", &self.name)
            .field("client", &self.cell.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    #[derive(Debug)]
    struct FakeClient {
        id: usize,
    }

    #[test]
    fn test_initializes_once_under_concurrency() {
        const CALLERS: usize = 32;

        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let lazy = Arc::new(LazyClient::new("test", move || {
            let id = c.fetch_add(1, Ordering::SeqCst);
            // Widen the window in which other callers arrive mid-initialization.
            thread::sleep(Duration::from_millis(20));
            Arc::new(FakeClient { id })
        }));

        let barrier = Arc::new(Barrier::new(CALLERS));
        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let lazy = Arc::clone(&lazy);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    Arc::clone(lazy.client())
                })
            })
            .collect();

        let clients: Vec<Arc<FakeClient>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let first = &clients[0];
        assert_eq!(first.id, 0);
        for client in &clients {
            assert!(Arc::ptr_eq(first, client));
        }
    }

    #[test]
    fn test_not_built_until_used() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let lazy = LazyClient::new("unused", move || c.fetch_add(1, Ordering::SeqCst));

        assert!(!lazy.is_initialized());
        assert!(lazy.get().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(*lazy.client(), 0);
        assert_eq!(*lazy.client(), 0);
        assert!(lazy.is_initialized());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.name(), "unused");
    }
}
