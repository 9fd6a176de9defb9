//! Single-flight execution for lazily initialised shared resources
//!
//! A [`SingleFlight`] guarantees that at most one instance of an operation is
//! in progress at a time. Callers arriving while it runs await the same
//! outcome instead of starting their own. Once the operation settles the slot
//! is cleared, so a later call (for example after a failure) starts afresh.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

struct InFlight<T: Clone> {
    generation: u64,
    future: Shared<BoxFuture<'static, T>>,
}

/// Shares one in-progress operation between concurrent callers
pub struct SingleFlight<T: Clone> {
    slot: Mutex<Option<InFlight<T>>>,
    generation: AtomicU64,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty single-flight slot
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Whether an operation is currently in progress
    pub fn is_in_flight(&self) -> bool {
        self.lock().is_some()
    }

    /// Run `make()` unless an operation is already in flight, in which case
    /// wait for that one instead
    ///
    /// `make` is only invoked by the caller that installs the operation.
    pub async fn run<F, Fut>(&self, make: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (generation, future) = {
            let mut slot = self.lock();
            match slot.as_ref() {
                Some(in_flight) => (in_flight.generation, in_flight.future.clone()),
                None => {
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                    let future = make().boxed().shared();
                    *slot = Some(InFlight {
                        generation,
                        future: future.clone(),
                    });
                    (generation, future)
                }
            }
        };

        let output = future.await;

        let mut slot = self.lock();
        if slot.as_ref().map(|f| f.generation) == Some(generation) {
            *slot = None;
        }
        output
    }

    fn lock(&self) -> MutexGuard<'_, Option<InFlight<T>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
