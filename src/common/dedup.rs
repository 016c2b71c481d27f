//! Collapse concurrent duplicate asynchronous operations.
//!
//! An [`AsyncDeduplicator`] holds at most one in-flight operation. Callers that
//! arrive while it is pending attach to it and observe the same outcome; the
//! first caller after it settles (or after [`AsyncDeduplicator::invalidate`])
//! starts a new one.

use std::future::Future;
use std::sync::{Arc, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Handle to a pending operation; every clone resolves to the same result
pub type SharedFetch<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// The occupied state of a deduplicator: operation and controller live and die together
struct DedupSlot<T, E> {
    pending: SharedFetch<T, E>,
    controller: CancellationToken,
    generation: u64,
}

struct DedupState<T, E> {
    slot: Option<DedupSlot<T, E>>,
    next_generation: u64,
}

/// At-most-one in-flight operation per instance
pub struct AsyncDeduplicator<T, E> {
    state: Arc<Mutex<DedupState<T, E>>>,
    /// Debug name for this deduplicator (used in logging)
    name: String,
}

impl<T, E> AsyncDeduplicator<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_name("unnamed")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(DedupState {
                slot: None,
                next_generation: 0,
            })),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach to the pending operation, or start `fetcher` if there is none.
    ///
    /// `fetcher` is ignored while an operation is pending; it is assumed to be
    /// equivalent for a given instance. It receives a cancellation token that
    /// is cancelled by [`invalidate`](Self::invalidate); honouring it is up to
    /// the fetcher. The operation runs when the returned future is first polled.
    pub fn fetch<F, Fut>(&self, fetcher: F) -> SharedFetch<T, E>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let mut state = self.state.lock();

        if let Some(slot) = &state.slot {
            trace!(name = %self.name, generation = slot.generation, "Joining pending operation");
            return slot.pending.clone();
        }

        let generation = state.next_generation;
        state.next_generation += 1;

        let controller = CancellationToken::new();
        let signal = controller.clone();
        let owner: Weak<Mutex<DedupState<T, E>>> = Arc::downgrade(&self.state);
        let name = self.name.clone();

        let pending = async move {
            let result = fetcher(signal).await;

            if let Some(state) = owner.upgrade() {
                let mut state = state.lock();
                // A newer operation may own the slot after an invalidate
                if state.slot.as_ref().is_some_and(|s| s.generation == generation) {
                    state.slot = None;
                    trace!(name = %name, generation, "Pending operation settled");
                }
            }

            result
        }
        .boxed()
        .shared();

        debug!(name = %self.name, generation, "Starting new operation");
        state.slot = Some(DedupSlot {
            pending: pending.clone(),
            controller,
            generation,
        });

        pending
    }

    /// Cancel the pending operation's signal and forget it.
    ///
    /// Callers already attached keep waiting on the abandoned operation; the
    /// next [`fetch`](Self::fetch) starts a fresh one.
    pub fn invalidate(&self) {
        let slot = self.state.lock().slot.take();
        if let Some(slot) = slot {
            slot.controller.cancel();
            debug!(name = %self.name, generation = slot.generation, "Invalidated pending operation");
        }
    }

    /// Alias for [`invalidate`](Self::invalidate)
    pub fn cancel(&self) {
        self.invalidate();
    }

    /// Whether the slot holds an unsettled operation.
    ///
    /// Operations start on first poll, so a fetch whose future was dropped
    /// unpolled still counts as pending. The next [`fetch`](Self::fetch) joins
    /// and runs it; [`invalidate`](Self::invalidate) discards it.
    pub fn is_pending(&self) -> bool {
        self.state.lock().slot.is_some()
    }
}

impl<T, E> Default for AsyncDeduplicator<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
