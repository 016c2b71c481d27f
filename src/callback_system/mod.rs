//! Callback management built on Tokio's unbounded mpsc channels.
//!
//! Each registered callback gets its own queue and listener task, so one slow
//! or failing callback never blocks the others, no event is dropped, and every
//! callback sees events in the order they were triggered.


use std::{fmt, sync::Arc};

use anyhow::Context;
use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};
use uuid::Uuid;

/// Type for callback IDs
pub type CallbackId = Uuid;

/// Trait for types that can be used in callbacks
pub trait CallbackData: Clone + Send + Sync + 'static + fmt::Debug {}

impl<T> CallbackData for T where T: Clone + Send + Sync + 'static + fmt::Debug {}

/// Queue and task of one registered callback
struct Listener<T> {
    sender: mpsc::UnboundedSender<T>,
    handle: JoinHandle<()>,
}

/// Fan-out of events of type `T` to registered callbacks
#[derive(Clone)]
pub struct CallbackRegistry<T: CallbackData> {
    /// Optional group identifier used in logs
    group: Option<String>,

    /// Listener per callback, aborted on unregister
    listeners: Arc<DashMap<CallbackId, Listener<T>>>,
}

impl<T: CallbackData> CallbackRegistry<T> {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a registry whose log lines carry `group`
    pub fn with_group(group: &str) -> Self {
        Self::build(Some(group.to_string()))
    }

    fn build(group: Option<String>) -> Self {
        Self {
            group,
            listeners: Arc::new(DashMap::new()),
        }
    }

    fn group_name(&self) -> &str {
        self.group.as_deref().unwrap_or("default")
    }

    /// Register a callback; it receives every event triggered after this returns.
    ///
    /// Fails when called outside a Tokio runtime, since the listener task has
    /// nowhere to run.
    pub fn register<F>(&self, callback: F) -> anyhow::Result<CallbackId>
    where
        F: Fn(T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let runtime = Handle::try_current().context("Callbacks can only be registered inside a Tokio runtime")?;

        let id = Uuid::new_v4();
        let (sender, mut receiver) = mpsc::unbounded_channel::<T>();
        let group = self.group_name().to_string();

        let handle = runtime.spawn(async move {
            debug!(callback_id = %id, group = %group, "Started callback listener");

            while let Some(data) = receiver.recv().await {
                if let Err(e) = callback(data) {
                    error!(callback_id = %id, group = %group, error = %e, "Callback execution failed");
                }
            }

            // Sender dropped along with the registry
            debug!(callback_id = %id, group = %group, "Callback listener stopped");
        });

        self.listeners.insert(id, Listener { sender, handle });
        debug!(callback_id = %id, group = %self.group_name(), "Registered callback");

        Ok(id)
    }

    /// Unregister a callback by ID; returns whether it was registered
    pub fn unregister(&self, id: CallbackId) -> bool {
        match self.listeners.remove(&id) {
            Some((_, listener)) => {
                listener.handle.abort();
                debug!(callback_id = %id, group = %self.group_name(), "Unregistered callback");
                true
            }
            None => {
                debug!(
                    callback_id = %id,
                    group = %self.group_name(),
                    "Attempted to unregister non-existent callback"
                );
                false
            }
        }
    }

    /// Queue `data` for every registered callback; returns how many listeners it was queued for
    pub fn trigger(&self, data: T) -> anyhow::Result<usize> {
        let mut delivered = 0;
        let mut closed = Vec::new();

        for entry in self.listeners.iter() {
            match entry.value().sender.send(data.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => closed.push(*entry.key()),
            }
        }

        for id in closed {
            trace!(callback_id = %id, group = %self.group_name(), "Dropping closed callback listener");
            self.listeners.remove(&id);
        }

        debug!(group = %self.group_name(), delivered, "Triggered callbacks");
        Ok(delivered)
    }

    /// Number of registered callbacks
    pub fn count(&self) -> usize {
        self.listeners.len()
    }

    /// Unregister every callback
    pub fn clear(&self) {
        let ids: Vec<CallbackId> = self.listeners.iter().map(|entry| *entry.key()).collect();
        let count = ids.len();
        for id in ids {
            if let Some((_, listener)) = self.listeners.remove(&id) {
                listener.handle.abort();
            }
        }
        debug!(group = %self.group_name(), count, "Cleared all callbacks");
    }
}

impl<T: CallbackData> Default for CallbackRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
