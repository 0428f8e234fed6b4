//! Registration events and listener dispatch.
//!
//! Every listener gets its own worker draining an unbounded channel.
//! `notify` only enqueues, so a slow or stuck listener never stalls a store
//! mutation or any other listener. Each listener sees events in the order
//! the store emitted them. Delivery is best-effort: events still queued
//! when the process exits are lost.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use apireg_core::Api;
use dashmap::DashMap;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Added,
    Removed,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Added => f.write_str("add"),
            EventKind::Removed => f.write_str("remove"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationEvent {
    pub kind: EventKind,
    pub api: Api,
}

impl RegistrationEvent {
    pub fn added(api: Api) -> Self {
        Self {
            kind: EventKind::Added,
            api,
        }
    }

    pub fn removed(api: Api) -> Self {
        Self {
            kind: EventKind::Removed,
            api,
        }
    }
}

/// Observer of registration changes.
pub trait RegistrationListener: Send + Sync + 'static {
    fn handle_registration(&self, event: &RegistrationEvent);
}

impl<F> RegistrationListener for F
where
    F: Fn(&RegistrationEvent) + Send + Sync + 'static,
{
    fn handle_registration(&self, event: &RegistrationEvent) {
        self(event)
    }
}

/// Handle returned by `ListenerStore::add`, used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct ListenerStore {
    listeners: DashMap<ListenerId, mpsc::UnboundedSender<RegistrationEvent>>,
    next_id: AtomicU64,
}

impl ListenerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener and start its worker.
    ///
    /// Inside a Tokio runtime the worker is a task; outside one it is a
    /// plain thread. Either way it exits once the listener is removed.
    pub fn add(&self, listener: Arc<dyn RegistrationListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, mut rx) = mpsc::unbounded_channel::<RegistrationEvent>();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    while let Some(event) = rx.recv().await {
                        listener.handle_registration(&event);
                    }
                });
            }
            Err(_) => {
                std::thread::spawn(move || {
                    while let Some(event) = rx.blocking_recv() {
                        listener.handle_registration(&event);
                    }
                });
            }
        }

        self.listeners.insert(id, tx);
        tracing::debug!(listener = id.0, "registration listener added");
        id
    }

    /// Returns false if the id was unknown.
    pub fn remove(&self, id: ListenerId) -> bool {
        let removed = self.listeners.remove(&id).is_some();
        if removed {
            tracing::debug!(listener = id.0, "registration listener removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Queue `event` for every listener. Never blocks.
    pub fn notify(&self, event: RegistrationEvent) {
        let mut dead = Vec::new();
        for entry in self.listeners.iter() {
            if entry.value().send(event.clone()).is_err() {
                dead.push(*entry.key());
            }
        }
        // Worker gone (listener panicked); stop queueing for it.
        for id in dead {
            self.listeners.remove(&id);
            tracing::warn!(listener = id.0, "listener worker exited, dropping listener");
        }
    }
}
