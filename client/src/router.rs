use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use crate::events::{EventKind, SyncEvent};

type Handler = Box<dyn FnMut(&SyncEvent) + Send>;

struct Entry {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct RouterInner {
    handlers: HashMap<EventKind, Vec<Entry>>,
    next_id: u64,
}

/// Demultiplexes events to registered handlers.
///
/// Dispatch is synchronous and sequential: `dispatch` invokes every handler
/// registered for the event's kind, in registration order, and returns only
/// once all of them have. Handlers run on the driver task and must not
/// block, and must not register or drop subscriptions from inside a
/// handler.
#[derive(Clone, Default)]
pub struct EventRouter {
    inner: Arc<Mutex<RouterInner>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind. The returned token keeps the
    /// registration alive; dropping it unregisters the handler.
    pub fn on(
        &self,
        kind: EventKind,
        handler: impl FnMut(&SyncEvent) + Send + 'static,
    ) -> Subscription {
        let id = {
            let Ok(mut inner) = self.inner.lock() else {
                return Subscription {
                    router: Weak::new(),
                    kind,
                    id: 0,
                };
            };
            let id = inner.next_id;
            inner.next_id += 1;
            inner.handlers.entry(kind).or_default().push(Entry {
                id,
                handler: Box::new(handler),
            });
            id
        };

        Subscription {
            router: Arc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    /// Deliver an event to every handler of its kind. Returns how many ran.
    pub fn dispatch(&self, event: &SyncEvent) -> usize {
        let kind = event.kind();
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        let Some(entries) = inner.handlers.get_mut(&kind) else {
            tracing::trace!(?kind, "no handlers registered");
            return 0;
        };

        for entry in entries.iter_mut() {
            (entry.handler)(event);
        }
        entries.len()
    }
}

/// RAII registration token. Screens acquire one on mount and drop it on
/// unmount, so a forgotten cleanup cannot leak a handler.
pub struct Subscription {
    router: Weak<Mutex<RouterInner>>,
    kind: EventKind,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(inner) = self.router.upgrade() else {
            return;
        };
        let Ok(mut inner) = inner.lock() else {
            return;
        };
        if let Some(entries) = inner.handlers.get_mut(&self.kind) {
            entries.retain(|entry| entry.id != self.id);
        }
    }
}
