// ── Context Engine: Event Bus ──────────────────────────────────────────────
//
// In-process pub/sub for context lifecycle events.
//
// Every sub-component (cache, memory, manager) is handed a clone of the same
// bus, so a single subscription sees all events regardless of which component
// produced them.
//
// Properties:
//   - Subscribers are kept per event type in registration order
//   - Unsubscribe is by (event type, listener id)
//   - Listeners receive `&ContextEvent` and cannot mutate the payload
//   - The listener list is snapshotted before dispatch, so a listener may
//     subscribe/unsubscribe without deadlocking the bus
//   - No cross-process delivery

use crate::atoms::types::{ContextEvent, ContextEventType};
use log::debug;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identity of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&ContextEvent) + Send + Sync>;

/// Shared context event bus. Clone is cheap (Arc clones).
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<RwLock<HashMap<ContextEventType, Vec<(ListenerId, Listener)>>>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one event type.
    pub fn subscribe<F>(&self, event_type: ContextEventType, listener: F) -> ListenerId
    where
        F: Fn(&ContextEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(event_type)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not registered for that type.
    pub fn unsubscribe(&self, event_type: ContextEventType, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(list) = listeners.get_mut(&event_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        before != list.len()
    }

    /// Deliver an event to every listener registered for its type.
    pub fn emit(&self, event: ContextEvent) {
        let snapshot: Vec<Listener> = match self.listeners.read().get(&event.event_type) {
            Some(list) => list.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return,
        };
        debug!(
            "[events] {} from {} → {} listener(s)",
            event.event_type,
            event.source,
            snapshot.len()
        );
        for listener in snapshot {
            listener(&event);
        }
    }

    /// Convenience: build and emit in one call.
    pub fn publish(
        &self,
        event_type: ContextEventType,
        source: &str,
        payload: serde_json::Value,
    ) {
        self.emit(ContextEvent::new(event_type, source, payload));
    }

    pub fn listener_count(&self, event_type: ContextEventType) -> usize {
        self.listeners
            .read()
            .get(&event_type)
            .map(|l| l.len())
            .unwrap_or(0)
    }

    /// Drop every listener (used on shutdown).
    pub fn clear(&self) {
        self.listeners.write().clear();
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<ContextEventType, usize> = self
            .listeners
            .read()
            .iter()
            .map(|(k, v)| (*k, v.len()))
            .collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}
