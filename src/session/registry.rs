use std::collections::HashMap;
use std::sync::Mutex;

use super::events::{EventKind, LiveEvent};

pub type Listener = Box<dyn Fn(&LiveEvent) + Send + Sync>;

/// Listener registry: an ordered list of callbacks per event kind.
///
/// Dispatch is synchronous with receipt and preserves registration order.
/// Listeners run on the session's reader task, so they must not block; hand
/// heavy work to a channel instead.
#[derive(Default)]
pub struct EventRegistry {
    listeners: Mutex<HashMap<EventKind, Vec<Listener>>>,
}

impl EventRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for `kind`. Listeners for the same kind fire in
    /// the order they were registered.
    pub fn on<F>(&self, kind: EventKind, listener: F)
    where
        F: Fn(&LiveEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.entry(kind).or_default().push(Box::new(listener));
    }

    /// Invoke every listener registered for the event's kind.
    pub fn emit(&self, event: &LiveEvent) {
        let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(registered) = listeners.get(&event.kind()) {
            for listener in registered {
                listener(event);
            }
        }
    }

    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.get(&kind).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn listeners_fire_in_registration_order() {
        let registry = EventRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            registry.on(EventKind::Open, move |_| {
                order.lock().unwrap().push(tag);
            });
        }

        registry.emit(&LiveEvent::Open);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn emit_only_reaches_matching_kind() {
        let registry = EventRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        registry.on(EventKind::Interrupted, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        registry.emit(&LiveEvent::TurnComplete);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        registry.emit(&LiveEvent::Interrupted);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
