//! Listener registry for live events.
//!
//! The bus is shared by every view subscribed to the single duplex
//! connection. Handlers are keyed by event kind and invoked in registration
//! order; deregistration goes through the [`Subscription`] handle returned
//! at registration time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use lancelink_shared::ServerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ChatMessage,
    Notification,
}

impl EventKind {
    pub fn of(event: &ServerEvent) -> Self {
        match event {
            ServerEvent::ChatMessage { .. } => EventKind::ChatMessage,
            ServerEvent::NotificationNew { .. } => EventKind::Notification,
        }
    }
}

type Handler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

/// Handle identifying one registered listener.
#[derive(Debug)]
pub struct Subscription {
    kind: EventKind,
    id: u64,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    listeners: HashMap<EventKind, Vec<(u64, Handler)>>,
}

/// Process-wide dispatch point for events arriving on the live connection.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        kind: EventKind,
        handler: impl Fn(&ServerEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let mut inner = self.inner.lock().expect("event bus lock poisoned");
        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .listeners
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription { kind, id }
    }

    pub fn unsubscribe(&self, subscription: &Subscription) {
        let mut inner = self.inner.lock().expect("event bus lock poisoned");
        if let Some(handlers) = inner.listeners.get_mut(&subscription.kind) {
            handlers.retain(|(id, _)| *id != subscription.id);
        }
    }

    /// Invoke every handler registered for the event's kind, in registration
    /// order. Handlers run outside the registry lock so they may subscribe
    /// or unsubscribe reentrantly.
    pub fn dispatch(&self, event: &ServerEvent) {
        let handlers: Vec<Handler> = {
            let inner = self.inner.lock().expect("event bus lock poisoned");
            inner
                .listeners
                .get(&EventKind::of(event))
                .map(|handlers| handlers.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default()
        };
        for handler in handlers {
            handler(event);
        }
    }

    #[cfg(test)]
    fn listener_count(&self, kind: EventKind) -> usize {
        self.inner
            .lock()
            .unwrap()
            .listeners
            .get(&kind)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lancelink_shared::{ChatMessage, Notification, NotificationKind};

    fn chat_event(id: &str) -> ServerEvent {
        ServerEvent::ChatMessage {
            message: ChatMessage {
                id: id.to_string(),
                sender_id: "a".to_string(),
                recipient_id: "b".to_string(),
                content: "hi".to_string(),
                read: false,
                created_at: Utc::now(),
            },
        }
    }

    fn notification_event(id: &str) -> ServerEvent {
        ServerEvent::NotificationNew {
            notification: Notification {
                id: id.to_string(),
                kind: NotificationKind::Chat,
                sender_id: "a".to_string(),
                read: false,
                created_at: Utc::now(),
            },
        }
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = order.clone();
        let _sub1 = bus.subscribe(EventKind::ChatMessage, move |_| {
            first.lock().unwrap().push(1);
        });
        let second = order.clone();
        let _sub2 = bus.subscribe(EventKind::ChatMessage, move |_| {
            second.lock().unwrap().push(2);
        });

        bus.dispatch(&chat_event("m1"));
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn dispatch_only_reaches_matching_kind() {
        let bus = EventBus::new();
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        let _sub = bus.subscribe(EventKind::Notification, move |_| {
            *counter.lock().unwrap() += 1;
        });

        bus.dispatch(&chat_event("m1"));
        assert_eq!(*hits.lock().unwrap(), 0);
        bus.dispatch(&notification_event("n1"));
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let bus = EventBus::new();
        let hits = Arc::new(Mutex::new(Vec::new()));

        let a = hits.clone();
        let sub_a = bus.subscribe(EventKind::ChatMessage, move |_| {
            a.lock().unwrap().push("a");
        });
        let b = hits.clone();
        let _sub_b = bus.subscribe(EventKind::ChatMessage, move |_| {
            b.lock().unwrap().push("b");
        });

        bus.unsubscribe(&sub_a);
        assert_eq!(bus.listener_count(EventKind::ChatMessage), 1);

        bus.dispatch(&chat_event("m1"));
        assert_eq!(*hits.lock().unwrap(), vec!["b"]);
    }
}
