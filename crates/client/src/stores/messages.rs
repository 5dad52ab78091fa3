//! Conversation view merging REST-fetched history with live-pushed messages.
//!
//! The same logical message can arrive up to three times: in the history
//! fetch, as the REST send response, and as the live echo. The merge is
//! idempotent on the message id and keeps the sequence sorted ascending by
//! `created_at` regardless of arrival order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use lancelink_shared::{ChatMessage, ServerEvent};

use crate::api_client::ApiClient;
use crate::error::ApiError;
use crate::ws::{EventBus, EventKind, LiveEventClient, Subscription};

/// An event belongs to the conversation iff its (sender, recipient) pair is
/// (peer, me) or (me, peer).
pub(crate) fn belongs_to_conversation(
    message: &ChatMessage,
    user_id: &str,
    peer_id: &str,
) -> bool {
    (message.sender_id == peer_id && message.recipient_id == user_id)
        || (message.sender_id == user_id && message.recipient_id == peer_id)
}

/// Insert `message` at its sorted position unless an entry with the same id
/// already exists. Returns whether the message was added.
pub(crate) fn merge_message(messages: &mut Vec<ChatMessage>, message: ChatMessage) -> bool {
    if messages.iter().any(|m| m.id == message.id) {
        return false;
    }
    let pos = messages
        .binary_search_by(|m| m.created_at.cmp(&message.created_at))
        .unwrap_or_else(|pos| pos);
    messages.insert(pos, message);
    true
}

#[derive(Default)]
struct ConversationInner {
    messages: Vec<ChatMessage>,
    loaded: bool,
}

/// Synchronized view of the conversation with one peer.
///
/// Detaching (or dropping) deregisters the live listener and discards late
/// REST responses; it never closes the shared connection.
pub struct ConversationSync {
    api: ApiClient,
    bus: EventBus,
    user_id: String,
    peer_id: String,
    inner: Arc<Mutex<ConversationInner>>,
    alive: Arc<AtomicBool>,
    subscription: Option<Subscription>,
}

impl ConversationSync {
    /// Bind to a conversation and start listening for live messages.
    /// Requires an authenticated session.
    pub fn attach(
        api: ApiClient,
        live: &LiveEventClient,
        peer_id: impl Into<String>,
    ) -> Result<Self, ApiError> {
        let peer_id = peer_id.into();
        let user_id = api.session().user_id().ok_or(ApiError::SessionExpired)?;

        let inner = Arc::new(Mutex::new(ConversationInner::default()));
        let alive = Arc::new(AtomicBool::new(true));

        let subscription = {
            let inner = inner.clone();
            let alive = alive.clone();
            let user_id = user_id.clone();
            let peer_id = peer_id.clone();
            live.subscribe(EventKind::ChatMessage, move |event| {
                let ServerEvent::ChatMessage { message } = event else {
                    return;
                };
                if !alive.load(Ordering::SeqCst) {
                    return;
                }
                if !belongs_to_conversation(message, &user_id, &peer_id) {
                    return;
                }
                let mut inner = inner.lock().expect("conversation lock poisoned");
                merge_message(&mut inner.messages, message.clone());
            })
        };

        Ok(Self {
            api,
            bus: live.bus().clone(),
            user_id,
            peer_id,
            inner,
            alive,
            subscription: Some(subscription),
        })
    }

    /// Fetch the full history and merge it in. Live events that raced ahead
    /// of the fetch are preserved.
    pub async fn load_history(&self) -> Result<(), ApiError> {
        let history = self.api.conversation(&self.peer_id).await?;
        if !self.alive.load(Ordering::SeqCst) {
            // View was disposed while the fetch was in flight
            return Ok(());
        }
        let mut inner = self.inner.lock().expect("conversation lock poisoned");
        for message in history {
            merge_message(&mut inner.messages, message);
        }
        inner.loaded = true;
        Ok(())
    }

    /// Send through REST for the persistence guarantee and merge the result
    /// locally unless the live echo already landed.
    pub async fn send(&self, content: &str) -> Result<ChatMessage, ApiError> {
        let message = self.api.send_chat_message(&self.peer_id, content).await?;
        if self.alive.load(Ordering::SeqCst) {
            let mut inner = self.inner.lock().expect("conversation lock poisoned");
            merge_message(&mut inner.messages, message.clone());
        }
        Ok(message)
    }

    /// Explicit deletion against the REST layer; not reflected live, so the
    /// local entry is removed here.
    pub async fn delete(&self, message_id: &str) -> Result<(), ApiError> {
        self.api.delete_message(message_id).await?;
        let mut inner = self.inner.lock().expect("conversation lock poisoned");
        inner.messages.retain(|m| m.id != message_id);
        Ok(())
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.inner
            .lock()
            .expect("conversation lock poisoned")
            .messages
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.lock().expect("conversation lock poisoned").loaded
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Deregister the live listener and stop applying in-flight responses.
    pub fn detach(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(subscription) = self.subscription.take() {
            self.bus.unsubscribe(&subscription);
        }
    }
}

impl Drop for ConversationSync {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn message(id: &str, sender: &str, recipient: &str, t: i64) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            sender_id: sender.to_string(),
            recipient_id: recipient.to_string(),
            content: format!("msg {id}"),
            read: false,
            created_at: Utc.timestamp_opt(t, 0).unwrap(),
        }
    }

    #[test]
    fn merge_dedups_and_sorts_regardless_of_arrival_order() {
        let mut messages = Vec::new();
        // REST history: m1(t=1), m3(t=3)
        assert!(merge_message(&mut messages, message("m1", "a", "b", 1)));
        assert!(merge_message(&mut messages, message("m3", "b", "a", 3)));
        // Live: m2(t=2), then m3 again (duplicate)
        assert!(merge_message(&mut messages, message("m2", "a", "b", 2)));
        assert!(!merge_message(&mut messages, message("m3", "b", "a", 3)));

        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
        assert!(messages.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[test]
    fn merge_keeps_equal_timestamps_stable() {
        let mut messages = Vec::new();
        merge_message(&mut messages, message("m1", "a", "b", 5));
        merge_message(&mut messages, message("m2", "a", "b", 5));
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn relevance_predicate_matches_both_directions_only() {
        let inbound = message("m1", "peer", "me", 1);
        let outbound = message("m2", "me", "peer", 2);
        let other = message("m3", "peer", "someone-else", 3);
        assert!(belongs_to_conversation(&inbound, "me", "peer"));
        assert!(belongs_to_conversation(&outbound, "me", "peer"));
        assert!(!belongs_to_conversation(&other, "me", "peer"));
    }
}
