//! Notification feed with a derived unread count.
//!
//! The unread count is never stored: it is always computed as the number of
//! entries with `read == false`, which makes repeated mark-as-read calls
//! naturally idempotent and keeps the count from ever going negative.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use lancelink_shared::{Notification, ServerEvent};

use crate::api_client::ApiClient;
use crate::error::ApiError;
use crate::ws::{EventBus, EventKind, LiveEventClient, Subscription};

/// Upsert by id, keeping the list sorted newest first. A fetched copy
/// replaces a live-received one; a duplicate live push is a no-op insert.
pub(crate) fn upsert_notification(
    notifications: &mut Vec<Notification>,
    notification: Notification,
    replace_existing: bool,
) {
    if let Some(existing) = notifications
        .iter_mut()
        .find(|n| n.id == notification.id)
    {
        if replace_existing {
            *existing = notification;
        }
        return;
    }
    let pos = notifications
        .binary_search_by(|n| notification.created_at.cmp(&n.created_at))
        .unwrap_or_else(|pos| pos);
    notifications.insert(pos, notification);
}

/// Aggregated notification state for the current session.
pub struct NotificationFeed {
    api: ApiClient,
    bus: EventBus,
    inner: Arc<Mutex<Vec<Notification>>>,
    alive: Arc<AtomicBool>,
    subscription: Option<Subscription>,
}

impl NotificationFeed {
    /// Start listening for live notification events.
    pub fn attach(api: ApiClient, live: &LiveEventClient) -> Self {
        let inner = Arc::new(Mutex::new(Vec::new()));
        let alive = Arc::new(AtomicBool::new(true));

        let subscription = {
            let inner = inner.clone();
            let alive = alive.clone();
            live.subscribe(EventKind::Notification, move |event| {
                let ServerEvent::NotificationNew { notification } = event else {
                    return;
                };
                if !alive.load(Ordering::SeqCst) {
                    return;
                }
                let mut inner = inner.lock().expect("notification lock poisoned");
                upsert_notification(&mut inner, notification.clone(), false);
            })
        };

        Self {
            api,
            bus: live.bus().clone(),
            inner,
            alive,
            subscription: Some(subscription),
        }
    }

    /// Pull all notifications for the current session. The server copy wins
    /// over local state; live-received entries the server doesn't know yet
    /// are kept.
    pub async fn fetch(&self) -> Result<(), ApiError> {
        let fetched = self.api.notifications().await?;
        if !self.alive.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut inner = self.inner.lock().expect("notification lock poisoned");
        for notification in fetched {
            upsert_notification(&mut inner, notification, true);
        }
        Ok(())
    }

    /// Derived invariant: count of entries with `read == false`.
    pub fn unread_count(&self) -> usize {
        self.inner
            .lock()
            .expect("notification lock poisoned")
            .iter()
            .filter(|n| !n.read)
            .count()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.inner
            .lock()
            .expect("notification lock poisoned")
            .clone()
    }

    /// Flip the local read flag optimistically, then issue the REST
    /// mutation. A failure surfaces to the caller but does not roll the
    /// flag back.
    pub async fn mark_as_read(&self, notification_id: &str) -> Result<(), ApiError> {
        {
            let mut inner = self.inner.lock().expect("notification lock poisoned");
            if let Some(notification) =
                inner.iter_mut().find(|n| n.id == notification_id)
            {
                notification.read = true;
            }
        }
        self.api.mark_notification_read(notification_id).await
    }

    pub fn detach(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(subscription) = self.subscription.take() {
            self.bus.unsubscribe(&subscription);
        }
    }
}

impl Drop for NotificationFeed {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use lancelink_shared::NotificationKind;

    fn notification(id: &str, read: bool, t: i64) -> Notification {
        Notification {
            id: id.to_string(),
            kind: NotificationKind::Proposal,
            sender_id: "u2".to_string(),
            read,
            created_at: Utc.timestamp_opt(t, 0).unwrap(),
        }
    }

    #[test]
    fn upsert_orders_newest_first_and_dedups() {
        let mut list = Vec::new();
        upsert_notification(&mut list, notification("n1", false, 1), false);
        upsert_notification(&mut list, notification("n3", false, 3), false);
        upsert_notification(&mut list, notification("n2", false, 2), false);
        upsert_notification(&mut list, notification("n2", false, 2), false);
        let ids: Vec<&str> = list.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["n3", "n2", "n1"]);
    }

    #[test]
    fn fetched_copy_replaces_live_copy() {
        let mut list = Vec::new();
        upsert_notification(&mut list, notification("n1", false, 1), false);
        upsert_notification(&mut list, notification("n1", true, 1), true);
        assert!(list[0].read);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn unread_count_is_derived_and_floors_at_zero() {
        let mut list = vec![notification("n1", false, 1)];
        // Mark the same entry read twice, as two racing callers would
        for _ in 0..2 {
            if let Some(n) = list.iter_mut().find(|n| n.id == "n1") {
                n.read = true;
            }
        }
        let unread = list.iter().filter(|n| !n.read).count();
        assert_eq!(unread, 0);
    }
}
