//! Live event client: the single duplex connection shared by all views.
//!
//! Any view may call [`LiveEventClient::connect`]; the call is idempotent and
//! the underlying connection is process-wide. Nobody should call
//! [`LiveEventClient::disconnect`] except on full session logout, since peers
//! depend on the connection's availability. Views receive events through the
//! shared [`EventBus`] and deregister their own listeners on teardown.

mod connection;
mod events;

pub use connection::{ConnectionState, ReconnectConfig};
pub use events::{EventBus, EventKind, Subscription};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_channel::mpsc::{unbounded, UnboundedSender};
use tokio::sync::watch;

use lancelink_shared::{ClientCommand, ServerEvent, WsEnvelope};

use crate::config::ClientConfig;
use crate::session::SessionStore;

use connection::{set_state, ConnectionLoop, SharedState};

/// A send attempted while the connection is down fails visibly instead of
/// being queued indefinitely.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("live connection is not established")]
    NotConnected,
    #[error("live connection is shutting down")]
    ChannelClosed,
}

struct ConnHandle {
    sender: UnboundedSender<WsEnvelope<ClientCommand>>,
    shutdown: watch::Sender<bool>,
    // Distinguishes this handle from handles of earlier connection loops so
    // a stale loop's cleanup cannot evict a newer connection.
    generation: u64,
}

#[derive(Clone)]
pub struct LiveEventClient {
    config: ClientConfig,
    session: SessionStore,
    bus: EventBus,
    state: SharedState,
    conn: Arc<Mutex<Option<ConnHandle>>>,
    generation: Arc<AtomicU64>,
}

impl LiveEventClient {
    pub fn new(config: ClientConfig, session: SessionStore) -> Self {
        Self {
            config,
            session,
            bus: EventBus::new(),
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            conn: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn state(&self) -> ConnectionState {
        self.state
            .lock()
            .expect("connection state lock poisoned")
            .clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Open the duplex connection if none is open. No-op while a connection
    /// loop is already running.
    pub fn connect(&self) {
        let mut conn = self.conn.lock().expect("connection slot lock poisoned");
        if conn.is_some() {
            return;
        }

        let (sender, receiver) = unbounded();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let session = self.session.clone();
        let config = self.config.clone();
        let url_builder = Arc::new(move || {
            let token = session.token()?;
            let mut url = url::Url::parse(&config.live_url()).ok()?;
            url.query_pairs_mut().append_pair("token", &token);
            Some(url.to_string())
        });

        let conn_loop = ConnectionLoop {
            url_builder,
            state: self.state.clone(),
            bus: self.bus.clone(),
            outbound: receiver,
            shutdown: shutdown_rx,
            reconnect: self.config.reconnect.clone(),
            heartbeat: self.config.heartbeat.clone(),
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *conn = Some(ConnHandle {
            sender,
            shutdown: shutdown_tx,
            generation,
        });

        // The loop owns its slot cleanup so a later connect() can restart
        // after a terminal failure. It only clears its own handle: after
        // disconnect() + connect() the slot already belongs to a newer loop.
        let slot = self.conn.clone();
        tokio::spawn(async move {
            conn_loop.run().await;
            let mut slot = slot.lock().expect("connection slot lock poisoned");
            if slot.as_ref().map(|handle| handle.generation) == Some(generation) {
                slot.take();
            }
        });
    }

    /// Close the connection. Safe to call when already closed.
    pub fn disconnect(&self) {
        let handle = self
            .conn
            .lock()
            .expect("connection slot lock poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = handle.shutdown.send(true);
        }
        set_state(&self.state, ConnectionState::Disconnected);
    }

    /// Transmit a chat-send command.
    ///
    /// No optimistic list update happens here: the authoritative copy
    /// arrives back through event dispatch (server echo) or the REST send
    /// response, and the message synchronizer deduplicates.
    pub fn send_chat(&self, recipient_id: &str, content: &str) -> Result<(), SendError> {
        if !self.is_connected() {
            return Err(SendError::NotConnected);
        }
        let conn = self.conn.lock().expect("connection slot lock poisoned");
        let Some(handle) = conn.as_ref() else {
            return Err(SendError::NotConnected);
        };
        handle
            .sender
            .unbounded_send(WsEnvelope::new(ClientCommand::ChatSend {
                recipient_id: recipient_id.to_string(),
                content: content.to_string(),
            }))
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Register a listener on the shared bus.
    pub fn subscribe(
        &self,
        kind: EventKind,
        handler: impl Fn(&ServerEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.bus.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, subscription: &Subscription) {
        self.bus.unsubscribe(subscription);
    }
}
