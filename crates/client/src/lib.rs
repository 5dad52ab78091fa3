//! Lancelink client synchronization layer.
//!
//! Keeps a logged-in user's identity, live chat stream, and notification
//! badge consistent across the application, reconciling three independent
//! sources: the persisted session snapshot, periodic REST fetches, and push
//! events from the live WebSocket connection.

pub mod api_client;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod storage;
pub mod stores;
pub mod ws;

pub use api_client::ApiClient;
pub use config::{ClientConfig, HeartbeatConfig, RetryConfig};
pub use error::ApiError;
pub use session::{SessionStore, SessionState};
pub use storage::Storage;
pub use stores::{ConversationSync, NotificationFeed};
pub use ws::{
    ConnectionState, EventBus, EventKind, LiveEventClient, ReconnectConfig, SendError,
    Subscription,
};
