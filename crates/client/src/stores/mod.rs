//! Per-view synchronization stores over the REST and live-event sources.

pub mod messages;
pub mod notifications;

pub use messages::ConversationSync;
pub use notifications::NotificationFeed;
