//! WebSocket connection loop with state tracking and auto-reconnect.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures_channel::mpsc::UnboundedReceiver;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use lancelink_shared::{ClientCommand, ServerEvent, WsEnvelope};

use crate::config::HeartbeatConfig;

use super::events::EventBus;

/// Connection state for the live connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u32,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u32,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 1.5,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> u32 {
        let delay = self.initial_delay_ms as f32 * self.backoff_multiplier.powi(attempt as i32);
        (delay as u32).min(self.max_delay_ms)
    }
}

pub(super) type SharedState = Arc<Mutex<ConnectionState>>;

pub(super) fn set_state(state: &SharedState, next: ConnectionState) {
    *state.lock().expect("connection state lock poisoned") = next;
}

pub(super) struct ConnectionLoop {
    pub url_builder: Arc<dyn Fn() -> Option<String> + Send + Sync>,
    pub state: SharedState,
    pub bus: EventBus,
    pub outbound: UnboundedReceiver<WsEnvelope<ClientCommand>>,
    pub shutdown: watch::Receiver<bool>,
    pub reconnect: ReconnectConfig,
    pub heartbeat: HeartbeatConfig,
}

/// Why a connected session ended.
enum SessionEnd {
    Shutdown,
    Lost,
}

impl ConnectionLoop {
    /// Drive connect / serve / reconnect until shutdown or the retry budget
    /// runs out. Runs as a background tokio task.
    pub async fn run(mut self) {
        let mut attempt = 0u32;

        loop {
            if *self.shutdown.borrow() {
                set_state(&self.state, ConnectionState::Disconnected);
                return;
            }

            let Some(url) = (self.url_builder)() else {
                // No token yet; poll until the session can authenticate
                set_state(&self.state, ConnectionState::Disconnected);
                tokio::time::sleep(std::time::Duration::from_millis(1000)).await;
                continue;
            };

            if attempt == 0 {
                set_state(&self.state, ConnectionState::Connecting);
            } else {
                set_state(&self.state, ConnectionState::Reconnecting { attempt });
            }

            match connect_async(&url).await {
                Ok((stream, _response)) => {
                    set_state(&self.state, ConnectionState::Connected);
                    attempt = 0;
                    tracing::info!("live connection established");

                    match self.serve(stream).await {
                        SessionEnd::Shutdown => {
                            set_state(&self.state, ConnectionState::Disconnected);
                            return;
                        }
                        SessionEnd::Lost => {
                            tracing::warn!("live connection lost, scheduling reconnect");
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!("live connection attempt failed: {err}");
                }
            }

            attempt += 1;
            if self.reconnect.max_attempts != 0 && attempt >= self.reconnect.max_attempts {
                set_state(
                    &self.state,
                    ConnectionState::Failed {
                        reason: format!("gave up after {attempt} attempts"),
                    },
                );
                return;
            }

            let delay = self.reconnect.delay_for_attempt(attempt);
            tokio::time::sleep(std::time::Duration::from_millis(delay as u64)).await;
        }
    }

    /// Pump one established connection: forward outbound commands, dispatch
    /// inbound events, keep the link alive with pings, and detect dead
    /// connections by idle timeout.
    async fn serve(
        &mut self,
        stream: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) -> SessionEnd {
        let (mut write, mut read) = stream.split();
        let mut ping = tokio::time::interval(self.heartbeat.ping_interval);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_activity = Instant::now();

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        let _ = write.send(Message::Close(None)).await;
                        return SessionEnd::Shutdown;
                    }
                }
                envelope = self.outbound.next() => {
                    let Some(envelope) = envelope else {
                        // All senders gone: the client itself was dropped
                        return SessionEnd::Shutdown;
                    };
                    match serde_json::to_string(&envelope) {
                        Ok(text) => {
                            if let Err(err) = write.send(Message::Text(text.into())).await {
                                tracing::warn!("live send failed: {err}");
                                return SessionEnd::Lost;
                            }
                        }
                        Err(err) => tracing::error!("failed to serialize command: {err}"),
                    }
                }
                _ = ping.tick() => {
                    if last_activity.elapsed() > self.heartbeat.idle_timeout {
                        tracing::warn!("live connection idle past timeout, treating as dead");
                        return SessionEnd::Lost;
                    }
                    if write.send(Message::Ping(Vec::new().into())).await.is_err() {
                        return SessionEnd::Lost;
                    }
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            last_activity = Instant::now();
                            match serde_json::from_str::<WsEnvelope<ServerEvent>>(text.as_str()) {
                                Ok(envelope) => self.bus.dispatch(&envelope.payload),
                                Err(err) => {
                                    tracing::warn!("unrecognized live event, dropping: {err}")
                                }
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            last_activity = Instant::now();
                            if write.send(Message::Pong(payload)).await.is_err() {
                                return SessionEnd::Lost;
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            last_activity = Instant::now();
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return SessionEnd::Lost;
                        }
                        // Binary and raw frames carry no events for us, but
                        // any readable frame proves the peer is alive.
                        Some(Ok(_)) => {
                            last_activity = Instant::now();
                        }
                        Some(Err(err)) => {
                            tracing::warn!("live connection read error: {err}");
                            return SessionEnd::Lost;
                        }
                    }
                }
            }
        }
    }
}
