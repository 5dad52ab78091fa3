// Integration tests for the live connection pump against a real local
// WebSocket endpoint: event dispatch and idle-timeout accounting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures_util::SinkExt;
use tokio_tungstenite::tungstenite::Message;

use lancelink_client::{ClientConfig, EventKind, LiveEventClient, SessionStore, Storage};
use lancelink_shared::{ChatMessage, Role, ServerEvent, UserIdentity, WsEnvelope};

fn identity(id: &str) -> UserIdentity {
    UserIdentity {
        id: id.to_string(),
        email: format!("{id}@example.com"),
        display_name: id.to_string(),
        role: Role::Freelancer,
        title: None,
        bio: None,
        avatar_url: None,
        skills: vec![],
        hourly_rate: None,
    }
}

fn live_client(addr: std::net::SocketAddr) -> (tempfile::TempDir, LiveEventClient) {
    let dir = tempfile::tempdir().unwrap();
    let session = SessionStore::new(Storage::with_dir(dir.path().to_path_buf()));
    session.login("tok".to_string(), identity("me"));

    let mut config = ClientConfig::new(format!("http://{addr}"));
    config.heartbeat.ping_interval = Duration::from_millis(50);
    config.heartbeat.idle_timeout = Duration::from_millis(200);
    (dir, LiveEventClient::new(config, session))
}

async fn wait_until(deadline: Duration, check: impl Fn() -> bool) -> bool {
    let started = tokio::time::Instant::now();
    while started.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[tokio::test]
async fn dispatches_events_received_over_the_live_connection() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let envelope = WsEnvelope::new(ServerEvent::ChatMessage {
            message: ChatMessage {
                id: "m1".to_string(),
                sender_id: "peer".to_string(),
                recipient_id: "me".to_string(),
                content: "hello".to_string(),
                read: false,
                created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            },
        });
        let text = serde_json::to_string(&envelope).unwrap();
        ws.send(Message::Text(text.into())).await.unwrap();
        // Keep the socket open until the client hangs up
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let (_guard, live) = live_client(addr);
    let received = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = received.clone();
    let _sub = live.subscribe(EventKind::ChatMessage, move |event| {
        if let ServerEvent::ChatMessage { message } = event {
            sink.lock().unwrap().push(message.id.clone());
        }
    });

    live.connect();
    let got_event = wait_until(Duration::from_secs(5), || {
        !received.lock().unwrap().is_empty()
    })
    .await;
    assert!(got_event, "event never reached the bus");
    assert_eq!(received.lock().unwrap().as_slice(), ["m1"]);
    live.disconnect();
}

#[tokio::test]
async fn binary_frames_count_as_activity_for_the_idle_timeout() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handshakes = Arc::new(AtomicUsize::new(0));
    let counter = handshakes.clone();

    // The endpoint never sends text, pings, or pongs. Only the binary
    // frames tell the client the peer is still there.
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut ws = match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => ws,
                    Err(_) => return,
                };
                for _ in 0..20 {
                    if ws.send(Message::Binary(vec![0u8; 4].into())).await.is_err() {
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            });
        }
    });

    let (_guard, live) = live_client(addr);
    live.connect();
    assert!(
        wait_until(Duration::from_secs(2), || live.is_connected()).await,
        "connection never established"
    );

    // Three idle windows pass; the steady binary traffic must hold the
    // connection open on its first session.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(live.is_connected());
    assert_eq!(handshakes.load(Ordering::SeqCst), 1);
    live.disconnect();
}
