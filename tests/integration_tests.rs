//! End-to-end tests — polling negotiation, websocket upgrade handshake,
//! heartbeat, event dispatch, and the close sequence, driven against an
//! in-process mock of the platform's streaming endpoint.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use drivewire::{Client, Error, EventDetail, EventKind, StreamConfig, StreamEvent};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

// ─────────────────────────────────────────────────────────────────────────────
// Mock platform
// ─────────────────────────────────────────────────────────────────────────────

/// How the mock behaves during the upgrade handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handshake {
    /// `3probe` then `40`.
    Normal,
    /// Reply to the probe with the wrong packet.
    WrongProbe,
    /// Reject the connect with a socket error message.
    Unauthorized,
    /// Reply to the upgrade packet with unexpected text.
    BadConnect,
}

struct MockPlatform {
    sid: String,
    ping_timeout_ms: u64,
    ping_interval_ms: u64,
    handshake: Handshake,
    /// Packets pushed right after the handshake completes.
    initial_packets: Vec<String>,
    /// Close the socket from the server side once the packets are sent.
    close_after_send: bool,
    /// Whether pings are answered with pongs.
    answer_pings: bool,
    /// Fail the polling request with this status instead of negotiating.
    polling_status: Option<u16>,
    pings_seen: AtomicU32,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self {
            sid: "test-sid".into(),
            ping_timeout_ms: 5_000,
            ping_interval_ms: 25_000,
            handshake: Handshake::Normal,
            initial_packets: Vec::new(),
            close_after_send: false,
            answer_pings: true,
            polling_status: None,
            pings_seen: AtomicU32::new(0),
        }
    }
}

/// Encode one negotiation segment: zero delimiter, length digits as byte
/// values, the 0xFF sentinel, then the text.
fn encode_segment(text: &str) -> Vec<u8> {
    let mut buffer = vec![0u8];
    buffer.extend(text.len().to_string().bytes().map(|d| d - b'0'));
    buffer.push(255);
    buffer.extend_from_slice(text.as_bytes());
    buffer
}

async fn socketio_handler(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<MockPlatform>>,
    ws: Result<WebSocketUpgrade, axum::extract::ws::rejection::WebSocketUpgradeRejection>,
) -> Response {
    assert_eq!(params.get("EIO").map(String::as_str), Some("3"));
    assert_eq!(
        params.get("token").map(String::as_str),
        Some("test-id:test-secret")
    );

    match params.get("transport").map(String::as_str) {
        Some("polling") => {
            if let Some(status) = state.polling_status {
                let body = json!({
                    "error": "invalid_client",
                    "error_description": "client rejected"
                });
                return (StatusCode::from_u16(status).unwrap(), body.to_string())
                    .into_response();
            }
            let open = format!(
                r#"0{{"sid":"{}","pingTimeout":{},"pingInterval":{}}}"#,
                state.sid, state.ping_timeout_ms, state.ping_interval_ms
            );
            encode_segment(&open).into_response()
        }
        Some("websocket") => {
            assert_eq!(params.get("sid"), Some(&state.sid));
            let ws = ws.expect("websocket transport without upgrade request");
            ws.on_upgrade(move |socket| run_mock_socket(socket, state))
                .into_response()
        }
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn expect_text(socket: &mut WebSocket) -> String {
    loop {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => return text.to_string(),
            Some(Ok(_)) => continue,
            other => panic!("mock socket ended during handshake: {other:?}"),
        }
    }
}

async fn send_text(socket: &mut WebSocket, text: impl Into<String>) {
    let _ = socket.send(Message::Text(text.into().into())).await;
}

async fn run_mock_socket(mut socket: WebSocket, state: Arc<MockPlatform>) {
    assert_eq!(expect_text(&mut socket).await, "2probe");
    if state.handshake == Handshake::WrongProbe {
        send_text(&mut socket, "6").await;
        return;
    }
    send_text(&mut socket, "3probe").await;

    assert_eq!(expect_text(&mut socket).await, "5");
    match state.handshake {
        Handshake::Unauthorized => {
            send_text(&mut socket, r#"44"Unauthorized client.""#).await;
            return;
        }
        Handshake::BadConnect => {
            send_text(&mut socket, "im-a-teapot").await;
            return;
        }
        _ => send_text(&mut socket, "40").await,
    }

    for packet in &state.initial_packets {
        send_text(&mut socket, packet.clone()).await;
    }
    if state.close_after_send {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) if text.as_str() == "2" => {
                state.pings_seen.fetch_add(1, Ordering::SeqCst);
                if state.answer_pings {
                    send_text(&mut socket, "3").await;
                }
            }
            Message::Text(_) => {}
            // Keep polling after a client close frame so the close-handshake
            // reply queued by the websocket library is flushed; the loop ends
            // when `recv` returns `None` after the handshake completes.
            Message::Close(_) => {}
            _ => {}
        }
    }
}

/// Start the mock and return a client config pointing at it.
async fn start_mock(state: MockPlatform) -> (Arc<MockPlatform>, StreamConfig) {
    let state = Arc::new(state);
    let app = Router::new()
        .route("/socket.io/", get(socketio_handler))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    let config = StreamConfig {
        session_url: format!("http://127.0.0.1:{port}/socket.io/"),
        websocket_url: format!("ws://127.0.0.1:{port}/socket.io/"),
        client_id: "test-id".into(),
        client_secret: "test-secret".into(),
    };
    (state, config)
}

fn event_payload() -> serde_json::Value {
    json!({
        "id": "evt_1",
        "user": {"id": "usr_1"},
        "vehicle": {"id": "veh_1", "display_name": "Daily driver"},
        "device": {"id": "dev_1"},
        "location": {"lat": 37.7, "lon": -122.4, "accuracy_m": 10.0},
        "velocity_kph": 131.0
    })
}

fn subscribe_channel(
    client: &Client,
    kind: &str,
) -> (drivewire::Subscription, mpsc::UnboundedReceiver<StreamEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sub = client
        .on(
            kind,
            Arc::new(move |_kind, event| {
                let _ = tx.send(event);
            }),
        )
        .unwrap();
    (sub, rx)
}

// ─────────────────────────────────────────────────────────────────────────────
// Negotiation
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn negotiate_parses_session_parameters() {
    let (_state, config) = start_mock(MockPlatform {
        sid: "abc".into(),
        ping_timeout_ms: 12_345,
        ping_interval_ms: 23_456,
        ..Default::default()
    })
    .await;

    let session = drivewire_transport::negotiate(&reqwest::Client::new(), &config)
        .await
        .unwrap();
    assert_eq!(session.sid, "abc");
    assert_eq!(session.ping_timeout, Duration::from_millis(12_345));
    assert_eq!(session.ping_interval, Duration::from_millis(23_456));
}

#[tokio::test]
async fn negotiate_maps_http_status_to_status_error() {
    let (_state, config) = start_mock(MockPlatform {
        polling_status: Some(401),
        ..Default::default()
    })
    .await;

    let err = drivewire_transport::negotiate(&reqwest::Client::new(), &config)
        .await
        .unwrap_err();
    match err {
        Error::Status { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "invalid_client: client rejected");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn negotiate_fails_on_unreachable_endpoint() {
    let config = StreamConfig {
        session_url: "http://127.0.0.1:9/socket.io/".into(),
        websocket_url: "ws://127.0.0.1:9/socket.io/".into(),
        client_id: "test-id".into(),
        client_secret: "test-secret".into(),
    };
    let err = drivewire_transport::negotiate(&reqwest::Client::new(), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
}

#[tokio::test]
async fn request_json_maps_http_status_to_status_error() {
    let (_state, config) = start_mock(MockPlatform {
        polling_status: Some(422),
        ..Default::default()
    })
    .await;

    let url = format!(
        "{}?EIO=3&transport=polling&token=test-id:test-secret",
        config.session_url
    );
    let err = drivewire_transport::http::request_json(
        &reqwest::Client::new(),
        reqwest::Method::GET,
        &url,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Status { status: 422, .. }));
}

#[tokio::test]
async fn request_json_rejects_non_json_body() {
    // The polling endpoint returns a frame buffer, which is not JSON.
    let (_state, config) = start_mock(MockPlatform::default()).await;

    let url = format!(
        "{}?EIO=3&transport=polling&token=test-id:test-secret",
        config.session_url
    );
    let err = drivewire_transport::http::request_json(
        &reqwest::Client::new(),
        reqwest::Method::GET,
        &url,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::InvalidResponse(_)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Upgrade handshake
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn connect_succeeds_with_normal_handshake() {
    let (_state, config) = start_mock(MockPlatform::default()).await;
    let client = Client::with_config(config);

    let handle = client.connect().await.unwrap();
    assert!(client.is_connected());

    client.close().await;
    assert!(!client.is_connected());
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn connect_rejects_unauthorized_client() {
    let (_state, config) = start_mock(MockPlatform {
        handshake: Handshake::Unauthorized,
        ..Default::default()
    })
    .await;
    let client = Client::with_config(config);

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, Error::UnauthorizedClient(_)));
    // The failure leaves the client ready for another attempt.
    assert!(!client.is_connected());
}

#[tokio::test]
async fn connect_fails_on_wrong_probe_response() {
    let (_state, config) = start_mock(MockPlatform {
        handshake: Handshake::WrongProbe,
        ..Default::default()
    })
    .await;
    let client = Client::with_config(config);

    let err = client.connect().await.unwrap_err();
    match err {
        Error::Protocol(msg) => assert!(msg.contains('6'), "message was {msg:?}"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn connect_fails_on_unexpected_connect_packet() {
    let (_state, config) = start_mock(MockPlatform {
        handshake: Handshake::BadConnect,
        ..Default::default()
    })
    .await;
    let client = Client::with_config(config);

    let err = client.connect().await.unwrap_err();
    match err {
        Error::Protocol(msg) => assert!(msg.contains("im-a-teapot"), "message was {msg:?}"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn second_connect_fails_while_open() {
    let (_state, config) = start_mock(MockPlatform::default()).await;
    let client = Client::with_config(config);

    let handle = client.connect().await.unwrap();
    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));

    client.close().await;
    handle.await.unwrap().unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Event dispatch
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn subscriber_receives_decoded_event() {
    let packet = format!("42{}", json!(["notification:speeding", event_payload()]));
    let (_state, config) = start_mock(MockPlatform {
        initial_packets: vec![packet],
        ..Default::default()
    })
    .await;
    let client = Client::with_config(config);
    let (_sub, mut rx) = subscribe_channel(&client, "notification:speeding");

    let handle = client.connect().await.unwrap();

    let event = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    match event {
        StreamEvent::Realtime(event) => {
            assert_eq!(event.kind, EventKind::Speeding);
            assert_eq!(event.base.id, "evt_1");
            assert_eq!(
                event.base.vehicle.display_name.as_deref(),
                Some("Daily driver")
            );
            assert_eq!(
                event.detail,
                EventDetail::Speeding { velocity_kph: 131.0 }
            );
        }
        other => panic!("unexpected event: {other:?}"),
    }

    client.close().await;
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn unknown_event_kind_is_discarded() {
    let unknown = format!("42{}", json!(["vehicle:launched", {"id": "evt_9"}]));
    let known = format!("42{}", json!(["notification:speeding", event_payload()]));
    let (_state, config) = start_mock(MockPlatform {
        initial_packets: vec![unknown, known],
        ..Default::default()
    })
    .await;
    let client = Client::with_config(config);
    let (tx, mut all_rx) = mpsc::unbounded_channel();
    let _all_sub = client.on_app_event(Arc::new(move |kind, _event| {
        let _ = tx.send(kind);
    }));

    let handle = client.connect().await.unwrap();

    // Only the known kind reaches the catch-all subscription.
    let kind = timeout(RECV_TIMEOUT, all_rx.recv()).await.unwrap().unwrap();
    assert_eq!(kind, EventKind::Speeding);
    assert!(all_rx.try_recv().is_err());

    client.close().await;
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn error_packet_reaches_error_subscribers() {
    let (_state, config) = start_mock(MockPlatform {
        initial_packets: vec![r#"44"Vehicle stream unavailable.""#.into()],
        ..Default::default()
    })
    .await;
    let client = Client::with_config(config);
    let (_sub, mut rx) = subscribe_channel(&client, "error");

    let handle = client.connect().await.unwrap();

    let event = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    match event {
        StreamEvent::Error(value) => {
            assert_eq!(value, json!("Vehicle stream unavailable."));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    client.close().await;
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn unsubscribed_callback_is_not_invoked() {
    let packet = format!("42{}", json!(["notification:speeding", event_payload()]));
    let (_state, config) = start_mock(MockPlatform {
        initial_packets: vec![packet],
        close_after_send: true,
        ..Default::default()
    })
    .await;
    let client = Client::with_config(config);

    let (sub, mut rx) = subscribe_channel(&client, "notification:speeding");
    sub.unsubscribe();
    let (_closed_sub, mut closed_rx) = subscribe_channel(&client, "closed");

    let handle = client.connect().await.unwrap();

    // The server closes after pushing the event; `closed` arriving proves
    // the dispatch queue drained past the speeding event.
    timeout(RECV_TIMEOUT, closed_rx.recv()).await.unwrap().unwrap();
    assert!(rx.try_recv().is_err());
    handle.await.unwrap().unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Close sequence
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn close_is_idempotent() {
    let (_state, config) = start_mock(MockPlatform::default()).await;
    let client = Client::with_config(config);
    let (_sub, mut closed_rx) = subscribe_channel(&client, "closed");

    let handle = client.connect().await.unwrap();
    client.close().await;
    client.close().await;
    assert!(!client.is_connected());

    handle.await.unwrap().unwrap();
    // Exactly one `closed` notification despite the double close.
    timeout(RECV_TIMEOUT, closed_rx.recv()).await.unwrap().unwrap();
    assert!(closed_rx.try_recv().is_err());
}

#[tokio::test]
async fn remote_close_dispatches_closed_event() {
    let (_state, config) = start_mock(MockPlatform {
        close_after_send: true,
        ..Default::default()
    })
    .await;
    let client = Client::with_config(config);
    let (_sub, mut closed_rx) = subscribe_channel(&client, "closed");

    let handle = client.connect().await.unwrap();

    let event = timeout(RECV_TIMEOUT, closed_rx.recv()).await.unwrap().unwrap();
    assert!(matches!(event, StreamEvent::Closed));
    handle.await.unwrap().unwrap();
    assert!(!client.is_connected());
}

#[tokio::test]
async fn stale_read_loop_does_not_close_replacement_connection() {
    let (_state, config) = start_mock(MockPlatform::default()).await;
    let client = Client::with_config(config);
    let (_sub, mut closed_rx) = subscribe_channel(&client, "closed");

    let first = client.connect().await.unwrap();
    client.close().await;
    // Reconnect without awaiting the old read loop.
    let second = client.connect().await.unwrap();

    // The old loop exits and reports its connection's end...
    first.await.unwrap().unwrap();
    timeout(RECV_TIMEOUT, closed_rx.recv()).await.unwrap().unwrap();
    // ...without tearing down the replacement.
    assert!(client.is_connected());
    assert!(closed_rx.try_recv().is_err());

    client.close().await;
    second.await.unwrap().unwrap();
}

#[tokio::test]
async fn client_can_reconnect_after_close() {
    let (_state, config) = start_mock(MockPlatform::default()).await;
    let client = Client::with_config(config);

    let handle = client.connect().await.unwrap();
    client.close().await;
    handle.await.unwrap().unwrap();

    let handle = client.connect().await.unwrap();
    assert!(client.is_connected());
    client.close().await;
    handle.await.unwrap().unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Heartbeat
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn heartbeat_cycles_ping_pong_ping() {
    let (state, config) = start_mock(MockPlatform {
        ping_timeout_ms: 5_000,
        ping_interval_ms: 50,
        ..Default::default()
    })
    .await;
    let client = Client::with_config(config);

    let handle = client.connect().await.unwrap();

    // First ping fires on connect; each pong arms a 50ms interval timer
    // that pings again. Wait for the cycle to prove itself a few times.
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    while state.pings_seen.load(Ordering::SeqCst) < 3 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "heartbeat never cycled: {} pings",
            state.pings_seen.load(Ordering::SeqCst)
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    client.close().await;
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn missed_pong_closes_the_connection() {
    let (state, config) = start_mock(MockPlatform {
        ping_timeout_ms: 200,
        ping_interval_ms: 10_000,
        answer_pings: false,
        ..Default::default()
    })
    .await;
    let client = Client::with_config(config);
    let (_sub, mut closed_rx) = subscribe_channel(&client, "closed");

    let handle = client.connect().await.unwrap();

    // No pong ever arrives, so the pong deadline closes the connection.
    timeout(RECV_TIMEOUT, closed_rx.recv()).await.unwrap().unwrap();
    assert!(!client.is_connected());
    assert_eq!(state.pings_seen.load(Ordering::SeqCst), 1);
    handle.await.unwrap().unwrap();
}
