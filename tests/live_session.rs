//! End-to-end session tests against a scripted websocket server

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
    routing::get,
    Router,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use live_edge_ingest::{
    config::AppConfig,
    sink::{SimulatedSinkFactory, SimulatedSurface},
    ConnectionManager, SessionHandle, StatusSnapshot, StreamStatus,
};

const H264: &str = "video/mp4; codecs=\"avc1.640029\"";
const SEGMENT_LEN: usize = 1024;

/// What the server does on every connection
#[derive(Clone, Default)]
struct Script {
    codec: Option<String>,
    error: Option<String>,
    segments: usize,
    close_after_segments: bool,
}

#[derive(Clone, Default)]
struct ServerState {
    script: Script,
    connections: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
    announcements: Arc<Mutex<Vec<String>>>,
    sources: Arc<Mutex<Vec<String>>>,
}

struct TestServer {
    addr: SocketAddr,
    state: ServerState,
}

impl TestServer {
    async fn start(script: Script) -> Self {
        let state = ServerState {
            script,
            ..Default::default()
        };
        let app = Router::new()
            .route("/api/ws", get(ws_handler))
            .with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state }
    }

    fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    fn disconnects(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    fn open(&self, source: &str) -> SessionHandle {
        self.open_with_delay(source, 300)
    }

    fn open_with_delay(&self, source: &str, reconnect_delay_ms: u64) -> SessionHandle {
        let mut config = AppConfig::default();
        config.stream.server_url = format!("http://{}", self.addr);
        config.connection.reconnect_delay_ms = reconnect_delay_ms;
        config.connection.stats_interval_ms = 20;
        config.sink.append_latency_ms = 1;

        let factory = Arc::new(SimulatedSinkFactory::new(config.sink.clone()));
        let (surface, _) = SimulatedSurface::shared();
        ConnectionManager::new(config, factory, surface)
            .open(source)
            .unwrap()
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<ServerState>,
) -> Response {
    if let Some(source) = params.get("src") {
        state.sources.lock().push(source.clone());
    }
    ws.on_upgrade(move |socket| async move {
        serve(socket, state.clone()).await;
        state.disconnects.fetch_add(1, Ordering::SeqCst);
    })
}

async fn serve(mut socket: WebSocket, state: ServerState) {
    state.connections.fetch_add(1, Ordering::SeqCst);

    // The client speaks first.
    let Some(Ok(Message::Text(announcement))) = socket.recv().await else {
        return;
    };
    state.announcements.lock().push(announcement);

    let script = &state.script;
    if let Some(error) = &script.error {
        let frame = serde_json::json!({"type": "error", "value": error}).to_string();
        let _ = socket.send(Message::Text(frame)).await;
    } else if let Some(codec) = &script.codec {
        let frame = serde_json::json!({"type": "mse", "value": codec}).to_string();
        let _ = socket.send(Message::Text(frame)).await;
        for i in 0..script.segments {
            let _ = socket.send(Message::Binary(vec![i as u8; SEGMENT_LEN])).await;
        }
        if script.close_after_segments {
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    }

    while let Some(Ok(_)) = socket.recv().await {}
}

async fn wait_for(handle: &SessionHandle, what: &str, f: impl FnMut(&StatusSnapshot) -> bool) -> StatusSnapshot {
    let mut status = handle.control().subscribe();
    let snapshot = match tokio::time::timeout(Duration::from_secs(5), status.wait_for(f)).await {
        Ok(Ok(snapshot)) => snapshot.clone(),
        _ => panic!("timed out waiting for {what}; last status {:?}", handle.status()),
    };
    snapshot
}

async fn eventually(what: &str, f: impl Fn() -> bool) {
    for _ in 0..500 {
        if f() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn test_streams_segments_after_negotiation() {
    let server = TestServer::start(Script {
        codec: Some(H264.into()),
        segments: 20,
        ..Default::default()
    })
    .await;
    let handle = server.open("front_door");

    let snapshot = wait_for(&handle, "all segments", |s| {
        s.status == StreamStatus::Streaming && s.stats.segments_received == 20
    })
    .await;

    assert_eq!(snapshot.codec.as_deref(), Some(H264));
    assert_eq!(snapshot.stats.bytes_received, (20 * SEGMENT_LEN) as u64);
    assert_eq!(snapshot.stats.dropped_segments, 0);
    assert_eq!(snapshot.stats.early_segments, 0);
    assert_eq!(*server.state.sources.lock(), vec!["front_door".to_string()]);

    let announcement: serde_json::Value =
        serde_json::from_str(&server.state.announcements.lock()[0]).unwrap();
    assert_eq!(announcement["type"], "codec");
    let codecs = announcement["value"].as_str().unwrap();
    assert!(codecs.split(',').any(|c| c == "avc1.640029"));
    assert!(codecs.split(',').any(|c| c == "opus"));

    let mut status = handle.control().subscribe();
    handle.shutdown().await;
    assert_eq!(status.borrow_and_update().status, StreamStatus::Stopped);
}

#[tokio::test]
async fn test_close_schedules_exactly_one_reconnect() {
    let server = TestServer::start(Script {
        codec: Some(H264.into()),
        segments: 3,
        close_after_segments: true,
        ..Default::default()
    })
    .await;
    let handle = server.open("garage");

    let snapshot = wait_for(&handle, "reconnect", |s| {
        matches!(s.status, StreamStatus::Reconnecting { .. })
    })
    .await;
    assert_eq!(snapshot.status, StreamStatus::Reconnecting { delay_ms: 300 });

    // Nothing happens before the delay elapses.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.connections(), 1);

    eventually("second connection", || server.connections() == 2).await;
    wait_for(&handle, "second session", |s| s.reconnects == 1).await;

    handle.shutdown().await;
}

#[tokio::test]
async fn test_teardown_during_delay_cancels_reconnect() {
    let server = TestServer::start(Script {
        codec: Some(H264.into()),
        close_after_segments: true,
        ..Default::default()
    })
    .await;
    let mut handle = server.open("porch");

    wait_for(&handle, "reconnect", |s| {
        matches!(s.status, StreamStatus::Reconnecting { .. })
    })
    .await;
    handle.teardown();
    tokio::time::timeout(Duration::from_secs(5), handle.closed())
        .await
        .unwrap();
    assert_eq!(handle.status().status, StreamStatus::Stopped);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn test_server_error_waits_for_retry() {
    let server = TestServer::start(Script {
        error: Some("stream not found".into()),
        ..Default::default()
    })
    .await;
    let handle = server.open("missing");

    let snapshot = wait_for(&handle, "failure", |s| {
        matches!(s.status, StreamStatus::Failed { .. })
    })
    .await;
    match snapshot.status {
        StreamStatus::Failed { message } => assert!(message.contains("stream not found")),
        other => panic!("unexpected status {other:?}"),
    }

    // No automatic reconnect, even after the reconnect delay.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(server.connections(), 1);

    handle.retry();
    eventually("retried connection", || server.connections() == 2).await;

    handle.shutdown().await;
}

#[tokio::test]
async fn test_unsupported_codec_fails_negotiation() {
    let server = TestServer::start(Script {
        codec: Some("video/mp4; codecs=\"vp09.00.10.08\"".into()),
        segments: 5,
        ..Default::default()
    })
    .await;
    let handle = server.open("driveway");

    let snapshot = wait_for(&handle, "failure", |s| {
        matches!(s.status, StreamStatus::Failed { .. })
    })
    .await;
    assert!(snapshot.codec.is_none());

    handle.shutdown().await;
}

#[tokio::test]
async fn test_retry_while_streaming_starts_fresh_session() {
    let server = TestServer::start(Script {
        codec: Some(H264.into()),
        segments: 5,
        ..Default::default()
    })
    .await;
    let handle = server.open("lobby");

    let first = wait_for(&handle, "first session", |s| {
        s.status == StreamStatus::Streaming && s.stats.segments_received == 5
    })
    .await;
    let first_id = first.session_id.unwrap();

    handle.retry();
    let second = wait_for(&handle, "second session", |s| {
        s.session_id != Some(first_id)
            && s.status == StreamStatus::Streaming
            && s.stats.segments_received == 5
    })
    .await;

    assert_eq!(second.reconnects, 1);
    assert_eq!(server.connections(), 2);
    // The first socket was closed by the client.
    eventually("old socket closed", || server.disconnects() == 1).await;

    handle.shutdown().await;
}

#[tokio::test]
async fn test_retry_during_reconnect_wait_connects_immediately() {
    let server = TestServer::start(Script {
        codec: Some(H264.into()),
        close_after_segments: true,
        ..Default::default()
    })
    .await;
    // Far longer than any wait below.
    let handle = server.open_with_delay("yard", 60_000);

    wait_for(&handle, "reconnect", |s| {
        s.status == StreamStatus::Reconnecting { delay_ms: 60_000 }
    })
    .await;
    assert_eq!(server.connections(), 1);

    handle.retry();
    eventually("retried connection", || server.connections() == 2).await;
    wait_for(&handle, "second session", |s| s.reconnects == 1).await;

    handle.shutdown().await;
}
