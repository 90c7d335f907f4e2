//! Connector behaviour against an in-process websocket peer standing in for
//! the browser.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cdp_adapter::{AdapterErrorKind, CdpConfig, CdpTransport, TransportEvent, WsTransport};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type PeerSocket = WebSocketStream<TcpStream>;

async fn spawn_peer<F, Fut>(script: F) -> (CdpConfig, JoinHandle<()>)
where
    F: FnOnce(PeerSocket) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let socket = tokio_tungstenite::accept_async(stream).await.unwrap();
        script(socket).await;
    });
    let cfg = CdpConfig {
        websocket_url: Some(format!("ws://{addr}/devtools/page/TEST")),
        command_timeout_ms: 2_000,
        ..CdpConfig::default()
    };
    (cfg, handle)
}

async fn next_request(socket: &mut PeerSocket) -> Option<Value> {
    while let Some(message) = socket.next().await {
        match message {
            Ok(Message::Text(text)) => return serde_json::from_str(text.as_str()).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
    None
}

async fn reply(socket: &mut PeerSocket, body: Value) {
    socket
        .send(Message::Text(body.to_string().into()))
        .await
        .unwrap();
}

/// Answers every request with `{"echo": method}` until the socket closes.
async fn echo_peer(mut socket: PeerSocket) {
    while let Some(request) = next_request(&mut socket).await {
        let id = request["id"].clone();
        let method = request["method"].clone();
        reply(&mut socket, json!({ "id": id, "result": { "echo": method } })).await;
    }
}

#[tokio::test]
async fn correlates_out_of_order_responses_by_id() {
    let (cfg, _peer) = spawn_peer(|mut socket| async move {
        let first = next_request(&mut socket).await.unwrap();
        let second = next_request(&mut socket).await.unwrap();
        for request in [second, first] {
            let id = request["id"].clone();
            let method = request["method"].clone();
            reply(&mut socket, json!({ "id": id, "result": { "method": method } })).await;
        }
        echo_peer(socket).await;
    })
    .await;

    let transport = WsTransport::connect(cfg).await.unwrap();
    let (a, b) = tokio::join!(
        transport.send_command("Page.getFrameTree", json!({})),
        transport.send_command("Runtime.evaluate", json!({ "expression": "1" })),
    );
    assert_eq!(a.unwrap()["method"], "Page.getFrameTree");
    assert_eq!(b.unwrap()["method"], "Runtime.evaluate");
    assert_eq!(transport.pending_commands(), 0);
    transport.close().await;
}

#[tokio::test]
async fn error_field_becomes_command_error() {
    let (cfg, _peer) = spawn_peer(|mut socket| async move {
        let request = next_request(&mut socket).await.unwrap();
        reply(
            &mut socket,
            json!({
                "id": request["id"],
                "error": { "code": -32601, "message": "'Nope.method' wasn't found" }
            }),
        )
        .await;
        echo_peer(socket).await;
    })
    .await;

    let transport = WsTransport::connect(cfg).await.unwrap();
    let err = transport
        .send_command("Nope.method", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.kind, AdapterErrorKind::Command);
    assert_eq!(
        err.command_error(),
        Some((-32601, "'Nope.method' wasn't found".to_string()))
    );
    transport.close().await;
}

#[tokio::test]
async fn unanswered_command_times_out() {
    let (mut cfg, _peer) = spawn_peer(|mut socket| async move {
        while next_request(&mut socket).await.is_some() {}
    })
    .await;
    cfg.command_timeout_ms = 150;

    let transport = WsTransport::connect(cfg).await.unwrap();
    let started = Instant::now();
    let err = transport
        .send_command("Page.reload", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.kind, AdapterErrorKind::CommandTimeout);
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(transport.pending_commands(), 0);
    transport.close().await;
}

#[tokio::test]
async fn events_reach_listeners_in_arrival_order_while_command_pending() {
    let (cfg, _peer) = spawn_peer(|mut socket| async move {
        let request = next_request(&mut socket).await.unwrap();
        for n in 1..=3 {
            reply(
                &mut socket,
                json!({ "method": "Network.requestWillBeSent", "params": { "n": n } }),
            )
            .await;
        }
        reply(&mut socket, json!({ "id": request["id"], "result": {} })).await;
        echo_peer(socket).await;
    })
    .await;

    let transport = WsTransport::connect(cfg).await.unwrap();
    let seen: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    transport.add_event_listener(Arc::new(move |event: &TransportEvent| {
        sink.lock().push(event.params["n"].as_i64().unwrap_or(-1));
    }));

    transport
        .send_command("Network.getResponseBody", json!({ "requestId": "1" }))
        .await
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while seen.lock().len() < 3 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(*seen.lock(), vec![1, 2, 3]);
    transport.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_listener_does_not_stall_responses() {
    let (cfg, _peer) = spawn_peer(|mut socket| async move {
        let request = next_request(&mut socket).await.unwrap();
        reply(&mut socket, json!({ "method": "Page.frameNavigated", "params": {} })).await;
        reply(&mut socket, json!({ "id": request["id"], "result": { "ok": true } })).await;
        echo_peer(socket).await;
    })
    .await;

    let transport = WsTransport::connect(cfg).await.unwrap();
    transport.add_event_listener(Arc::new(|_event: &TransportEvent| {
        std::thread::sleep(Duration::from_millis(1_000));
    }));

    let started = Instant::now();
    let result = transport
        .send_command("Page.navigate", json!({ "url": "about:blank" }))
        .await
        .unwrap();
    assert_eq!(result["ok"], true);
    assert!(started.elapsed() < Duration::from_millis(800));
    transport.close().await;
}

#[tokio::test]
async fn enable_is_idempotent() {
    let enables = Arc::new(AtomicUsize::new(0));
    let counter = enables.clone();
    let (cfg, _peer) = spawn_peer(move |mut socket| async move {
        while let Some(request) = next_request(&mut socket).await {
            if request["method"] == "Network.enable" {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            reply(&mut socket, json!({ "id": request["id"], "result": {} })).await;
        }
    })
    .await;

    let transport = WsTransport::connect(cfg).await.unwrap();
    transport.enable("Network").await.unwrap();
    transport.enable("Network").await.unwrap();
    transport.send_command("Page.enable", json!({})).await.unwrap();
    assert_eq!(enables.load(Ordering::SeqCst), 1);
    transport.close().await;
}

#[tokio::test]
async fn close_fails_pending_and_later_commands() {
    let (cfg, _peer) = spawn_peer(|mut socket| async move {
        while next_request(&mut socket).await.is_some() {}
    })
    .await;

    let transport = Arc::new(WsTransport::connect(cfg).await.unwrap());
    let waiting = {
        let transport = transport.clone();
        tokio::spawn(async move { transport.send_command("Page.reload", json!({})).await })
    };
    while transport.pending_commands() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    transport.close().await;
    transport.close().await;
    assert!(transport.is_closed());

    let pending = waiting.await.unwrap().unwrap_err();
    assert_eq!(pending.kind, AdapterErrorKind::Connection);
    let later = transport
        .send_command("Page.reload", json!({}))
        .await
        .unwrap_err();
    assert_eq!(later.kind, AdapterErrorKind::Connection);
}

#[tokio::test]
async fn peer_disconnect_fails_pending_commands() {
    let (cfg, _peer) = spawn_peer(|mut socket| async move {
        let _ = next_request(&mut socket).await;
        let _ = socket.close(None).await;
    })
    .await;

    let transport = WsTransport::connect(cfg).await.unwrap();
    let err = transport
        .send_command("Page.reload", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.kind, AdapterErrorKind::Connection);
    assert!(transport.is_closed());
}

#[tokio::test]
async fn unreachable_port_is_a_connection_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let cfg = CdpConfig {
        port,
        discovery_timeout_ms: 1_000,
        ..CdpConfig::default()
    };
    let err = WsTransport::connect(cfg).await.err().unwrap();
    assert_eq!(err.kind, AdapterErrorKind::Connection);
}

#[tokio::test]
async fn malformed_websocket_url_is_a_connection_error() {
    let cfg = CdpConfig {
        websocket_url: Some("http://127.0.0.1:9/not-a-socket".into()),
        ..CdpConfig::default()
    };
    let err = WsTransport::connect(cfg).await.err().unwrap();
    assert_eq!(err.kind, AdapterErrorKind::Connection);
}

/// Serves a single `/json/version` reply over plain HTTP.
async fn spawn_discovery(ws_url: String) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = vec![0u8; 4096];
            let mut read = 0;
            loop {
                let n = stream.read(&mut buf[read..]).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                read += n;
                if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let request = String::from_utf8_lossy(&buf[..read]).to_string();
            let body = if request.starts_with("GET /json/version") {
                json!({ "Browser": "HeadlessChrome/126.0", "webSocketDebuggerUrl": ws_url })
                    .to_string()
            } else {
                "[]".to_string()
            };
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });
    port
}

#[tokio::test]
async fn discovers_websocket_url_over_http() {
    let (peer_cfg, _peer) = spawn_peer(echo_peer).await;
    let ws_url = peer_cfg.websocket_url.clone().unwrap();
    let port = spawn_discovery(ws_url.clone()).await;

    let cfg = CdpConfig {
        port,
        ..CdpConfig::default()
    };
    let transport = WsTransport::connect(cfg).await.unwrap();
    assert_eq!(transport.endpoint(), ws_url);
    let result = transport
        .send_command("Browser.getVersion", json!({}))
        .await
        .unwrap();
    assert_eq!(result["echo"], "Browser.getVersion");
    transport.close().await;
}
