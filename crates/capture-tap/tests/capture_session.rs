use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use capture_tap::shim::{ALREADY_ACTIVE, DEACTIVATE_SCRIPT, DRAIN_SCRIPT, RESET_SCRIPT};
use capture_tap::{CaptureConfig, CaptureError, CaptureSession, NetworkFeed, ShimHost};
use cdp_adapter::{
    AdapterError, AdapterErrorKind, CdpTransport, CommandTarget, EventListener, ListenerId,
    TransportEvent,
};
use parking_lot::Mutex;
use replay_core_types::CaptureType;
use serde_json::{json, Value};
use tokio::time::{sleep, timeout};

/// Page stand-in that behaves like the shim: a guarded install flag and a
/// queue that drains swap out.
#[derive(Default)]
struct ShimPage {
    installed: AtomicBool,
    queue: Mutex<Vec<Value>>,
    installs: AtomicUsize,
    drains: AtomicUsize,
    fail_drains: AtomicBool,
    fail_inject: AtomicBool,
    scripts: Mutex<Vec<String>>,
    deactivations: AtomicUsize,
}

impl ShimPage {
    /// Page activity; lost when no shim is listening.
    fn emit(&self, item: Value) {
        if self.installed.load(Ordering::SeqCst) {
            self.queue.lock().push(item);
        }
    }

    fn console(&self, level: &str, text: &str) {
        self.emit(json!({
            "type": "console-log", "source": level, "data": text,
            "extra": {"level": level}, "timestamp": 1767225600000.0
        }));
    }

    fn response(&self, url: &str, status: u16) {
        self.emit(json!({
            "type": "network-response", "source": url, "data": "{}",
            "extra": {"method": "GET", "via": "fetch"}, "status": status,
            "durationMs": 8.0, "timestamp": 1767225600000.0
        }));
    }

    fn navigate(&self) {
        self.installed.store(false, Ordering::SeqCst);
        self.queue.lock().clear();
    }
}

#[async_trait]
impl ShimHost for ShimPage {
    async fn evaluate(&self, expression: &str) -> Result<Value, AdapterError> {
        if expression == DRAIN_SCRIPT {
            self.drains.fetch_add(1, Ordering::SeqCst);
            if self.fail_drains.load(Ordering::SeqCst) {
                return Err(AdapterError::new(AdapterErrorKind::Script)
                    .with_hint("Execution context was destroyed"));
            }
            if !self.installed.load(Ordering::SeqCst) {
                return Ok(Value::Null);
            }
            let items = std::mem::take(&mut *self.queue.lock());
            return Ok(Value::String(Value::Array(items).to_string()));
        }
        if expression == RESET_SCRIPT {
            self.queue.lock().clear();
            return Ok(Value::Bool(self.installed.load(Ordering::SeqCst)));
        }
        if expression == DEACTIVATE_SCRIPT {
            self.deactivations.fetch_add(1, Ordering::SeqCst);
            self.installed.store(false, Ordering::SeqCst);
            self.queue.lock().clear();
            return Ok(Value::Bool(true));
        }
        if expression.contains(ALREADY_ACTIVE) {
            self.scripts.lock().push(expression.to_string());
            if self.fail_inject.load(Ordering::SeqCst) {
                return Err(AdapterError::connection("socket closed"));
            }
            if self.installed.swap(true, Ordering::SeqCst) {
                return Ok(json!(ALREADY_ACTIVE));
            }
            self.installs.fetch_add(1, Ordering::SeqCst);
            return Ok(json!("installed"));
        }
        Ok(Value::Bool(true))
    }
}

fn fast_config() -> CaptureConfig {
    CaptureConfig {
        poll_interval_ms: 10,
        ..CaptureConfig::default()
    }
}

async fn wait_for_len(session: &CaptureSession, count: usize) {
    timeout(Duration::from_secs(2), async {
        while session.len() < count {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("captures did not arrive in time");
}

#[tokio::test]
async fn sequence_numbers_increase_and_restart_on_start() {
    let page = Arc::new(ShimPage::default());
    let session = CaptureSession::new(page.clone(), fast_config());

    session.start().await.expect("start");
    page.console("log", "one");
    page.console("log", "two");
    page.console("warn", "three");
    wait_for_len(&session, 3).await;

    let seqs: Vec<u64> = session.captures().iter().map(|c| c.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3]);

    session.start().await.expect("restart");
    assert!(session.is_empty());
    page.console("log", "again");
    wait_for_len(&session, 1).await;
    assert_eq!(session.captures()[0].seq, 1);

    session.stop().await;
}

#[tokio::test]
async fn clear_keeps_numbering() {
    let page = Arc::new(ShimPage::default());
    let session = CaptureSession::new(page.clone(), fast_config());
    session.start().await.unwrap();

    page.console("log", "before");
    wait_for_len(&session, 1).await;
    session.clear();
    page.console("log", "after");
    wait_for_len(&session, 1).await;

    let captures = session.captures();
    assert_eq!(captures.len(), 1);
    assert_eq!(captures[0].seq, 2);
    session.stop().await;
}

#[tokio::test]
async fn repeated_injection_does_not_duplicate_captures() {
    let page = Arc::new(ShimPage::default());
    let session = CaptureSession::new(page.clone(), fast_config());
    session.start().await.unwrap();
    session.reattach().await.unwrap();
    session.reattach().await.unwrap();

    page.console("error", "boom");
    wait_for_len(&session, 1).await;
    sleep(Duration::from_millis(50)).await;

    assert_eq!(page.installs.load(Ordering::SeqCst), 1);
    assert_eq!(page.scripts.lock().len(), 3);
    assert_eq!(session.len(), 1);
    session.stop().await;
}

#[tokio::test]
async fn reattach_after_navigation_resumes_capture() {
    let page = Arc::new(ShimPage::default());
    let session = CaptureSession::new(page.clone(), fast_config());
    session.start().await.unwrap();

    page.navigate();
    page.console("log", "lost while detached");
    sleep(Duration::from_millis(40)).await;
    assert!(session.is_empty());

    session.reattach().await.unwrap();
    page.console("log", "seen after reattach");
    wait_for_len(&session, 1).await;
    assert_eq!(session.captures()[0].data, "seen after reattach");
    assert_eq!(page.installs.load(Ordering::SeqCst), 2);
    session.stop().await;
}

#[tokio::test]
async fn stop_drains_once_more_then_halts() {
    let page = Arc::new(ShimPage::default());
    let config = CaptureConfig {
        poll_interval_ms: 60_000,
        ..CaptureConfig::default()
    };
    let session = CaptureSession::new(page.clone(), config);
    session.start().await.unwrap();
    page.response("https://shop.test/api/cart", 200);
    page.response("https://shop.test/api/cart", 201);

    session.stop().await;
    assert_eq!(session.len(), 2);
    assert!(!session.is_running().await);

    let drains = page.drains.load(Ordering::SeqCst);
    page.response("https://shop.test/api/late", 200);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(page.drains.load(Ordering::SeqCst), drains);
    assert_eq!(session.len(), 2);

    session.stop().await;
    assert_eq!(session.len(), 2);
}

#[tokio::test]
async fn restart_ignores_activity_from_while_stopped() {
    let page = Arc::new(ShimPage::default());
    let session = CaptureSession::new(page.clone(), fast_config());

    session.start().await.unwrap();
    page.console("log", "first-session");
    wait_for_len(&session, 1).await;
    session.stop().await;
    assert_eq!(page.deactivations.load(Ordering::SeqCst), 1);

    page.console("log", "while-stopped");
    assert!(page.queue.lock().is_empty());

    session.start().await.unwrap();
    page.console("log", "second-session");
    wait_for_len(&session, 1).await;
    sleep(Duration::from_millis(40)).await;
    session.stop().await;

    let seen: Vec<(u64, String)> = session
        .captures()
        .into_iter()
        .map(|c| (c.seq, c.data))
        .collect();
    assert_eq!(seen, vec![(1, "second-session".to_string())]);
}

#[tokio::test]
async fn start_discards_a_stale_page_queue() {
    let page = Arc::new(ShimPage::default());
    page.installed.store(true, Ordering::SeqCst);
    page.console("log", "left over by an earlier run");

    let session = CaptureSession::new(page.clone(), fast_config());
    session.start().await.unwrap();
    page.console("log", "fresh");
    wait_for_len(&session, 1).await;
    sleep(Duration::from_millis(40)).await;
    session.stop().await;

    let captures = session.captures();
    assert_eq!(captures.len(), 1);
    assert_eq!(captures[0].data, "fresh");
    assert_eq!(captures[0].seq, 1);
}

#[tokio::test]
async fn drain_errors_do_not_stop_the_poller() {
    let page = Arc::new(ShimPage::default());
    page.fail_drains.store(true, Ordering::SeqCst);
    let session = CaptureSession::new(page.clone(), fast_config());
    session.start().await.unwrap();

    page.console("log", "queued during failures");
    sleep(Duration::from_millis(50)).await;
    assert!(page.drains.load(Ordering::SeqCst) > 1);
    assert!(session.is_empty());
    assert!(session.is_running().await);

    page.fail_drains.store(false, Ordering::SeqCst);
    wait_for_len(&session, 1).await;
    session.stop().await;
}

#[tokio::test]
async fn failed_injection_leaves_session_stopped() {
    let page = Arc::new(ShimPage::default());
    page.fail_inject.store(true, Ordering::SeqCst);
    let session = CaptureSession::new(page.clone(), fast_config());

    let err = session.start().await.unwrap_err();
    assert!(matches!(err, CaptureError::Injection(_)));
    assert!(!session.is_running().await);
}

#[tokio::test]
async fn subscribers_see_captures_live() {
    let page = Arc::new(ShimPage::default());
    let session = CaptureSession::new(page.clone(), fast_config());
    let mut rx = session.subscribe();
    session.start().await.unwrap();

    page.console("warn", "slow response");
    let capture = timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("broadcast in time")
        .expect("capture");
    assert_eq!(capture.capture_type, CaptureType::ConsoleLog);
    assert_eq!(capture.seq, 1);
    session.stop().await;
}

#[tokio::test]
async fn server_error_assertion_lists_the_failing_response() {
    let page = Arc::new(ShimPage::default());
    let session = CaptureSession::new(page.clone(), fast_config());
    session.start().await.unwrap();

    page.response("https://shop.test/api/items", 200);
    page.response("https://shop.test/api/checkout", 500);
    wait_for_len(&session, 2).await;
    session.stop().await;

    let err = session.assert_no_server_errors().unwrap_err();
    match &err {
        CaptureError::AssertionFailed { captured, .. } => {
            assert_eq!(captured.len(), 1);
            assert!(captured[0].contains("/api/checkout"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(session.assert_no_server_errors().is_err());
    assert_eq!(session.len(), 2);
    assert!(session.assert_response_status("/api/items", 200).is_ok());

    let report = session.report();
    assert!(report.contains("== network-response (2) =="));
}

#[tokio::test]
async fn only_success_responses_pass_the_server_error_assertion() {
    let page = Arc::new(ShimPage::default());
    let session = CaptureSession::new(page.clone(), fast_config());
    session.start().await.unwrap();
    page.response("https://shop.test/api/items", 200);
    page.response("https://shop.test/api/items/4", 204);
    wait_for_len(&session, 2).await;
    session.stop().await;

    assert!(session.assert_no_server_errors().is_ok());
}

#[tokio::test]
async fn queries_cover_storage_console_and_dom() {
    let page = Arc::new(ShimPage::default());
    let session = CaptureSession::new(page.clone(), fast_config());
    session.start().await.unwrap();

    page.emit(json!({"type": "storage-set", "source": "auth.token", "data": "abc", "extra": {"area": "local"}}));
    page.emit(json!({"type": "storage-set", "source": "theme", "data": "dark", "extra": {"area": "local"}}));
    page.emit(json!({"type": "dom-mutation", "source": "div#toast.alert", "data": "<div id=\"toast\" class=\"alert\">Saved</div>",
        "extra": {"change": "added", "tag": "div", "id": "toast", "classes": ["alert"]}}));
    page.console("error", "TypeError: x is undefined");
    page.console("log", "render done");
    wait_for_len(&session, 5).await;
    session.stop().await;

    assert_eq!(session.storage("^auth\\.").unwrap().len(), 1);
    assert!(session.assert_storage_set("theme", Some("dark")).is_ok());
    assert!(session.assert_storage_set("theme", Some("light")).is_err());
    assert_eq!(session.console_problems().len(), 1);
    assert!(session.assert_no_console_errors().is_err());
    assert_eq!(session.dom_additions("div.alert").unwrap().len(), 1);
    assert!(session.assert_dom_added("#toast").is_ok());
    assert!(session.assert_dom_added("span.alert").is_err());
    assert_eq!(session.containing("Saved").len(), 1);
    assert!(session.assert_captured(CaptureType::ConsoleLog, "render").is_ok());
}

/// Transport stand-in that records enabled domains and lets the test push
/// events to registered listeners.
#[derive(Default)]
struct EventSource {
    listeners: Mutex<Vec<(ListenerId, EventListener)>>,
    enabled: Mutex<Vec<String>>,
    next: AtomicU64,
}

impl EventSource {
    fn push(&self, session: &str, method: &str, params: Value) {
        let event = TransportEvent {
            method: method.to_string(),
            params,
            session_id: Some(session.to_string()),
        };
        let listeners: Vec<EventListener> =
            self.listeners.lock().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(&event);
        }
    }
}

#[async_trait]
impl CdpTransport for EventSource {
    async fn send_to(
        &self,
        _target: CommandTarget,
        method: &str,
        _params: Value,
    ) -> Result<Value, AdapterError> {
        Err(AdapterError::new(AdapterErrorKind::Command).with_hint(method.to_string()))
    }

    async fn enable_for(&self, _target: CommandTarget, domain: &str) -> Result<(), AdapterError> {
        self.enabled.lock().push(domain.to_string());
        Ok(())
    }

    fn add_event_listener(&self, listener: EventListener) -> ListenerId {
        let id = ListenerId::from_raw(self.next.fetch_add(1, Ordering::SeqCst));
        self.listeners.lock().push((id, listener));
        id
    }

    fn remove_event_listener(&self, id: ListenerId) {
        self.listeners.lock().retain(|(known, _)| *known != id);
    }

    async fn close(&self) {}

    fn is_closed(&self) -> bool {
        false
    }
}

#[tokio::test]
async fn network_domain_events_become_captures() {
    let page = Arc::new(ShimPage::default());
    let source = Arc::new(EventSource::default());
    let config = CaptureConfig {
        network_domain: true,
        ..fast_config()
    };
    let session = CaptureSession::new(page.clone(), config).with_network_feed(NetworkFeed {
        transport: source.clone(),
        target: CommandTarget::Session("S1".into()),
    });
    session.start().await.unwrap();

    assert_eq!(source.enabled.lock().clone(), vec!["Network".to_string()]);
    assert!(page.scripts.lock()[0].contains("var TRACK_NETWORK = false;"));

    source.push(
        "S1",
        "Network.requestWillBeSent",
        json!({"requestId": "r1", "timestamp": 5.0, "wallTime": 1767225600.0,
               "request": {"url": "https://shop.test/api/pay", "method": "POST", "postData": "{\"amount\":5}"}}),
    );
    source.push(
        "S2",
        "Network.requestWillBeSent",
        json!({"requestId": "r9", "timestamp": 5.0, "request": {"url": "https://other.test/", "method": "GET"}}),
    );
    source.push(
        "S1",
        "Network.responseReceived",
        json!({"requestId": "r1", "timestamp": 5.5, "response": {"url": "https://shop.test/api/pay", "status": 502}}),
    );
    wait_for_len(&session, 2).await;
    session.stop().await;

    assert!(source.listeners.lock().is_empty());
    assert!(session.assert_request_made("/api/pay", Some("post")).is_ok());
    let responses = session.network("/api/pay", Some("POST")).unwrap();
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[1].duration_ms, Some(500.0));
    assert!(session.assert_no_server_errors().is_err());
    assert!(session.network("other\\.test", None).unwrap().is_empty());
}
