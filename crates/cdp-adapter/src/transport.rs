use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::protocol::{parse_inbound, BrowserVersion, CommandRequest, Inbound, TargetListEntry};

pub use crate::protocol::TransportEvent;

/// Callback invoked for every inbound event, in arrival order.
pub type EventListener = Arc<dyn Fn(&TransportEvent) + Send + Sync>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// For transports implemented outside this crate.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum CommandTarget {
    Browser,
    Session(String),
}

impl CommandTarget {
    fn session_id(&self) -> Option<&str> {
        match self {
            CommandTarget::Browser => None,
            CommandTarget::Session(id) => Some(id.as_str()),
        }
    }
}

#[async_trait]
pub trait CdpTransport: Send + Sync {
    async fn send_to(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError>;

    async fn send_command(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        self.send_to(CommandTarget::Browser, method, params).await
    }

    /// Issues `<domain>.enable` once per target; later calls are no-ops.
    async fn enable_for(&self, target: CommandTarget, domain: &str) -> Result<(), AdapterError>;

    async fn enable(&self, domain: &str) -> Result<(), AdapterError> {
        self.enable_for(CommandTarget::Browser, domain).await
    }

    fn add_event_listener(&self, listener: EventListener) -> ListenerId;

    fn remove_event_listener(&self, id: ListenerId);

    /// Idempotent. Pending and later commands fail with a connection error.
    async fn close(&self);

    fn is_closed(&self) -> bool;
}

#[derive(Default)]
pub struct NoopTransport {
    listeners: AtomicU64,
}

#[async_trait]
impl CdpTransport for NoopTransport {
    async fn send_to(
        &self,
        _target: CommandTarget,
        method: &str,
        _params: Value,
    ) -> Result<Value, AdapterError> {
        Err(AdapterError::new(AdapterErrorKind::Internal)
            .with_hint(format!("transport not available for method {method}")))
    }

    async fn enable_for(&self, _target: CommandTarget, _domain: &str) -> Result<(), AdapterError> {
        Ok(())
    }

    fn add_event_listener(&self, _listener: EventListener) -> ListenerId {
        ListenerId(self.listeners.fetch_add(1, Ordering::Relaxed))
    }

    fn remove_event_listener(&self, _id: ListenerId) {}

    async fn close(&self) {}

    fn is_closed(&self) -> bool {
        true
    }
}

struct PendingCommand {
    method: String,
    responder: oneshot::Sender<Result<Value, AdapterError>>,
}

struct Shared {
    pending: DashMap<u64, PendingCommand>,
    listeners: RwLock<Vec<(ListenerId, EventListener)>>,
    enabled: DashSet<(CommandTarget, String)>,
    closed: AtomicBool,
    next_id: AtomicU64,
    next_listener: AtomicU64,
    shutdown: CancellationToken,
}

impl Shared {
    fn fail_pending(&self, hint: &str) {
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, pending)) = self.pending.remove(&id) {
                let _ = pending.responder.send(Err(AdapterError::connection(format!(
                    "{} aborted: {hint}",
                    pending.method
                ))));
            }
        }
    }
}

/// Websocket connection to a remote debugging endpoint.
///
/// One loop task owns the socket (writes queued frames, reads replies and
/// events). Replies are matched to callers through the pending map; events go
/// through an unbounded channel to a dispatcher task so listeners never hold
/// up the socket.
pub struct WsTransport {
    cfg: CdpConfig,
    endpoint: String,
    shared: Arc<Shared>,
    frame_tx: mpsc::Sender<String>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WsTransport {
    /// Discovers the websocket URL (unless configured) and completes the upgrade.
    pub async fn connect(cfg: CdpConfig) -> Result<Self, AdapterError> {
        let endpoint = match cfg.websocket_url.clone() {
            Some(url) => url,
            None => discover_websocket_url(&cfg).await?,
        };
        let parsed = url::Url::parse(&endpoint).map_err(|err| {
            AdapterError::connection(format!("malformed websocket url '{endpoint}': {err}"))
        })?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(AdapterError::connection(format!(
                "unsupported websocket scheme '{}'",
                parsed.scheme()
            )));
        }

        let handshake = tokio_tungstenite::connect_async(endpoint.as_str());
        let (stream, _) = tokio::time::timeout(cfg.discovery_timeout(), handshake)
            .await
            .map_err(|_| AdapterError::connection(format!("handshake with {endpoint} timed out")))?
            .map_err(|err| {
                AdapterError::connection(format!("handshake with {endpoint} failed: {err}"))
            })?;

        info!(target: "cdp-transport", url = %endpoint, "debugger connection established");
        Ok(Self::from_stream(stream, cfg, endpoint))
    }

    /// Wraps an already upgraded stream.
    pub fn from_stream<S>(stream: WebSocketStream<S>, cfg: CdpConfig, endpoint: String) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let shared = Arc::new(Shared {
            pending: DashMap::new(),
            listeners: RwLock::new(Vec::new()),
            enabled: DashSet::new(),
            closed: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            next_listener: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        });

        let (frame_tx, frame_rx) = mpsc::channel(cfg.command_buffer.max(1));
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let loop_shared = shared.clone();
        let loop_task = tokio::spawn(async move {
            let result = run_loop(stream, frame_rx, event_tx, &loop_shared).await;
            loop_shared.closed.store(true, Ordering::SeqCst);
            let hint = match &result {
                Ok(()) => "connection closed".to_string(),
                Err(err) => err.to_string(),
            };
            loop_shared.fail_pending(&hint);
            if let Err(err) = result {
                error!(target: "cdp-transport", %err, "transport loop terminated with error");
            }
        });

        let dispatch_shared = shared.clone();
        let dispatch_task = tokio::spawn(dispatch_events(event_rx, dispatch_shared));

        Self {
            cfg,
            endpoint,
            shared,
            frame_tx,
            tasks: Mutex::new(vec![loop_task, dispatch_task]),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn pending_commands(&self) -> usize {
        self.shared.pending.len()
    }
}

#[async_trait]
impl CdpTransport for WsTransport {
    async fn send_to(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(AdapterError::connection(format!(
                "{method} rejected: connection closed"
            )));
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let request = CommandRequest {
            id,
            method,
            params: &params,
            session_id: target.session_id(),
        };
        let frame = serde_json::to_string(&request).map_err(|err| {
            AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string())
        })?;
        trace!(target: "cdp-transport", id, method, "send");

        let (responder, response_rx) = oneshot::channel();
        self.shared.pending.insert(
            id,
            PendingCommand {
                method: method.to_string(),
                responder,
            },
        );

        if self.frame_tx.send(frame).await.is_err() || self.shared.closed.load(Ordering::SeqCst) {
            self.shared.pending.remove(&id);
            return Err(AdapterError::connection(format!(
                "{method} rejected: connection closed"
            )));
        }

        match tokio::time::timeout(self.cfg.command_timeout(), response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AdapterError::connection(format!(
                "{method} aborted: response channel closed"
            ))),
            Err(_) => {
                self.shared.pending.remove(&id);
                warn!(target: "cdp-transport", id, method, "command timed out");
                Err(AdapterError::new(AdapterErrorKind::CommandTimeout)
                    .with_hint(format!(
                        "{method} got no response within {} ms",
                        self.cfg.command_timeout_ms
                    ))
                    .retriable(true))
            }
        }
    }

    async fn enable_for(&self, target: CommandTarget, domain: &str) -> Result<(), AdapterError> {
        let key = (target.clone(), domain.to_string());
        if !self.shared.enabled.insert(key.clone()) {
            return Ok(());
        }
        let method = format!("{domain}.enable");
        match self
            .send_to(target, &method, Value::Object(Default::default()))
            .await
        {
            Ok(_) => {
                debug!(target: "cdp-transport", domain, "domain enabled");
                Ok(())
            }
            Err(err) => {
                self.shared.enabled.remove(&key);
                Err(err)
            }
        }
    }

    fn add_event_listener(&self, listener: EventListener) -> ListenerId {
        let id = ListenerId(self.shared.next_listener.fetch_add(1, Ordering::Relaxed));
        self.shared.listeners.write().push((id, listener));
        id
    }

    fn remove_event_listener(&self, id: ListenerId) {
        self.shared
            .listeners
            .write()
            .retain(|(existing, _)| *existing != id);
    }

    async fn close(&self) {
        let first = !self.shared.closed.swap(true, Ordering::SeqCst);
        self.shared.shutdown.cancel();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for handle in handles {
            if let Err(err) = handle.await {
                debug!(target: "cdp-transport", ?err, "transport task ended abnormally");
            }
        }
        self.shared.fail_pending("connection closed");
        if first {
            info!(target: "cdp-transport", url = %self.endpoint, "debugger connection closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}

async fn run_loop<S>(
    stream: WebSocketStream<S>,
    mut frame_rx: mpsc::Receiver<String>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    shared: &Shared,
) -> Result<(), AdapterError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            _ = shared.shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return Ok(());
            }
            Some(frame) = frame_rx.recv() => {
                sink.send(Message::Text(frame.into())).await.map_err(|err| {
                    AdapterError::connection(format!("websocket write failed: {err}"))
                })?;
            }
            message = source.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => handle_text(text.as_str(), shared, &event_tx),
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(target: "cdp-transport", "websocket closed by peer");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        return Err(AdapterError::connection(format!("websocket read failed: {err}")));
                    }
                }
            }
        }
    }
}

fn handle_text(text: &str, shared: &Shared, event_tx: &mpsc::UnboundedSender<TransportEvent>) {
    match parse_inbound(text) {
        Ok(Inbound::Response { id, outcome }) => match shared.pending.remove(&id) {
            Some((_, pending)) => {
                let result = outcome.map_err(|remote| {
                    AdapterError::command(&pending.method, remote.code, &remote.message)
                });
                let _ = pending.responder.send(result);
            }
            None => debug!(target: "cdp-transport", id, "response for unknown or expired command"),
        },
        Ok(Inbound::Event(event)) => {
            trace!(target: "cdp-transport", method = %event.method, "event");
            let _ = event_tx.send(event);
        }
        Err(err) => warn!(target: "cdp-transport", %err, "dropping inbound message"),
    }
}

async fn dispatch_events(mut event_rx: mpsc::UnboundedReceiver<TransportEvent>, shared: Arc<Shared>) {
    while let Some(event) = event_rx.recv().await {
        let listeners: Vec<EventListener> = shared
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(&event);
        }
    }
}

async fn discover_websocket_url(cfg: &CdpConfig) -> Result<String, AdapterError> {
    let base = cfg.http_endpoint();
    let client = reqwest::Client::builder()
        .timeout(cfg.discovery_timeout())
        .build()
        .map_err(|err| AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string()))?;

    let version_error = match client.get(format!("{base}/json/version")).send().await {
        Ok(response) => match response.json::<BrowserVersion>().await {
            Ok(BrowserVersion {
                web_socket_debugger_url: Some(url),
                browser,
            }) => {
                debug!(target: "cdp-transport", %browser, "discovered browser endpoint");
                return Ok(url);
            }
            Ok(_) => "/json/version has no webSocketDebuggerUrl".to_string(),
            Err(err) => format!("/json/version malformed: {err}"),
        },
        Err(err) => format!("/json/version unreachable: {err}"),
    };

    let list_error = match client.get(format!("{base}/json/list")).send().await {
        Ok(response) => match response.json::<Vec<TargetListEntry>>().await {
            Ok(targets) => {
                if let Some(url) = targets
                    .into_iter()
                    .filter(|target| target.target_type == "page")
                    .find_map(|target| target.web_socket_debugger_url)
                {
                    return Ok(url);
                }
                "/json/list has no debuggable page".to_string()
            }
            Err(err) => format!("/json/list malformed: {err}"),
        },
        Err(err) => format!("/json/list unreachable: {err}"),
    };

    Err(AdapterError::connection(format!(
        "no debugger endpoint at {base} ({version_error}; {list_error})"
    )))
}
