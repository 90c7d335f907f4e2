//! Capture session: shim injection plus the background drain poller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdp_adapter::{
    AdapterError, CdpPage, CdpTransport, CommandTarget, ListenerId, PageDriver, TransportEvent,
};
use parking_lot::Mutex;
use replay_core_types::{Capture, CaptureType};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assertions;
use crate::config::CaptureConfig;
use crate::errors::CaptureError;
use crate::log::CaptureLog;
use crate::network::NetworkTracker;
use crate::query;
use crate::report::CaptureReport;
use crate::shim::{
    injection_script, parse_drained, watch_script, ALREADY_ACTIVE, DEACTIVATE_SCRIPT, DRAIN_SCRIPT,
    RESET_SCRIPT,
};

/// Page context the shim lives in.
#[async_trait]
pub trait ShimHost: Send + Sync {
    async fn evaluate(&self, expression: &str) -> Result<Value, AdapterError>;
}

/// [`ShimHost`] over any page driver.
pub struct PageHost(pub Arc<dyn PageDriver>);

#[async_trait]
impl ShimHost for PageHost {
    async fn evaluate(&self, expression: &str) -> Result<Value, AdapterError> {
        self.0.evaluate(expression).await
    }
}

/// Source of Network-domain events for the attached page.
#[derive(Clone)]
pub struct NetworkFeed {
    pub transport: Arc<dyn CdpTransport>,
    pub target: CommandTarget,
}

impl NetworkFeed {
    pub fn for_page(page: &CdpPage) -> Self {
        Self {
            transport: page.transport(),
            target: page.command_target(),
        }
    }

    fn accepts(&self, event: &TransportEvent) -> bool {
        match (&self.target, event.session_id.as_deref()) {
            (CommandTarget::Session(wanted), Some(actual)) => wanted == actual,
            (CommandTarget::Session(_), None) => false,
            (CommandTarget::Browser, _) => true,
        }
    }
}

/// Handle for the running poller, in the same shape as other background loops.
struct PollerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    listener: Option<(Arc<dyn CdpTransport>, ListenerId)>,
}

impl PollerHandle {
    /// Cancels the loop and waits for it; the loop drains once on its way out.
    async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => {}
                Err(err) => warn!(target: "capture-tap", error = %err, "poller task ended abnormally"),
            }
        }
        if let Some((transport, id)) = self.listener.take() {
            transport.remove_event_listener(id);
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some((transport, id)) = self.listener.take() {
            transport.remove_event_listener(id);
        }
    }
}

/// Single writer of the capture log.
struct Drainer {
    host: Arc<dyn ShimHost>,
    log: Arc<CaptureLog>,
    bus: broadcast::Sender<Capture>,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    tracker: NetworkTracker,
}

impl Drainer {
    async fn drain(&mut self) -> usize {
        let mut batch = Vec::new();
        let drained = match self.host.evaluate(DRAIN_SCRIPT).await {
            Ok(value) => parse_drained(value),
            Err(err) => Err(CaptureError::Drain(err.to_string())),
        };
        match drained {
            Ok(Some(items)) => batch.extend(items),
            Ok(None) => debug!(target: "capture-tap", "shim not present; waiting for reattach"),
            Err(err) => debug!(target: "capture-tap", error = %err, "drain failed; retrying next tick"),
        }

        if let Some(events) = self.events.as_mut() {
            while let Ok(event) = events.try_recv() {
                if let Some(raw) = self.tracker.observe(&event) {
                    batch.push(raw);
                }
            }
        }

        let appended = self.log.append_batch(batch);
        for capture in &appended {
            let _ = self.bus.send(capture.clone());
        }
        appended.len()
    }
}

async fn run_poller(mut drainer: Drainer, token: CancellationToken, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                let last = drainer.drain().await;
                debug!(target: "capture-tap", captured = last, "final drain");
                break;
            }
            _ = ticker.tick() => {
                drainer.drain().await;
            }
        }
    }
}

pub struct CaptureSession {
    host: Arc<dyn ShimHost>,
    feed: Option<NetworkFeed>,
    config: CaptureConfig,
    log: Arc<CaptureLog>,
    bus: broadcast::Sender<Capture>,
    watched: Mutex<Vec<String>>,
    network_events: AtomicBool,
    poller: AsyncMutex<Option<PollerHandle>>,
}

impl CaptureSession {
    pub fn new(host: Arc<dyn ShimHost>, config: CaptureConfig) -> Self {
        let (bus, _) = broadcast::channel(config.listener_buffer.max(1));
        Self {
            host,
            feed: None,
            config,
            log: Arc::new(CaptureLog::new()),
            bus,
            watched: Mutex::new(Vec::new()),
            network_events: AtomicBool::new(false),
            poller: AsyncMutex::new(None),
        }
    }

    pub fn for_page(page: Arc<dyn PageDriver>, config: CaptureConfig) -> Self {
        Self::new(Arc::new(PageHost(page)), config)
    }

    /// Takes network traffic from protocol events when
    /// [`CaptureConfig::network_domain`] is on.
    pub fn with_network_feed(mut self, feed: NetworkFeed) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        self.poller.lock().await.is_some()
    }

    /// Clears the log, restarts numbering, injects the shim and starts the
    /// poller. A running session is stopped first. Anything the page queued
    /// before this call is discarded.
    pub async fn start(&self) -> Result<(), CaptureError> {
        let mut slot = self.poller.lock().await;
        if let Some(previous) = slot.take() {
            previous.shutdown().await;
        }
        self.log.reset();

        let (events, listener) = self.subscribe_network().await;
        self.network_events
            .store(events.is_some(), Ordering::SeqCst);
        if let Err(err) = self.inject().await {
            if let Some((transport, id)) = listener {
                transport.remove_event_listener(id);
            }
            return Err(err);
        }
        if let Err(err) = self.host.evaluate(RESET_SCRIPT).await {
            debug!(target: "capture-tap", error = %err, "stale page queue not discarded");
        }

        let drainer = Drainer {
            host: self.host.clone(),
            log: self.log.clone(),
            bus: self.bus.clone(),
            events,
            tracker: NetworkTracker::new(self.config.max_body_chars),
        };
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_poller(
            drainer,
            cancel.clone(),
            self.config.poll_interval(),
        ));
        *slot = Some(PollerHandle {
            cancel,
            task: Some(task),
            listener,
        });
        info!(
            target: "capture-tap",
            poll_ms = self.config.poll_interval_ms,
            network_events = self.network_events.load(Ordering::SeqCst),
            "capture started"
        );
        Ok(())
    }

    /// Re-injects the shim after a navigation. A no-op while stopped, and a
    /// no-op inside the page when the shim is still active.
    pub async fn reattach(&self) -> Result<(), CaptureError> {
        if self.poller.lock().await.is_none() {
            debug!(target: "capture-tap", "reattach ignored; capture not running");
            return Ok(());
        }
        self.inject().await
    }

    /// Drains one last time, halts the poller and switches the shim off so the
    /// page stops queueing. Nothing is appended after this returns. Calling it
    /// again does nothing.
    pub async fn stop(&self) {
        let running = self.poller.lock().await.take();
        if let Some(handle) = running {
            handle.shutdown().await;
            if let Err(err) = self.host.evaluate(DEACTIVATE_SCRIPT).await {
                debug!(target: "capture-tap", error = %err, "shim not deactivated");
            }
            info!(target: "capture-tap", captured = self.log.len(), "capture stopped");
        }
    }

    /// Empties the log without touching numbering or the poller.
    pub fn clear(&self) {
        self.log.clear();
    }

    /// Live feed of captures as they are appended.
    pub fn subscribe(&self) -> broadcast::Receiver<Capture> {
        self.bus.subscribe()
    }

    /// Records changes of a global variable path as `js-variable` captures.
    pub async fn watch_variable(&self, path: &str) -> Result<(), CaptureError> {
        {
            let mut watched = self.watched.lock();
            if !watched.iter().any(|known| known == path) {
                watched.push(path.to_string());
            }
        }
        if self.is_running().await {
            self.host.evaluate(&watch_script(path)).await?;
        }
        Ok(())
    }

    async fn inject(&self) -> Result<(), CaptureError> {
        let track_network = !self.network_events.load(Ordering::SeqCst);
        let script = injection_script(self.config.max_body_chars, track_network);
        let outcome = self
            .host
            .evaluate(&script)
            .await
            .map_err(|err| CaptureError::Injection(err.to_string()))?;
        if outcome.as_str() == Some(ALREADY_ACTIVE) {
            debug!(target: "capture-tap", "shim already active");
        } else {
            debug!(target: "capture-tap", "shim injected");
        }

        let watched = self.watched.lock().clone();
        for path in watched {
            if let Err(err) = self.host.evaluate(&watch_script(&path)).await {
                debug!(target: "capture-tap", path = %path, error = %err, "variable watch not registered");
            }
        }
        Ok(())
    }

    async fn subscribe_network(
        &self,
    ) -> (
        Option<mpsc::UnboundedReceiver<TransportEvent>>,
        Option<(Arc<dyn CdpTransport>, ListenerId)>,
    ) {
        if !self.config.network_domain {
            return (None, None);
        }
        let Some(feed) = self.feed.clone() else {
            warn!(target: "capture-tap", "network_domain set but no live connection; using shim hooks");
            return (None, None);
        };
        if let Err(err) = feed
            .transport
            .enable_for(feed.target.clone(), "Network")
            .await
        {
            warn!(target: "capture-tap", error = %err, "Network domain unavailable; using shim hooks");
            return (None, None);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let filter = feed.clone();
        let id = feed.transport.add_event_listener(Arc::new(move |event: &TransportEvent| {
            if NetworkTracker::is_network_event(event) && filter.accepts(event) {
                let _ = tx.send(event.clone());
            }
        }));
        (Some(rx), Some((feed.transport, id)))
    }

    // Queries

    pub fn captures(&self) -> Vec<Capture> {
        self.log.snapshot()
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn of_type(&self, capture_type: CaptureType) -> Vec<Capture> {
        self.log.read(|all| query::of_type(all, capture_type))
    }

    pub fn containing(&self, needle: &str) -> Vec<Capture> {
        self.log.read(|all| query::containing(all, needle))
    }

    pub fn network(
        &self,
        url_pattern: &str,
        method: Option<&str>,
    ) -> Result<Vec<Capture>, CaptureError> {
        self.log.read(|all| query::network(all, url_pattern, method))
    }

    pub fn storage(&self, key_pattern: &str) -> Result<Vec<Capture>, CaptureError> {
        self.log.read(|all| query::storage(all, key_pattern))
    }

    pub fn console_problems(&self) -> Vec<Capture> {
        self.log.read(query::console_problems)
    }

    pub fn dom_additions(&self, selector: &str) -> Result<Vec<Capture>, CaptureError> {
        self.log.read(|all| query::dom_additions(all, selector))
    }

    // Assertions

    pub fn assert_no_server_errors(&self) -> Result<(), CaptureError> {
        self.log.read(assertions::no_server_errors)
    }

    pub fn assert_request_made(
        &self,
        url_pattern: &str,
        method: Option<&str>,
    ) -> Result<(), CaptureError> {
        self.log
            .read(|all| assertions::request_made(all, url_pattern, method))
    }

    pub fn assert_response_status(&self, url_pattern: &str, status: u16) -> Result<(), CaptureError> {
        self.log
            .read(|all| assertions::response_status(all, url_pattern, status))
    }

    pub fn assert_no_console_errors(&self) -> Result<(), CaptureError> {
        self.log.read(assertions::no_console_errors)
    }

    pub fn assert_storage_set(
        &self,
        key_pattern: &str,
        value: Option<&str>,
    ) -> Result<(), CaptureError> {
        self.log
            .read(|all| assertions::storage_set(all, key_pattern, value))
    }

    pub fn assert_dom_added(&self, selector: &str) -> Result<(), CaptureError> {
        self.log.read(|all| assertions::dom_added(all, selector))
    }

    pub fn assert_captured(
        &self,
        capture_type: CaptureType,
        needle: &str,
    ) -> Result<(), CaptureError> {
        self.log
            .read(|all| assertions::captured(all, capture_type, needle))
    }

    pub fn report(&self) -> String {
        self.log.read(CaptureReport::render)
    }
}
