//! Page-level operations on top of the connector.
//!
//! Elements are addressed through remote object ids returned by
//! `Runtime.evaluate` / `Runtime.callFunctionOn`; all lookups run against the
//! document of the currently selected frame.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::protocol::TargetInfo;
use crate::transport::{CdpTransport, CommandTarget, ListenerId, TransportEvent};

const CONSOLE_HISTORY: usize = 1_000;

/// One live lookup strategy.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum FindBy {
    Id(String),
    Name(String),
    Css(String),
    XPath(String),
}

impl FindBy {
    pub fn kind(&self) -> &'static str {
        match self {
            FindBy::Id(_) => "id",
            FindBy::Name(_) => "name",
            FindBy::Css(_) => "css",
            FindBy::XPath(_) => "xpath",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            FindBy::Id(value) | FindBy::Name(value) | FindBy::Css(value) | FindBy::XPath(value) => {
                value
            }
        }
    }
}

impl std::fmt::Display for FindBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.kind(), self.value())
    }
}

/// Opaque reference to a live DOM element.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ElementHandle {
    pub object_id: String,
    pub description: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClickKind {
    Single,
    Double,
    Context,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DialogInfo {
    /// `alert`, `confirm`, `prompt` or `beforeunload`.
    pub kind: String,
    pub message: String,
    pub default_prompt: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub id: String,
    pub title: String,
    pub url: String,
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    /// `Ok(None)` when nothing matches; `Err` when the lookup itself failed.
    async fn find(&self, by: &FindBy) -> Result<Option<ElementHandle>, AdapterError>;

    async fn element_text(&self, element: &ElementHandle) -> Result<String, AdapterError>;
    async fn element_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, AdapterError>;
    async fn element_value(&self, element: &ElementHandle) -> Result<String, AdapterError>;
    async fn is_visible(&self, element: &ElementHandle) -> Result<bool, AdapterError>;

    async fn click(&self, element: &ElementHandle, kind: ClickKind) -> Result<(), AdapterError>;
    async fn type_text(
        &self,
        element: &ElementHandle,
        text: &str,
        clear: bool,
    ) -> Result<(), AdapterError>;
    async fn press_key(
        &self,
        element: Option<&ElementHandle>,
        key: &str,
    ) -> Result<(), AdapterError>;
    async fn select_option(&self, element: &ElementHandle, option: &str)
        -> Result<(), AdapterError>;
    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<(), AdapterError>;
    async fn scroll_to(&self, x: f64, y: f64) -> Result<(), AdapterError>;
    async fn hover(&self, element: &ElementHandle) -> Result<(), AdapterError>;
    async fn drag_and_drop(
        &self,
        source: &ElementHandle,
        destination: &ElementHandle,
    ) -> Result<(), AdapterError>;

    async fn navigate(&self, url: &str) -> Result<(), AdapterError>;
    async fn evaluate(&self, expression: &str) -> Result<Value, AdapterError>;
    async fn page_markup(&self) -> Result<String, AdapterError>;
    async fn current_url(&self) -> Result<String, AdapterError>;
    async fn title(&self) -> Result<String, AdapterError>;
    async fn screenshot(&self) -> Result<Vec<u8>, AdapterError>;

    /// `None` returns to the top-level document.
    async fn switch_to_frame(&self, frame: Option<&ElementHandle>) -> Result<(), AdapterError>;

    /// Selects the frame reached by following css selectors from the top document.
    async fn switch_to_frame_path(&self, path: &[String]) -> Result<(), AdapterError> {
        self.switch_to_frame(None).await?;
        for selector in path {
            let frame = self
                .find(&FindBy::Css(selector.clone()))
                .await?
                .ok_or_else(|| {
                    AdapterError::new(AdapterErrorKind::TargetNotFound)
                        .with_hint(format!("frame '{selector}' not found"))
                })?;
            self.switch_to_frame(Some(&frame)).await?;
        }
        Ok(())
    }

    /// Matches by zero-based index, then title or URL substring.
    async fn switch_to_window(&self, window: &str) -> Result<(), AdapterError>;
    async fn close_window(&self, id: &str) -> Result<(), AdapterError>;
    /// Top-level windows opened since attach that were not acknowledged.
    async fn new_windows(&self) -> Result<Vec<WindowInfo>, AdapterError>;
    async fn acknowledge_window(&self, id: &str) -> Result<(), AdapterError>;

    async fn open_dialog(&self) -> Result<Option<DialogInfo>, AdapterError>;
    async fn handle_dialog(
        &self,
        accept: bool,
        prompt_text: Option<&str>,
    ) -> Result<(), AdapterError>;

    /// Description of a visible in-page modal overlay, if one is present.
    async fn detect_modal(&self) -> Result<Option<String>, AdapterError>;

    async fn console_transcript(&self) -> Result<Vec<String>, AdapterError>;
}

const FIND_FN: &str = r#"function(kind, value) {
    const doc = this;
    switch (kind) {
        case 'id': return doc.getElementById(value);
        case 'name': return doc.getElementsByName(value)[0] || null;
        case 'css': return doc.querySelector(value);
        case 'xpath': return doc.evaluate(value, doc, null, 9, null).singleNodeValue;
    }
    return null;
}"#;

const CENTER_FN: &str = r#"function() {
    this.scrollIntoView({ block: 'center', inline: 'center' });
    const rect = this.getBoundingClientRect();
    let x = rect.left + rect.width / 2;
    let y = rect.top + rect.height / 2;
    let view = this.ownerDocument.defaultView;
    while (view && view.frameElement) {
        const frame = view.frameElement.getBoundingClientRect();
        x += frame.left;
        y += frame.top;
        view = view.parent;
    }
    return { x, y, width: rect.width, height: rect.height };
}"#;

const FOCUS_FN: &str = r#"function(clear) {
    if (typeof this.focus === 'function') { this.focus(); }
    if (clear && 'value' in this) {
        this.value = '';
        this.dispatchEvent(new Event('input', { bubbles: true }));
    }
    return true;
}"#;

const SELECT_FN: &str = r#"function(target) {
    const options = Array.from(this.options || []);
    let option = options.find(opt => opt.value === target);
    if (!option) { option = options.find(opt => opt.text.trim() === target); }
    if (!option) { return { status: 'option-missing' }; }
    this.value = option.value;
    option.selected = true;
    this.dispatchEvent(new Event('input', { bubbles: true }));
    this.dispatchEvent(new Event('change', { bubbles: true }));
    return { status: 'selected', value: this.value };
}"#;

const HTML5_DRAG_FN: &str = r#"function(target) {
    if (!this.draggable) { return false; }
    const data = new DataTransfer();
    const fire = (el, type) => el.dispatchEvent(new DragEvent(type, { bubbles: true, cancelable: true, dataTransfer: data }));
    fire(this, 'dragstart');
    fire(target, 'dragenter');
    fire(target, 'dragover');
    fire(target, 'drop');
    fire(this, 'dragend');
    return true;
}"#;

const VISIBLE_FN: &str = r#"function() {
    if (!this.isConnected) { return false; }
    const style = this.ownerDocument.defaultView.getComputedStyle(this);
    if (style.display === 'none' || style.visibility === 'hidden' || style.opacity === '0') { return false; }
    const rect = this.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
}"#;

const MODAL_PROBE: &str = r#"(() => {
    const visible = el => {
        const style = getComputedStyle(el);
        const rect = el.getBoundingClientRect();
        return style.display !== 'none' && style.visibility !== 'hidden' && rect.width > 0 && rect.height > 0;
    };
    const describe = el => {
        let label = el.tagName.toLowerCase();
        if (el.id) { label += '#' + el.id; }
        if (typeof el.className === 'string' && el.className.trim()) {
            label += '.' + el.className.trim().split(/\s+/).join('.');
        }
        return label;
    };
    for (const el of document.querySelectorAll('dialog[open], [aria-modal="true"], [role="dialog"], [role="alertdialog"]')) {
        if (visible(el)) { return describe(el); }
    }
    const area = innerWidth * innerHeight;
    for (const el of document.body ? document.body.querySelectorAll('*') : []) {
        const style = getComputedStyle(el);
        if (style.position !== 'fixed') { continue; }
        const z = parseInt(style.zIndex, 10);
        if (!(z >= 1000)) { continue; }
        const rect = el.getBoundingClientRect();
        if (visible(el) && rect.width * rect.height >= area * 0.5) { return describe(el); }
    }
    return null;
})()"#;

#[derive(Debug, Deserialize)]
struct Point {
    x: f64,
    y: f64,
}

/// Live page driven over a [`CdpTransport`].
pub struct CdpPage {
    transport: Arc<dyn CdpTransport>,
    cfg: CdpConfig,
    target: RwLock<CommandTarget>,
    window_id: RwLock<Option<String>>,
    /// Remote object id of the selected frame's document; `None` is the top document.
    scope: RwLock<Option<String>>,
    known_windows: RwLock<HashSet<String>>,
    dialog: Arc<Mutex<Option<DialogInfo>>>,
    console: Arc<Mutex<VecDeque<String>>>,
    listener: ListenerId,
}

impl CdpPage {
    /// Attaches to the first page target (flattened session) when connected
    /// to the browser endpoint, or drives the connection directly when it
    /// already points at a page.
    pub async fn attach(
        transport: Arc<dyn CdpTransport>,
        cfg: CdpConfig,
    ) -> Result<Self, AdapterError> {
        let dialog = Arc::new(Mutex::new(None));
        let console = Arc::new(Mutex::new(VecDeque::new()));
        let listener = {
            let dialog = dialog.clone();
            let console = console.clone();
            transport.add_event_listener(Arc::new(move |event: &TransportEvent| {
                observe_event(event, &dialog, &console);
            }))
        };

        let page = Self {
            transport,
            cfg,
            target: RwLock::new(CommandTarget::Browser),
            window_id: RwLock::new(None),
            scope: RwLock::new(None),
            known_windows: RwLock::new(HashSet::new()),
            dialog,
            console,
            listener,
        };

        match page.page_targets().await {
            Ok(targets) => {
                let first = targets.first().cloned().ok_or_else(|| {
                    AdapterError::connection("browser has no page target to attach to")
                })?;
                page.known_windows
                    .write()
                    .extend(targets.iter().map(|t| t.target_id.clone()));
                page.attach_target(&first.target_id).await?;
            }
            Err(err) => {
                debug!(target: "cdp-transport", %err, "target domain unavailable; driving page connection directly");
                page.enable_domains().await?;
            }
        }
        Ok(page)
    }

    pub fn transport(&self) -> Arc<dyn CdpTransport> {
        self.transport.clone()
    }

    /// Command target of the attached page; extra domains are enabled here.
    pub fn command_target(&self) -> CommandTarget {
        self.target.read().clone()
    }

    async fn enable_domains(&self) -> Result<(), AdapterError> {
        let target = self.target.read().clone();
        self.transport.enable_for(target.clone(), "Page").await?;
        self.transport.enable_for(target, "Runtime").await?;
        Ok(())
    }

    async fn attach_target(&self, target_id: &str) -> Result<(), AdapterError> {
        let attached = self
            .transport
            .send_command(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session_id = attached
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Protocol)
                    .with_hint("attachToTarget returned no sessionId")
            })?
            .to_string();
        *self.target.write() = CommandTarget::Session(session_id);
        *self.window_id.write() = Some(target_id.to_string());
        *self.scope.write() = None;
        self.enable_domains().await?;
        info!(target: "cdp-transport", target_id, "attached to page");
        Ok(())
    }

    async fn page_targets(&self) -> Result<Vec<TargetInfo>, AdapterError> {
        let response = self
            .transport
            .send_command("Target.getTargets", json!({}))
            .await?;
        let infos: Vec<TargetInfo> =
            serde_json::from_value(response.get("targetInfos").cloned().unwrap_or(Value::Null))
                .map_err(|err| {
                    AdapterError::new(AdapterErrorKind::Protocol).with_hint(err.to_string())
                })?;
        Ok(infos
            .into_iter()
            .filter(|info| info.target_type == "page")
            .collect())
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        let target = self.target.read().clone();
        self.transport.send_to(target, method, params).await
    }

    /// Unwraps `{result, exceptionDetails}` from evaluate/callFunctionOn.
    fn remote_result(method: &str, response: Value) -> Result<Value, AdapterError> {
        if let Some(details) = response.get("exceptionDetails") {
            let text = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("uncaught exception");
            return Err(AdapterError::new(AdapterErrorKind::Script)
                .with_hint(format!("{method}: {text}"))
                .with_data(details.clone()));
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    fn by_value(remote: Value) -> Value {
        remote.get("value").cloned().unwrap_or(Value::Null)
    }

    async fn call_in_scope(
        &self,
        function: &str,
        args: Vec<Value>,
        return_by_value: bool,
    ) -> Result<Value, AdapterError> {
        let scope = self.scope.read().clone();
        let response = match scope {
            Some(document_id) => {
                let arguments: Vec<Value> = args.into_iter().map(|v| json!({ "value": v })).collect();
                self.send(
                    "Runtime.callFunctionOn",
                    json!({
                        "objectId": document_id,
                        "functionDeclaration": function,
                        "arguments": arguments,
                        "returnByValue": return_by_value,
                        "awaitPromise": true,
                    }),
                )
                .await?
            }
            None => {
                let args_literal = Value::Array(args).to_string();
                self.send(
                    "Runtime.evaluate",
                    json!({
                        "expression": format!("({function}).apply(document, {args_literal})"),
                        "returnByValue": return_by_value,
                        "awaitPromise": true,
                    }),
                )
                .await?
            }
        };
        Self::remote_result("scope call", response)
    }

    async fn call_on(
        &self,
        element: &ElementHandle,
        function: &str,
        args: Vec<Value>,
    ) -> Result<Value, AdapterError> {
        let response = self
            .send(
                "Runtime.callFunctionOn",
                json!({
                    "objectId": element.object_id,
                    "functionDeclaration": function,
                    "arguments": args,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;
        Self::remote_result("element call", response).map(Self::by_value)
    }

    async fn center_of(&self, element: &ElementHandle) -> Result<Point, AdapterError> {
        let value = self.call_on(element, CENTER_FN, vec![]).await?;
        serde_json::from_value(value).map_err(|err| {
            AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("element {} has no geometry: {err}", element.description))
        })
    }

    async fn mouse(
        &self,
        event: &str,
        point: &Point,
        button: &str,
        click_count: u32,
    ) -> Result<(), AdapterError> {
        let buttons = match (event, button) {
            ("mouseMoved", _) | ("mouseReleased", _) => 0,
            (_, "right") => 2,
            _ => 1,
        };
        self.send(
            "Input.dispatchMouseEvent",
            json!({
                "type": event,
                "x": point.x,
                "y": point.y,
                "button": button,
                "buttons": buttons,
                "clickCount": click_count,
                "pointerType": "mouse",
            }),
        )
        .await?;
        Ok(())
    }

    async fn evaluate_top(&self, expression: &str) -> Result<Value, AdapterError> {
        let response = self
            .send(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;
        Self::remote_result("Runtime.evaluate", response).map(Self::by_value)
    }

    async fn wait_for_load(&self) -> Result<(), AdapterError> {
        let deadline = Instant::now() + self.cfg.navigation_timeout();
        loop {
            match self.evaluate_top("document.readyState").await {
                Ok(Value::String(state)) if state == "complete" => return Ok(()),
                Ok(_) => {}
                Err(err) if err.is_connection() => return Err(err),
                Err(err) => debug!(target: "cdp-transport", %err, "readyState probe failed"),
            }
            if Instant::now() >= deadline {
                return Err(AdapterError::new(AdapterErrorKind::Navigation).with_hint(format!(
                    "page did not finish loading within {} ms",
                    self.cfg.navigation_timeout_ms
                )));
            }
            sleep(Duration::from_millis(100)).await;
        }
    }
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        self.transport.remove_event_listener(self.listener);
    }
}

fn observe_event(
    event: &TransportEvent,
    dialog: &Mutex<Option<DialogInfo>>,
    console: &Mutex<VecDeque<String>>,
) {
    match event.method.as_str() {
        "Page.javascriptDialogOpening" => {
            let info = DialogInfo {
                kind: event.params["type"].as_str().unwrap_or("alert").to_string(),
                message: event.params["message"].as_str().unwrap_or_default().to_string(),
                default_prompt: event.params["defaultPrompt"].as_str().map(str::to_string),
            };
            debug!(target: "cdp-transport", kind = %info.kind, "dialog opened");
            *dialog.lock() = Some(info);
        }
        "Page.javascriptDialogClosed" => {
            *dialog.lock() = None;
        }
        "Runtime.consoleAPICalled" => {
            let level = event.params["type"].as_str().unwrap_or("log");
            let text = event.params["args"]
                .as_array()
                .map(|args| {
                    args.iter()
                        .map(|arg| match arg.get("value") {
                            Some(Value::String(s)) => s.clone(),
                            Some(other) => other.to_string(),
                            None => arg["description"].as_str().unwrap_or_default().to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .unwrap_or_default();
            push_console(console, format!("[{level}] {text}"));
        }
        "Runtime.exceptionThrown" => {
            let details = &event.params["exceptionDetails"];
            let text = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("uncaught exception");
            push_console(console, format!("[exception] {text}"));
        }
        _ => {}
    }
}

fn push_console(console: &Mutex<VecDeque<String>>, line: String) {
    let mut guard = console.lock();
    if guard.len() == CONSOLE_HISTORY {
        guard.pop_front();
    }
    guard.push_back(line);
}

/// `(key, code, windowsVirtualKeyCode, text)` for `Input.dispatchKeyEvent`.
fn key_definition(key: &str) -> (String, String, u32, Option<String>) {
    let named = |code: &str, vk: u32, text: Option<&str>| {
        (key.to_string(), code.to_string(), vk, text.map(str::to_string))
    };
    match key {
        "Enter" => named("Enter", 13, Some("\r")),
        "Tab" => named("Tab", 9, None),
        "Escape" => named("Escape", 27, None),
        "Backspace" => named("Backspace", 8, None),
        "Delete" => named("Delete", 46, None),
        "ArrowUp" => named("ArrowUp", 38, None),
        "ArrowDown" => named("ArrowDown", 40, None),
        "ArrowLeft" => named("ArrowLeft", 37, None),
        "ArrowRight" => named("ArrowRight", 39, None),
        "Home" => named("Home", 36, None),
        "End" => named("End", 35, None),
        "PageUp" => named("PageUp", 33, None),
        "PageDown" => named("PageDown", 34, None),
        " " | "Space" => (" ".to_string(), "Space".to_string(), 32, Some(" ".to_string())),
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphabetic() => (
                    c.to_string(),
                    format!("Key{}", c.to_ascii_uppercase()),
                    c.to_ascii_uppercase() as u32,
                    Some(c.to_string()),
                ),
                (Some(c), None) if c.is_ascii_digit() => (
                    c.to_string(),
                    format!("Digit{c}"),
                    c as u32,
                    Some(c.to_string()),
                ),
                _ => (other.to_string(), other.to_string(), 0, None),
            }
        }
    }
}

fn handle_from_remote(remote: &Value) -> Option<ElementHandle> {
    if remote.get("subtype").and_then(Value::as_str) == Some("null") {
        return None;
    }
    let object_id = remote.get("objectId").and_then(Value::as_str)?;
    Some(ElementHandle {
        object_id: object_id.to_string(),
        description: remote
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("element")
            .to_string(),
    })
}

#[async_trait]
impl PageDriver for CdpPage {
    async fn find(&self, by: &FindBy) -> Result<Option<ElementHandle>, AdapterError> {
        let remote = self
            .call_in_scope(FIND_FN, vec![json!(by.kind()), json!(by.value())], false)
            .await?;
        Ok(handle_from_remote(&remote))
    }

    async fn element_text(&self, element: &ElementHandle) -> Result<String, AdapterError> {
        let value = self
            .call_on(
                element,
                "function() { return (this.innerText ?? this.textContent ?? '').trim(); }",
                vec![],
            )
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn element_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, AdapterError> {
        let value = self
            .call_on(
                element,
                "function(name) { return this.getAttribute(name); }",
                vec![json!({ "value": name })],
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn element_value(&self, element: &ElementHandle) -> Result<String, AdapterError> {
        let value = self
            .call_on(
                element,
                "function() { return this.value === undefined ? '' : String(this.value); }",
                vec![],
            )
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool, AdapterError> {
        let value = self.call_on(element, VISIBLE_FN, vec![]).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn click(&self, element: &ElementHandle, kind: ClickKind) -> Result<(), AdapterError> {
        let point = self.center_of(element).await?;
        self.mouse("mouseMoved", &point, "none", 0).await?;
        let (button, clicks) = match kind {
            ClickKind::Single => ("left", 1),
            ClickKind::Double => ("left", 2),
            ClickKind::Context => ("right", 1),
        };
        for count in 1..=clicks {
            self.mouse("mousePressed", &point, button, count).await?;
            self.mouse("mouseReleased", &point, button, count).await?;
        }
        Ok(())
    }

    async fn type_text(
        &self,
        element: &ElementHandle,
        text: &str,
        clear: bool,
    ) -> Result<(), AdapterError> {
        self.call_on(element, FOCUS_FN, vec![json!({ "value": clear })])
            .await?;
        self.send("Input.insertText", json!({ "text": text })).await?;
        self.call_on(
            element,
            "function() { this.dispatchEvent(new Event('change', { bubbles: true })); }",
            vec![],
        )
        .await?;
        Ok(())
    }

    async fn press_key(
        &self,
        element: Option<&ElementHandle>,
        key: &str,
    ) -> Result<(), AdapterError> {
        if let Some(element) = element {
            self.call_on(element, FOCUS_FN, vec![json!({ "value": false })])
                .await?;
        }
        let (key, code, vk, text) = key_definition(key);
        let mut down = json!({
            "type": "keyDown",
            "key": key,
            "code": code,
            "windowsVirtualKeyCode": vk,
        });
        if let Some(text) = text {
            down["text"] = json!(text);
        }
        self.send("Input.dispatchKeyEvent", down).await?;
        self.send(
            "Input.dispatchKeyEvent",
            json!({
                "type": "keyUp",
                "key": key,
                "code": code,
                "windowsVirtualKeyCode": vk,
            }),
        )
        .await?;
        Ok(())
    }

    async fn select_option(
        &self,
        element: &ElementHandle,
        option: &str,
    ) -> Result<(), AdapterError> {
        let outcome = self
            .call_on(element, SELECT_FN, vec![json!({ "value": option })])
            .await?;
        match outcome.get("status").and_then(Value::as_str) {
            Some("selected") => Ok(()),
            _ => Err(AdapterError::new(AdapterErrorKind::TargetNotFound)
                .with_hint(format!("option '{option}' not found in {}", element.description))),
        }
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<(), AdapterError> {
        self.call_on(
            element,
            "function() { this.scrollIntoView({ block: 'center', inline: 'center' }); }",
            vec![],
        )
        .await?;
        Ok(())
    }

    async fn scroll_to(&self, x: f64, y: f64) -> Result<(), AdapterError> {
        self.call_in_scope(
            "function(x, y) { (this.defaultView || window).scrollTo(x, y); }",
            vec![json!(x), json!(y)],
            true,
        )
        .await?;
        Ok(())
    }

    async fn hover(&self, element: &ElementHandle) -> Result<(), AdapterError> {
        let point = self.center_of(element).await?;
        self.mouse("mouseMoved", &point, "none", 0).await
    }

    async fn drag_and_drop(
        &self,
        source: &ElementHandle,
        destination: &ElementHandle,
    ) -> Result<(), AdapterError> {
        let synthesized = self
            .call_on(
                source,
                HTML5_DRAG_FN,
                vec![json!({ "objectId": destination.object_id })],
            )
            .await?;
        if synthesized.as_bool() == Some(true) {
            return Ok(());
        }

        let from = self.center_of(source).await?;
        let to = self.center_of(destination).await?;
        let midway = Point {
            x: (from.x + to.x) / 2.0,
            y: (from.y + to.y) / 2.0,
        };
        self.mouse("mouseMoved", &from, "none", 0).await?;
        self.mouse("mousePressed", &from, "left", 1).await?;
        self.mouse("mouseMoved", &midway, "left", 0).await?;
        self.mouse("mouseMoved", &to, "left", 0).await?;
        self.mouse("mouseReleased", &to, "left", 1).await
    }

    async fn navigate(&self, url: &str) -> Result<(), AdapterError> {
        let response = self.send("Page.navigate", json!({ "url": url })).await?;
        if let Some(error) = response
            .get("errorText")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
        {
            return Err(AdapterError::new(AdapterErrorKind::Navigation)
                .with_hint(format!("{url}: {error}")));
        }
        *self.scope.write() = None;
        self.wait_for_load().await
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, AdapterError> {
        self.evaluate_top(expression).await
    }

    async fn page_markup(&self) -> Result<String, AdapterError> {
        let value = self
            .evaluate_top("document.documentElement ? document.documentElement.outerHTML : ''")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn current_url(&self) -> Result<String, AdapterError> {
        let value = self.evaluate_top("location.href").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn title(&self) -> Result<String, AdapterError> {
        let value = self.evaluate_top("document.title").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, AdapterError> {
        let response = self
            .send("Page.captureScreenshot", json!({ "format": "png" }))
            .await?;
        let data = response
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal).with_hint("missing screenshot data")
            })?;
        STANDARD.decode(data).map_err(|err| {
            AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string())
        })
    }

    async fn switch_to_frame(&self, frame: Option<&ElementHandle>) -> Result<(), AdapterError> {
        let Some(frame) = frame else {
            *self.scope.write() = None;
            return Ok(());
        };
        let response = self
            .send(
                "Runtime.callFunctionOn",
                json!({
                    "objectId": frame.object_id,
                    "functionDeclaration": "function() { return this.contentDocument; }",
                    "returnByValue": false,
                }),
            )
            .await?;
        let remote = Self::remote_result("frame document", response)?;
        let document = handle_from_remote(&remote).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::TargetNotFound).with_hint(format!(
                "frame {} has no accessible document",
                frame.description
            ))
        })?;
        *self.scope.write() = Some(document.object_id);
        Ok(())
    }

    async fn switch_to_window(&self, window: &str) -> Result<(), AdapterError> {
        let targets = self.page_targets().await?;
        let chosen = window
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|index| targets.get(index))
            .or_else(|| targets.iter().find(|t| t.title.contains(window)))
            .or_else(|| targets.iter().find(|t| t.url.contains(window)))
            .cloned()
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::TargetNotFound)
                    .with_hint(format!("no window matches '{window}'"))
            })?;

        self.known_windows.write().insert(chosen.target_id.clone());
        let already_attached = self.window_id.read().as_deref() == Some(chosen.target_id.as_str());
        if !already_attached {
            self.attach_target(&chosen.target_id).await?;
        }
        self.transport
            .send_command(
                "Target.activateTarget",
                json!({ "targetId": chosen.target_id }),
            )
            .await?;
        Ok(())
    }

    async fn close_window(&self, id: &str) -> Result<(), AdapterError> {
        self.transport
            .send_command("Target.closeTarget", json!({ "targetId": id }))
            .await?;
        self.known_windows.write().remove(id);
        Ok(())
    }

    async fn new_windows(&self) -> Result<Vec<WindowInfo>, AdapterError> {
        let attached = self.window_id.read().is_some();
        if !attached {
            return Ok(Vec::new());
        }
        let targets = self.page_targets().await?;
        let known = self.known_windows.read();
        Ok(targets
            .into_iter()
            .filter(|target| !known.contains(&target.target_id))
            .map(|target| WindowInfo {
                id: target.target_id,
                title: target.title,
                url: target.url,
            })
            .collect())
    }

    async fn acknowledge_window(&self, id: &str) -> Result<(), AdapterError> {
        self.known_windows.write().insert(id.to_string());
        Ok(())
    }

    async fn open_dialog(&self) -> Result<Option<DialogInfo>, AdapterError> {
        Ok(self.dialog.lock().clone())
    }

    async fn handle_dialog(
        &self,
        accept: bool,
        prompt_text: Option<&str>,
    ) -> Result<(), AdapterError> {
        let mut params = json!({ "accept": accept });
        if let Some(text) = prompt_text {
            params["promptText"] = json!(text);
        }
        self.send("Page.handleJavaScriptDialog", params).await?;
        *self.dialog.lock() = None;
        Ok(())
    }

    async fn detect_modal(&self) -> Result<Option<String>, AdapterError> {
        match self.evaluate_top(MODAL_PROBE).await {
            Ok(Value::String(description)) => Ok(Some(description)),
            Ok(_) => Ok(None),
            Err(err) if err.kind == AdapterErrorKind::Script => {
                warn!(target: "cdp-transport", %err, "modal probe failed");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn console_transcript(&self) -> Result<Vec<String>, AdapterError> {
        Ok(self.console.lock().iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_definitions_cover_named_and_printable_keys() {
        assert_eq!(key_definition("Enter").2, 13);
        assert_eq!(key_definition("a").1, "KeyA");
        assert_eq!(key_definition("7").1, "Digit7");
        assert_eq!(key_definition("F5").2, 0);
    }

    #[test]
    fn null_remote_objects_are_not_handles() {
        assert!(handle_from_remote(&json!({"type": "object", "subtype": "null", "value": null})).is_none());
        let handle = handle_from_remote(&json!({
            "type": "object",
            "subtype": "node",
            "objectId": "{\"injectedScriptId\":1,\"id\":4}",
            "description": "button#submit"
        }))
        .unwrap();
        assert_eq!(handle.description, "button#submit");
    }

    #[test]
    fn console_events_are_transcribed() {
        let dialog = Mutex::new(None);
        let console = Mutex::new(VecDeque::new());
        observe_event(
            &TransportEvent {
                method: "Runtime.consoleAPICalled".into(),
                params: json!({"type": "error", "args": [{"type": "string", "value": "boom"}, {"type": "number", "value": 3}]}),
                session_id: None,
            },
            &dialog,
            &console,
        );
        observe_event(
            &TransportEvent {
                method: "Page.javascriptDialogOpening".into(),
                params: json!({"type": "confirm", "message": "Leave?"}),
                session_id: None,
            },
            &dialog,
            &console,
        );
        assert_eq!(console.lock().front().unwrap(), "[error] boom 3");
        assert_eq!(dialog.lock().as_ref().unwrap().kind, "confirm");
    }
}
