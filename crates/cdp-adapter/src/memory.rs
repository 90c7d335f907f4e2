//! In-memory [`PageDriver`] for dry runs and tests.
//!
//! Elements are flat records matched on their recorded locator values. XPath
//! lookups also understand the `//tag[contains(normalize-space(.), '...')]`
//! text form.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{AdapterError, AdapterErrorKind};
use crate::page::{ClickKind, DialogInfo, ElementHandle, FindBy, PageDriver, WindowInfo};

#[derive(Clone, Debug, Default)]
pub struct MemoryElement {
    pub id: Option<String>,
    pub name: Option<String>,
    pub css: Option<String>,
    pub xpath: Option<String>,
    pub tag: String,
    pub text: String,
    pub value: String,
    pub attributes: BTreeMap<String, String>,
    pub hidden: bool,
    /// Frame selectors from the top document down to the element's document.
    pub frame_path: Vec<String>,
    pub options: Vec<String>,
}

impl MemoryElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn css(mut self, css: impl Into<String>) -> Self {
        self.css = Some(css.into());
        self
    }

    pub fn xpath(mut self, xpath: impl Into<String>) -> Self {
        self.xpath = Some(xpath.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn in_frames(mut self, path: &[&str]) -> Self {
        self.frame_path = path.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|s| s.to_string()).collect();
        self
    }

    fn label(&self) -> String {
        let mut label = self.tag.clone();
        if let Some(id) = &self.id {
            label.push('#');
            label.push_str(id);
        } else if let Some(css) = &self.css {
            label = css.clone();
        }
        label
    }

    fn matches(&self, by: &FindBy) -> bool {
        match by {
            FindBy::Id(value) => self.id.as_deref() == Some(value.as_str()),
            FindBy::Name(value) => self.name.as_deref() == Some(value.as_str()),
            FindBy::Css(value) => self.css.as_deref() == Some(value.as_str()),
            FindBy::XPath(value) => {
                if self.xpath.as_deref() == Some(value.as_str()) {
                    return true;
                }
                match parse_text_xpath(value) {
                    Some((tag, fragment)) => {
                        (tag == "*" || tag.eq_ignore_ascii_case(&self.tag))
                            && normalize_space(&self.text).contains(&fragment)
                    }
                    None => false,
                }
            }
        }
    }
}

/// Side effect applied when an element is clicked.
#[derive(Clone, Debug)]
pub enum ClickEffect {
    SetTitle(String),
    SetUrl(String),
    OpenDialog(DialogInfo),
    OpenWindow(WindowInfo),
    ShowModal(String),
    SetText { element: String, text: String },
    Console(String),
}

#[derive(Default)]
struct MemoryState {
    elements: Vec<MemoryElement>,
    frame: Vec<String>,
    url: String,
    title: String,
    titles: HashMap<String, String>,
    markup: Option<String>,
    dialog: Option<DialogInfo>,
    windows: Vec<WindowInfo>,
    acknowledged: HashSet<String>,
    modal: Option<String>,
    console: Vec<String>,
    effects: HashMap<String, Vec<ClickEffect>>,
    failing: HashSet<String>,
    actions: Vec<String>,
    lookups: Vec<FindBy>,
}

#[derive(Default)]
pub struct MemoryPage {
    state: Mutex<MemoryState>,
}

impl MemoryPage {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        let page = Self::default();
        {
            let mut state = page.state.lock();
            state.url = url.into();
            state.title = title.into();
        }
        page
    }

    pub fn with_element(self, element: MemoryElement) -> Self {
        self.add_element(element);
        self
    }

    pub fn add_element(&self, element: MemoryElement) {
        self.state.lock().elements.push(element);
    }

    /// Removes every element whose id, css or xpath equals `key`.
    pub fn remove_element(&self, key: &str) {
        self.state.lock().elements.retain(|el| !element_has_key(el, key));
    }

    pub fn set_markup(&self, markup: impl Into<String>) {
        self.state.lock().markup = Some(markup.into());
    }

    pub fn set_title_for(&self, url: impl Into<String>, title: impl Into<String>) {
        self.state.lock().titles.insert(url.into(), title.into());
    }

    pub fn open_dialog_now(&self, dialog: DialogInfo) {
        self.state.lock().dialog = Some(dialog);
    }

    pub fn open_window_now(&self, window: WindowInfo) {
        self.state.lock().windows.push(window);
    }

    pub fn show_modal(&self, description: Option<String>) {
        self.state.lock().modal = description;
    }

    pub fn log_console(&self, line: impl Into<String>) {
        self.state.lock().console.push(line.into());
    }

    /// Registers effects for clicks on the element whose id, css or xpath equals `key`.
    pub fn on_click(&self, key: impl Into<String>, effect: ClickEffect) {
        self.state
            .lock()
            .effects
            .entry(key.into())
            .or_default()
            .push(effect);
    }

    /// Makes the named action (`click`, `type`, `navigate`, ...) fail.
    pub fn fail_action(&self, action: impl Into<String>) {
        self.state.lock().failing.insert(action.into());
    }

    pub fn actions(&self) -> Vec<String> {
        self.state.lock().actions.clone()
    }

    pub fn lookups(&self) -> Vec<FindBy> {
        self.state.lock().lookups.clone()
    }

    pub fn current_frame(&self) -> Vec<String> {
        self.state.lock().frame.clone()
    }

    pub fn value_of(&self, key: &str) -> Option<String> {
        self.state
            .lock()
            .elements
            .iter()
            .find(|el| element_has_key(el, key))
            .map(|el| el.value.clone())
    }

    fn element(&self, handle: &ElementHandle) -> Result<MemoryElement, AdapterError> {
        let index = parse_handle(handle)?;
        self.state
            .lock()
            .elements
            .get(index)
            .cloned()
            .ok_or_else(|| stale(handle))
    }

    fn act(&self, action: &str, detail: String) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        if state.failing.contains(action) {
            return Err(AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("{action} failed on {detail}")));
        }
        state.actions.push(format!("{action} {detail}"));
        Ok(())
    }
}

fn element_has_key(element: &MemoryElement, key: &str) -> bool {
    element.id.as_deref() == Some(key)
        || element.css.as_deref() == Some(key)
        || element.xpath.as_deref() == Some(key)
}

fn parse_handle(handle: &ElementHandle) -> Result<usize, AdapterError> {
    handle
        .object_id
        .strip_prefix("memory-")
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| stale(handle))
}

fn stale(handle: &ElementHandle) -> AdapterError {
    AdapterError::command(
        "Runtime.callFunctionOn",
        -32000,
        &format!("Could not find object with given id {}", handle.object_id),
    )
}

fn normalize_space(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parses `//tag[contains(normalize-space(.), 'text')]`.
fn parse_text_xpath(xpath: &str) -> Option<(String, String)> {
    let rest = xpath.strip_prefix("//")?;
    let (tag, rest) = rest.split_once('[')?;
    let rest = rest.strip_prefix("contains(normalize-space(.), ")?;
    let literal = rest.strip_suffix(")]")?;
    let quote = literal.chars().next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }
    let inner = literal.strip_prefix(quote)?.strip_suffix(quote)?;
    Some((tag.to_string(), inner.to_string()))
}

#[async_trait]
impl PageDriver for MemoryPage {
    async fn find(&self, by: &FindBy) -> Result<Option<ElementHandle>, AdapterError> {
        let mut state = self.state.lock();
        state.lookups.push(by.clone());
        let frame = state.frame.clone();
        Ok(state
            .elements
            .iter()
            .enumerate()
            .find(|(_, el)| el.frame_path == frame && el.matches(by))
            .map(|(index, el)| ElementHandle {
                object_id: format!("memory-{index}"),
                description: el.label(),
            }))
    }

    async fn element_text(&self, element: &ElementHandle) -> Result<String, AdapterError> {
        Ok(normalize_space(&self.element(element)?.text))
    }

    async fn element_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, AdapterError> {
        Ok(self.element(element)?.attributes.get(name).cloned())
    }

    async fn element_value(&self, element: &ElementHandle) -> Result<String, AdapterError> {
        Ok(self.element(element)?.value)
    }

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool, AdapterError> {
        Ok(!self.element(element)?.hidden)
    }

    async fn click(&self, element: &ElementHandle, kind: ClickKind) -> Result<(), AdapterError> {
        let target = self.element(element)?;
        let action = match kind {
            ClickKind::Single => "click",
            ClickKind::Double => "double-click",
            ClickKind::Context => "context-click",
        };
        self.act(action, target.label())?;

        let mut state = self.state.lock();
        let mut effects = Vec::new();
        for key in [&target.id, &target.css, &target.xpath].into_iter().flatten() {
            if let Some(found) = state.effects.get(key) {
                effects.extend(found.iter().cloned());
            }
        }
        for effect in effects {
            match effect {
                ClickEffect::SetTitle(title) => state.title = title,
                ClickEffect::SetUrl(url) => state.url = url,
                ClickEffect::OpenDialog(dialog) => state.dialog = Some(dialog),
                ClickEffect::OpenWindow(window) => state.windows.push(window),
                ClickEffect::ShowModal(modal) => state.modal = Some(modal),
                ClickEffect::Console(line) => state.console.push(line),
                ClickEffect::SetText { element, text } => {
                    for el in state.elements.iter_mut() {
                        if element_has_key(el, &element) {
                            el.text = text.clone();
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn type_text(
        &self,
        element: &ElementHandle,
        text: &str,
        clear: bool,
    ) -> Result<(), AdapterError> {
        let index = parse_handle(element)?;
        let label = self.element(element)?.label();
        self.act("type", format!("{label} <{} chars>", text.chars().count()))?;
        let mut state = self.state.lock();
        let target = state.elements.get_mut(index).ok_or_else(|| stale(element))?;
        if clear {
            target.value.clear();
        }
        target.value.push_str(text);
        Ok(())
    }

    async fn press_key(
        &self,
        element: Option<&ElementHandle>,
        key: &str,
    ) -> Result<(), AdapterError> {
        let label = match element {
            Some(handle) => self.element(handle)?.label(),
            None => "page".to_string(),
        };
        self.act("key", format!("{key} on {label}"))
    }

    async fn select_option(
        &self,
        element: &ElementHandle,
        option: &str,
    ) -> Result<(), AdapterError> {
        let index = parse_handle(element)?;
        let target = self.element(element)?;
        if !target.options.iter().any(|o| o == option) {
            return Err(AdapterError::new(AdapterErrorKind::TargetNotFound)
                .with_hint(format!("option '{option}' not found in {}", target.label())));
        }
        self.act("select", format!("{option} in {}", target.label()))?;
        if let Some(el) = self.state.lock().elements.get_mut(index) {
            el.value = option.to_string();
        }
        Ok(())
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<(), AdapterError> {
        let label = self.element(element)?.label();
        self.act("scroll", label)
    }

    async fn scroll_to(&self, x: f64, y: f64) -> Result<(), AdapterError> {
        self.act("scroll", format!("{x},{y}"))
    }

    async fn hover(&self, element: &ElementHandle) -> Result<(), AdapterError> {
        let label = self.element(element)?.label();
        self.act("hover", label)
    }

    async fn drag_and_drop(
        &self,
        source: &ElementHandle,
        destination: &ElementHandle,
    ) -> Result<(), AdapterError> {
        let from = self.element(source)?.label();
        let to = self.element(destination)?.label();
        self.act("drag", format!("{from} -> {to}"))
    }

    async fn navigate(&self, url: &str) -> Result<(), AdapterError> {
        self.act("navigate", url.to_string()).map_err(|err| {
            AdapterError::new(AdapterErrorKind::Navigation).with_hint(err.hint.unwrap_or_default())
        })?;
        let mut state = self.state.lock();
        state.url = url.to_string();
        state.frame.clear();
        if let Some(title) = state.titles.get(url).cloned() {
            state.title = title;
        }
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, AdapterError> {
        self.act("evaluate", expression.chars().take(40).collect())?;
        Ok(Value::Null)
    }

    async fn page_markup(&self) -> Result<String, AdapterError> {
        let state = self.state.lock();
        if let Some(markup) = &state.markup {
            return Ok(markup.clone());
        }
        let body: Vec<String> = state
            .elements
            .iter()
            .map(|el| {
                let mut open = format!("<{}", el.tag);
                if let Some(id) = &el.id {
                    open.push_str(&format!(" id=\"{id}\""));
                }
                if let Some(name) = &el.name {
                    open.push_str(&format!(" name=\"{name}\""));
                }
                for (key, value) in &el.attributes {
                    open.push_str(&format!(" {key}=\"{value}\""));
                }
                format!("{open}>{}</{}>", el.text, el.tag)
            })
            .collect();
        Ok(format!(
            "<html><head><title>{}</title></head><body>{}</body></html>",
            state.title,
            body.join("")
        ))
    }

    async fn current_url(&self) -> Result<String, AdapterError> {
        Ok(self.state.lock().url.clone())
    }

    async fn title(&self) -> Result<String, AdapterError> {
        Ok(self.state.lock().title.clone())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, AdapterError> {
        if self.state.lock().failing.contains("screenshot") {
            return Err(AdapterError::new(AdapterErrorKind::Internal).with_hint("screenshot failed"));
        }
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    async fn switch_to_frame(&self, frame: Option<&ElementHandle>) -> Result<(), AdapterError> {
        match frame {
            None => {
                self.state.lock().frame.clear();
                Ok(())
            }
            Some(handle) => {
                let element = self.element(handle)?;
                let selector = element
                    .css
                    .clone()
                    .or_else(|| element.id.as_ref().map(|id| format!("#{id}")))
                    .ok_or_else(|| {
                        AdapterError::new(AdapterErrorKind::TargetNotFound)
                            .with_hint("frame element has no selector")
                    })?;
                self.state.lock().frame.push(selector);
                Ok(())
            }
        }
    }

    async fn switch_to_window(&self, window: &str) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        let chosen = window
            .parse::<usize>()
            .ok()
            .and_then(|index| {
                if index == 0 {
                    None
                } else {
                    state.windows.get(index - 1).cloned()
                }
            })
            .or_else(|| {
                state
                    .windows
                    .iter()
                    .find(|w| w.title.contains(window) || w.url.contains(window))
                    .cloned()
            });
        match chosen {
            Some(found) => {
                state.acknowledged.insert(found.id.clone());
                state.url = found.url.clone();
                state.title = found.title.clone();
                state.frame.clear();
                state.actions.push(format!("window {}", found.id));
                Ok(())
            }
            None if window == "0" => {
                state.actions.push("window main".to_string());
                Ok(())
            }
            None => Err(AdapterError::new(AdapterErrorKind::TargetNotFound)
                .with_hint(format!("no window matches '{window}'"))),
        }
    }

    async fn close_window(&self, id: &str) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        state.windows.retain(|w| w.id != id);
        state.actions.push(format!("close-window {id}"));
        Ok(())
    }

    async fn new_windows(&self) -> Result<Vec<WindowInfo>, AdapterError> {
        let state = self.state.lock();
        Ok(state
            .windows
            .iter()
            .filter(|w| !state.acknowledged.contains(&w.id))
            .cloned()
            .collect())
    }

    async fn acknowledge_window(&self, id: &str) -> Result<(), AdapterError> {
        self.state.lock().acknowledged.insert(id.to_string());
        Ok(())
    }

    async fn open_dialog(&self) -> Result<Option<DialogInfo>, AdapterError> {
        Ok(self.state.lock().dialog.clone())
    }

    async fn handle_dialog(
        &self,
        accept: bool,
        prompt_text: Option<&str>,
    ) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        if state.dialog.take().is_none() {
            return Err(AdapterError::command(
                "Page.handleJavaScriptDialog",
                -32602,
                "No dialog is showing",
            ));
        }
        let verb = if accept { "accept" } else { "dismiss" };
        let suffix = prompt_text.map(|t| format!(" with '{t}'")).unwrap_or_default();
        state.actions.push(format!("dialog {verb}{suffix}"));
        Ok(())
    }

    async fn detect_modal(&self) -> Result<Option<String>, AdapterError> {
        Ok(self.state.lock().modal.clone())
    }

    async fn console_transcript(&self) -> Result<Vec<String>, AdapterError> {
        Ok(self.state.lock().console.clone())
    }
}
