//! Replay engine: runs recorded steps strictly in order and stops at the
//! first failure.

use crate::errors::FlowError;
use crate::evidence::{EvidenceSink, FsEvidenceSink, NoopEvidenceSink, StepEvidence};
use crate::types::ReplayOptions;
use action_gate::{verify_checkpoint, wait_until, PopupClass, PopupSentinel};
use action_locator::{DefaultElementResolver, ElementResolver, HealingInterceptor, LocatorHealer};
use capture_tap::CaptureSession;
use cdp_adapter::{ClickKind, ElementHandle, PageDriver};
use replay_core_types::{
    AlertAction, ElementDescriptor, ElementTarget, ObjectRepository, PlaybackResult,
    RecordedStep, ScrollTarget, SecretBox, Session, SessionId, StepAction,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-run state carried from one step to the next.
#[derive(Debug, Default)]
struct ReplayState {
    /// Frame path the page is currently scoped to.
    frames: Vec<String>,
    /// Set when the scope came from a frame-switch step. Steps without a
    /// frame path then stay in it; otherwise they run in the top document.
    frame_switched: bool,
}

impl ReplayState {
    fn reset_frames(&mut self) {
        self.frames.clear();
        self.frame_switched = false;
    }
}

pub struct ReplayEngine {
    page: Arc<dyn PageDriver>,
    interceptor: HealingInterceptor,
    probe: DefaultElementResolver,
    sentinel: PopupSentinel,
    repository: Option<Arc<dyn ObjectRepository>>,
    secrets: Option<SecretBox>,
    evidence: Arc<dyn EvidenceSink>,
    capture: Option<Arc<CaptureSession>>,
    options: ReplayOptions,
}

impl ReplayEngine {
    pub fn new(
        page: Arc<dyn PageDriver>,
        healer: Arc<dyn LocatorHealer>,
        options: ReplayOptions,
    ) -> Self {
        let mut interceptor = HealingInterceptor::with_healer(page.clone(), healer);
        interceptor.set_healer_timeout(options.healer_timeout());
        let evidence: Arc<dyn EvidenceSink> = match &options.evidence_dir {
            Some(dir) => Arc::new(FsEvidenceSink::new(dir.clone())),
            None => Arc::new(NoopEvidenceSink),
        };
        Self {
            probe: DefaultElementResolver::new(page.clone()),
            sentinel: PopupSentinel::new(page.clone(), options.popup_policy),
            page,
            interceptor,
            repository: None,
            secrets: None,
            evidence,
            capture: None,
            options,
        }
    }

    pub fn with_repository(mut self, repository: Arc<dyn ObjectRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_secrets(mut self, secrets: SecretBox) -> Self {
        self.secrets = Some(secrets);
        self
    }

    pub fn with_evidence_sink(mut self, sink: Arc<dyn EvidenceSink>) -> Self {
        self.evidence = sink;
        self
    }

    /// Capture session to keep attached across navigations. The caller
    /// starts and stops it.
    pub fn with_capture(mut self, capture: Arc<CaptureSession>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn with_interceptor(mut self, interceptor: HealingInterceptor) -> Self {
        self.interceptor = interceptor;
        self
    }

    pub fn options(&self) -> &ReplayOptions {
        &self.options
    }

    /// Replays every step of `session`. Never returns an error: failures are
    /// folded into the [`PlaybackResult`].
    pub async fn replay(&self, session: &Session) -> PlaybackResult {
        let steps = session.steps();
        let total = steps.len();
        info!(
            target: "action-flow",
            session = %session.session_id,
            total,
            healer = self.interceptor.healer_name(),
            "replay started"
        );

        let mut state = ReplayState::default();
        for (index, step) in steps.iter().enumerate() {
            let kind = step.kind();
            debug!(target: "action-flow", index, %kind, "step started");

            let outcome = match tokio::time::timeout(
                self.options.step_timeout(),
                self.run_step(step, &mut state),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(FlowError::Timeout(format!(
                    "step did not finish within {} ms",
                    self.options.step_timeout_ms
                ))),
            };

            if let Err(err) = outcome {
                let result =
                    PlaybackResult::failed(index, total, err.kind(), format!("{kind}: {err}"));
                let reason = result.failure_reason.clone().unwrap_or_default();
                warn!(target: "action-flow", index, %kind, failure = %reason, "step failed");
                self.capture_evidence(&session.session_id, index, &reason, &err)
                    .await;
                return result;
            }
            debug!(target: "action-flow", index, %kind, "step passed");
        }

        info!(target: "action-flow", session = %session.session_id, total, "replay passed");
        PlaybackResult::passed(total)
    }

    async fn capture_evidence(
        &self,
        session: &SessionId,
        index: usize,
        reason: &str,
        err: &FlowError,
    ) {
        let evidence = if err.is_connection() {
            StepEvidence {
                failure: reason.to_string(),
                ..StepEvidence::default()
            }
        } else {
            let collect = StepEvidence::collect(self.page.as_ref(), reason);
            match tokio::time::timeout(self.options.step_timeout(), collect).await {
                Ok(evidence) => evidence,
                Err(_) => StepEvidence {
                    failure: reason.to_string(),
                    ..StepEvidence::default()
                },
            }
        };
        if let Some(dir) = self.evidence.record(session, index, &evidence).await {
            info!(target: "action-flow", index, dir = %dir.display(), "evidence captured");
        }
    }

    async fn run_step(
        &self,
        step: &RecordedStep,
        state: &mut ReplayState,
    ) -> Result<(), FlowError> {
        if !step.frames.is_empty() {
            if step.frames != state.frames || state.frame_switched {
                self.page.switch_to_frame_path(&step.frames).await?;
                state.frames = step.frames.clone();
                state.frame_switched = false;
            }
        } else if !state.frames.is_empty() && !state.frame_switched {
            self.page.switch_to_frame(None).await?;
            state.reset_frames();
        }

        let expected: &[PopupClass] = match &step.action {
            StepAction::AlertAction { .. } => &[PopupClass::Dialog],
            StepAction::WindowSwitch { .. } => &[PopupClass::Window],
            _ => &[],
        };
        let handled = self.sentinel.sweep(expected).await?;
        for popup in &handled {
            info!(target: "action-flow", %popup, policy = ?self.sentinel.policy(), "popup handled before step");
        }

        match &step.action {
            StepAction::Click { target } => {
                let element = self.resolve(target).await?;
                self.page.click(&element, ClickKind::Single).await?;
            }
            StepAction::DoubleClick { target } => {
                let element = self.resolve(target).await?;
                self.page.click(&element, ClickKind::Double).await?;
            }
            StepAction::ContextMenu { target } => {
                let element = self.resolve(target).await?;
                self.page.click(&element, ClickKind::Context).await?;
            }
            StepAction::TextInput { target, input } => {
                let element = self.resolve(target).await?;
                let value = if input.secret {
                    let secrets = self.secrets.as_ref().ok_or_else(|| {
                        FlowError::Action("step has a secret input but no secret key is configured".into())
                    })?;
                    secrets.open(&input.value)?
                } else {
                    input.value.clone()
                };
                debug!(
                    target: "action-flow",
                    chars = value.chars().count(),
                    secret = input.secret,
                    "typing"
                );
                self.page.type_text(&element, &value, input.clear).await?;
            }
            StepAction::KeyPress { target, key } => {
                let element = match target {
                    Some(target) => Some(self.resolve(target).await?),
                    None => None,
                };
                self.page.press_key(element.as_ref(), key).await?;
            }
            StepAction::Select { target, option } => {
                let element = self.resolve(target).await?;
                self.page.select_option(&element, option).await?;
            }
            StepAction::Scroll { to } => match to {
                ScrollTarget::Element(target) => {
                    let element = self.resolve(target).await?;
                    self.page.scroll_into_view(&element).await?;
                }
                ScrollTarget::Offset { x, y } => self.page.scroll_to(*x, *y).await?,
            },
            StepAction::Navigate { url } => {
                self.page.navigate(url).await.map_err(|err| {
                    if err.is_connection() {
                        FlowError::from(err)
                    } else {
                        FlowError::Navigation(format!("navigation to {url} failed: {err}"))
                    }
                })?;
                state.reset_frames();
                self.reattach_capture().await;
            }
            StepAction::AlertAction {
                action,
                prompt_text,
            } => {
                let page = self.page.clone();
                wait_until(
                    "a dialog to open",
                    move || {
                        let page = page.clone();
                        async move { matches!(page.open_dialog().await, Ok(Some(_))) }
                    },
                    self.options.dialog_wait(),
                    self.options.wait_poll(),
                )
                .await
                .map_err(|err| FlowError::Popup(format!("no dialog to {action:?}: {err}")))?;
                self.page
                    .handle_dialog(*action == AlertAction::Accept, prompt_text.as_deref())
                    .await?;
            }
            StepAction::WindowSwitch { window } => {
                self.page.switch_to_window(window).await?;
                state.reset_frames();
                self.reattach_capture().await;
            }
            StepAction::FrameSwitch { target } => match target {
                None => {
                    self.page.switch_to_frame(None).await?;
                    state.reset_frames();
                }
                Some(target) => {
                    let frame = self.resolve(target).await?;
                    self.page.switch_to_frame(Some(&frame)).await?;
                    state.frames.push(frame.description.clone());
                    state.frame_switched = true;
                }
            },
            StepAction::Hover { target } => {
                let element = self.resolve(target).await?;
                self.page.hover(&element).await?;
            }
            StepAction::DragDrop {
                source,
                destination,
            } => {
                let from = self.resolve(source).await?;
                let to = self.resolve(destination).await?;
                self.page.drag_and_drop(&from, &to).await?;
            }
            StepAction::Wait {
                duration_ms,
                target,
            } => match target {
                None => {
                    tokio::time::sleep(Duration::from_millis(duration_ms.unwrap_or(0))).await;
                }
                Some(target) => {
                    let limit = duration_ms
                        .map(Duration::from_millis)
                        .unwrap_or_else(|| self.options.step_timeout());
                    self.wait_for_element(target, limit).await?;
                }
            },
            StepAction::Checkpoint { checkpoint } => {
                let element = match checkpoint.check.element() {
                    Some(target) => Some(self.resolve(target).await?),
                    None => None,
                };
                verify_checkpoint(self.page.as_ref(), element.as_ref(), checkpoint).await?;
            }
        }
        Ok(())
    }

    /// Navigation wipes the page context, shim included.
    async fn reattach_capture(&self) {
        if let Some(capture) = &self.capture {
            if let Err(err) = capture.reattach().await {
                warn!(target: "action-flow", error = %err, "capture shim not re-injected");
            }
        }
    }

    fn descriptor_for(&self, target: &ElementTarget) -> Result<ElementDescriptor, FlowError> {
        match target {
            ElementTarget::Element(descriptor) => Ok(descriptor.clone()),
            ElementTarget::Object(name) => self
                .repository
                .as_ref()
                .and_then(|repository| repository.lookup(name))
                .ok_or_else(|| {
                    FlowError::ElementNotFound(format!(
                        "object '{name}' is not in the object repository"
                    ))
                }),
        }
    }

    async fn resolve(&self, target: &ElementTarget) -> Result<ElementHandle, FlowError> {
        let descriptor = self.descriptor_for(target)?;
        let resolution = self.interceptor.find_element(&descriptor).await?;
        if resolution.was_healed() {
            info!(
                target: "action-flow",
                element = %target,
                strategy = resolution.strategy.name(),
                locator = %resolution.locator,
                "element located after healing"
            );
        }
        Ok(resolution.handle)
    }

    /// Polls the recorded locators until the element shows up visible, then
    /// gives healing a single chance if it never did.
    async fn wait_for_element(
        &self,
        target: &ElementTarget,
        limit: Duration,
    ) -> Result<(), FlowError> {
        let descriptor = self.descriptor_for(target)?;
        let wanted = &descriptor;
        let probe = &self.probe;
        let page = &self.page;
        let appeared = wait_until(
            "element to appear",
            move || async move {
                match probe.resolve(wanted).await {
                    Ok(found) => page.is_visible(&found.handle).await.unwrap_or(false),
                    Err(_) => false,
                }
            },
            limit,
            self.options.wait_poll(),
        )
        .await;
        if appeared.is_ok() {
            return Ok(());
        }
        debug!(target: "action-flow", element = %target, "wait expired; trying healing");
        let resolution = self.interceptor.find_element(&descriptor).await?;
        if self.page.is_visible(&resolution.handle).await? {
            Ok(())
        } else {
            Err(FlowError::Timeout(format!(
                "{target} was found but stayed hidden for {} ms",
                limit.as_millis()
            )))
        }
    }
}
