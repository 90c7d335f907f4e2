//! Popup sentinel run before every replayed step.

use crate::errors::GateError;
use cdp_adapter::{DialogInfo, PageDriver, WindowInfo};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// What to do with a popup the recording did not expect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PopupPolicy {
    /// Accept dialogs, keep new windows open, leave modals alone.
    #[default]
    Accept,
    /// Dismiss dialogs, close new windows, send Escape to modals.
    Dismiss,
    /// Leave everything as found.
    Ignore,
    /// Fail the step.
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PopupClass {
    Dialog,
    Window,
    Modal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Popup {
    Dialog(DialogInfo),
    Window(WindowInfo),
    Modal(String),
}

impl Popup {
    pub fn class(&self) -> PopupClass {
        match self {
            Popup::Dialog(_) => PopupClass::Dialog,
            Popup::Window(_) => PopupClass::Window,
            Popup::Modal(_) => PopupClass::Modal,
        }
    }
}

impl fmt::Display for Popup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Popup::Dialog(dialog) => write!(f, "{} dialog '{}'", dialog.kind, dialog.message),
            Popup::Window(window) => write!(f, "new window '{}' ({})", window.title, window.url),
            Popup::Modal(description) => write!(f, "modal overlay {description}"),
        }
    }
}

pub struct PopupSentinel {
    page: Arc<dyn PageDriver>,
    policy: PopupPolicy,
}

impl PopupSentinel {
    pub fn new(page: Arc<dyn PageDriver>, policy: PopupPolicy) -> Self {
        Self { page, policy }
    }

    pub fn policy(&self) -> PopupPolicy {
        self.policy
    }

    /// Popups currently present, without touching them.
    pub async fn detect(&self) -> Result<Vec<Popup>, GateError> {
        let mut found = Vec::new();
        if let Some(dialog) = self.page.open_dialog().await? {
            found.push(Popup::Dialog(dialog));
        }
        for window in self.page.new_windows().await? {
            found.push(Popup::Window(window));
        }
        if let Some(modal) = self.page.detect_modal().await? {
            found.push(Popup::Modal(modal));
        }
        Ok(found)
    }

    /// Applies the policy to every present popup whose class is not in
    /// `expected`, returning the ones acted upon.
    ///
    /// Steps that deal with a popup themselves (an alert action, a window
    /// switch) pass its class in `expected` so the sentinel leaves it.
    pub async fn sweep(&self, expected: &[PopupClass]) -> Result<Vec<Popup>, GateError> {
        let mut handled = Vec::new();
        for popup in self.detect().await? {
            if expected.contains(&popup.class()) {
                continue;
            }
            self.apply(&popup).await?;
            handled.push(popup);
        }
        Ok(handled)
    }

    async fn apply(&self, popup: &Popup) -> Result<(), GateError> {
        match (self.policy, popup) {
            (PopupPolicy::Fail, _) => {
                warn!(target: "action-gate", %popup, "popup present and policy is fail");
                return Err(GateError::PopupBlocked(popup.to_string()));
            }
            (PopupPolicy::Ignore, _) => {
                info!(target: "action-gate", %popup, "ignoring popup");
            }
            (policy, Popup::Dialog(_)) => {
                let accept = policy == PopupPolicy::Accept;
                self.page.handle_dialog(accept, None).await?;
                info!(target: "action-gate", %popup, accept, "handled dialog");
            }
            (PopupPolicy::Accept, Popup::Window(window)) => {
                self.page.acknowledge_window(&window.id).await?;
                info!(target: "action-gate", %popup, "keeping new window");
            }
            (_, Popup::Window(window)) => {
                self.page.close_window(&window.id).await?;
                info!(target: "action-gate", %popup, "closed new window");
            }
            (PopupPolicy::Accept, Popup::Modal(_)) => {
                info!(target: "action-gate", %popup, "leaving modal in place");
            }
            (_, Popup::Modal(_)) => {
                self.page.press_key(None, "Escape").await?;
                if self.page.detect_modal().await?.is_some() {
                    warn!(target: "action-gate", %popup, "modal still present after Escape");
                } else {
                    info!(target: "action-gate", %popup, "dismissed modal");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::MemoryPage;

    fn alert() -> DialogInfo {
        DialogInfo {
            kind: "alert".into(),
            message: "Session expires soon".into(),
            default_prompt: None,
        }
    }

    fn promo_window() -> WindowInfo {
        WindowInfo {
            id: "W2".into(),
            title: "Promo".into(),
            url: "https://ads.test/".into(),
        }
    }

    #[tokio::test]
    async fn quiet_page_has_nothing_to_handle() {
        let page = Arc::new(MemoryPage::new("https://app.test", "App"));
        let sentinel = PopupSentinel::new(page.clone(), PopupPolicy::Fail);
        assert!(sentinel.sweep(&[]).await.unwrap().is_empty());
        assert!(page.actions().is_empty());
    }

    #[tokio::test]
    async fn accept_policy_accepts_dialog_and_keeps_window() {
        let page = Arc::new(MemoryPage::new("https://app.test", "App"));
        page.open_dialog_now(alert());
        page.open_window_now(promo_window());
        let sentinel = PopupSentinel::new(page.clone(), PopupPolicy::Accept);

        let handled = sentinel.sweep(&[]).await.unwrap();
        assert_eq!(handled.len(), 2);
        assert_eq!(page.actions(), vec!["dialog accept".to_string()]);
        assert!(page.new_windows().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dismiss_policy_closes_window_and_escapes_modal() {
        let page = Arc::new(MemoryPage::new("https://app.test", "App"));
        page.open_window_now(promo_window());
        page.show_modal(Some("div.cookie-banner".into()));
        let sentinel = PopupSentinel::new(page.clone(), PopupPolicy::Dismiss);

        sentinel.sweep(&[]).await.unwrap();
        let actions = page.actions();
        assert!(actions.contains(&"close-window W2".to_string()));
        assert!(actions.iter().any(|a| a.starts_with("key Escape")));
    }

    #[tokio::test]
    async fn fail_policy_reports_popup() {
        let page = Arc::new(MemoryPage::new("https://app.test", "App"));
        page.open_dialog_now(alert());
        let sentinel = PopupSentinel::new(page, PopupPolicy::Fail);
        let err = sentinel.sweep(&[]).await.unwrap_err();
        assert!(err.to_string().contains("Session expires soon"));
    }

    #[tokio::test]
    async fn expected_popups_are_left_for_the_step() {
        let page = Arc::new(MemoryPage::new("https://app.test", "App"));
        page.open_dialog_now(alert());
        let sentinel = PopupSentinel::new(page.clone(), PopupPolicy::Fail);
        assert!(sentinel.sweep(&[PopupClass::Dialog]).await.unwrap().is_empty());
        assert!(page.open_dialog().await.unwrap().is_some());
    }
}
