//! Recorded steps.
//!
//! A step is the common envelope (timestamp, page, frame path) plus a
//! [`StepAction`] keyed by step type. Each action variant only carries the
//! fields meaningful to it, so a navigate step has no target and a click step
//! always has one.

use crate::descriptor::ElementDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a step finds its element: recorded inline, or by shared object name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementTarget {
    Element(ElementDescriptor),
    Object(String),
}

impl ElementTarget {
    pub fn inline(descriptor: ElementDescriptor) -> Self {
        Self::Element(descriptor)
    }

    pub fn object(name: impl Into<String>) -> Self {
        Self::Object(name.into())
    }
}

impl fmt::Display for ElementTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementTarget::Element(descriptor) => write!(f, "{descriptor}"),
            ElementTarget::Object(name) => write!(f, "object '{name}'"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextInput {
    pub value: String,
    /// Value is a sealed secret (see [`crate::SecretBox`]).
    #[serde(default)]
    pub secret: bool,
    /// Clear the field before typing.
    #[serde(default = "default_true")]
    pub clear: bool,
}

impl TextInput {
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            secret: false,
            clear: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScrollTarget {
    Element(ElementTarget),
    Offset { x: f64, y: f64 },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertAction {
    Accept,
    Dismiss,
}

/// How a checkpoint compares actual against expected.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMode {
    #[default]
    Equals,
    Contains,
    StartsWith,
    Regex,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMode::Equals => "equals",
            MatchMode::Contains => "contains",
            MatchMode::StartsWith => "starts-with",
            MatchMode::Regex => "regex",
        }
    }
}

/// What a checkpoint reads from the live page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CheckpointTarget {
    Text { target: ElementTarget },
    Value { target: ElementTarget },
    Attribute { target: ElementTarget, name: String },
    Visible { target: ElementTarget },
    Url,
    Title,
}

impl CheckpointTarget {
    pub fn element(&self) -> Option<&ElementTarget> {
        match self {
            CheckpointTarget::Text { target }
            | CheckpointTarget::Value { target }
            | CheckpointTarget::Attribute { target, .. }
            | CheckpointTarget::Visible { target } => Some(target),
            CheckpointTarget::Url | CheckpointTarget::Title => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointSpec {
    pub check: CheckpointTarget,
    pub expected: String,
    #[serde(default)]
    pub mode: MatchMode,
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
}

fn default_true() -> bool {
    true
}

/// Step payload keyed by step type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum StepAction {
    Click {
        target: ElementTarget,
    },
    DoubleClick {
        target: ElementTarget,
    },
    ContextMenu {
        target: ElementTarget,
    },
    TextInput {
        target: ElementTarget,
        input: TextInput,
    },
    KeyPress {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<ElementTarget>,
        key: String,
    },
    Select {
        target: ElementTarget,
        option: String,
    },
    Scroll {
        to: ScrollTarget,
    },
    Navigate {
        url: String,
    },
    AlertAction {
        action: AlertAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt_text: Option<String>,
    },
    WindowSwitch {
        /// Window title, URL fragment, or zero-based index.
        window: String,
    },
    FrameSwitch {
        /// `None` returns to the top-level document.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<ElementTarget>,
    },
    Hover {
        target: ElementTarget,
    },
    DragDrop {
        source: ElementTarget,
        destination: ElementTarget,
    },
    Wait {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<ElementTarget>,
    },
    Checkpoint {
        checkpoint: CheckpointSpec,
    },
}

/// Fieldless mirror of [`StepAction`] used for logging and reporting.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum StepKind {
    Click,
    DoubleClick,
    ContextMenu,
    TextInput,
    KeyPress,
    Select,
    Scroll,
    Navigate,
    AlertAction,
    WindowSwitch,
    FrameSwitch,
    Hover,
    DragDrop,
    Wait,
    Checkpoint,
}

impl StepKind {
    pub const ALL: [StepKind; 15] = [
        StepKind::Click,
        StepKind::DoubleClick,
        StepKind::ContextMenu,
        StepKind::TextInput,
        StepKind::KeyPress,
        StepKind::Select,
        StepKind::Scroll,
        StepKind::Navigate,
        StepKind::AlertAction,
        StepKind::WindowSwitch,
        StepKind::FrameSwitch,
        StepKind::Hover,
        StepKind::DragDrop,
        StepKind::Wait,
        StepKind::Checkpoint,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Click => "click",
            StepKind::DoubleClick => "double-click",
            StepKind::ContextMenu => "context-menu",
            StepKind::TextInput => "text-input",
            StepKind::KeyPress => "key-press",
            StepKind::Select => "select",
            StepKind::Scroll => "scroll",
            StepKind::Navigate => "navigate",
            StepKind::AlertAction => "alert-action",
            StepKind::WindowSwitch => "window-switch",
            StepKind::FrameSwitch => "frame-switch",
            StepKind::Hover => "hover",
            StepKind::DragDrop => "drag-drop",
            StepKind::Wait => "wait",
            StepKind::Checkpoint => "checkpoint",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StepAction {
    pub fn kind(&self) -> StepKind {
        match self {
            StepAction::Click { .. } => StepKind::Click,
            StepAction::DoubleClick { .. } => StepKind::DoubleClick,
            StepAction::ContextMenu { .. } => StepKind::ContextMenu,
            StepAction::TextInput { .. } => StepKind::TextInput,
            StepAction::KeyPress { .. } => StepKind::KeyPress,
            StepAction::Select { .. } => StepKind::Select,
            StepAction::Scroll { .. } => StepKind::Scroll,
            StepAction::Navigate { .. } => StepKind::Navigate,
            StepAction::AlertAction { .. } => StepKind::AlertAction,
            StepAction::WindowSwitch { .. } => StepKind::WindowSwitch,
            StepAction::FrameSwitch { .. } => StepKind::FrameSwitch,
            StepAction::Hover { .. } => StepKind::Hover,
            StepAction::DragDrop { .. } => StepKind::DragDrop,
            StepAction::Wait { .. } => StepKind::Wait,
            StepAction::Checkpoint { .. } => StepKind::Checkpoint,
        }
    }

    /// Primary element this step acts on, if any.
    pub fn target(&self) -> Option<&ElementTarget> {
        match self {
            StepAction::Click { target }
            | StepAction::DoubleClick { target }
            | StepAction::ContextMenu { target }
            | StepAction::TextInput { target, .. }
            | StepAction::Select { target, .. }
            | StepAction::Hover { target } => Some(target),
            StepAction::DragDrop { source, .. } => Some(source),
            StepAction::KeyPress { target, .. }
            | StepAction::FrameSwitch { target }
            | StepAction::Wait { target, .. } => target.as_ref(),
            StepAction::Scroll { to } => match to {
                ScrollTarget::Element(target) => Some(target),
                ScrollTarget::Offset { .. } => None,
            },
            StepAction::Checkpoint { checkpoint } => checkpoint.check.element(),
            StepAction::Navigate { .. }
            | StepAction::AlertAction { .. }
            | StepAction::WindowSwitch { .. } => None,
        }
    }
}

/// One recorded interaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedStep {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
    /// Frame selectors from the top document down to the step's frame.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<String>,
    #[serde(flatten)]
    pub action: StepAction,
}

impl RecordedStep {
    pub fn new(action: StepAction) -> Self {
        Self {
            timestamp: Utc::now(),
            page_url: None,
            page_title: None,
            frames: Vec::new(),
            action,
        }
    }

    pub fn with_frames(mut self, frames: Vec<String>) -> Self {
        self.frames = frames;
        self
    }

    pub fn kind(&self) -> StepKind {
        self.action.kind()
    }
}
