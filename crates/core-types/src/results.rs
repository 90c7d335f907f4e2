//! Value objects produced while replaying: healer answers and run outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Locator dialect a healer answered in.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealStrategy {
    Css,
    Xpath,
    /// Healer did not name a dialect; the value is sniffed (xpath if it starts
    /// with `/` or `(`, css otherwise).
    Healed,
}

impl HealStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealStrategy::Css => "css",
            HealStrategy::Xpath => "xpath",
            HealStrategy::Healed => "healed",
        }
    }
}

/// Outcome of one healer call.
///
/// Exactly one of a locator value or a failure reason exists, which the enum
/// shape enforces. On the wire it keeps the flat
/// `{healed, locatorValue, strategy, failureReason}` form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HealingResultWire", into = "HealingResultWire")]
pub enum HealingResult {
    Healed {
        locator_value: String,
        strategy: HealStrategy,
    },
    NotHealed {
        failure_reason: String,
    },
}

impl HealingResult {
    pub fn healed(locator_value: impl Into<String>, strategy: HealStrategy) -> Self {
        Self::Healed {
            locator_value: locator_value.into(),
            strategy,
        }
    }

    pub fn not_healed(reason: impl Into<String>) -> Self {
        Self::NotHealed {
            failure_reason: reason.into(),
        }
    }

    pub fn is_healed(&self) -> bool {
        matches!(self, HealingResult::Healed { .. })
    }

    pub fn locator_value(&self) -> Option<&str> {
        match self {
            HealingResult::Healed { locator_value, .. } => Some(locator_value),
            HealingResult::NotHealed { .. } => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            HealingResult::Healed { .. } => None,
            HealingResult::NotHealed { failure_reason } => Some(failure_reason),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HealingResultWire {
    healed: bool,
    #[serde(default)]
    locator_value: Option<String>,
    #[serde(default)]
    strategy: Option<HealStrategy>,
    #[serde(default)]
    failure_reason: Option<String>,
}

impl TryFrom<HealingResultWire> for HealingResult {
    type Error = String;

    fn try_from(wire: HealingResultWire) -> Result<Self, Self::Error> {
        let value = wire.locator_value.filter(|v| !v.trim().is_empty());
        match (wire.healed, value, wire.failure_reason) {
            (true, Some(locator_value), None) => Ok(HealingResult::Healed {
                locator_value,
                strategy: wire.strategy.unwrap_or(HealStrategy::Healed),
            }),
            (true, None, _) => Err("healed result without a locator value".to_string()),
            (true, Some(_), Some(_)) => {
                Err("healed result must not carry a failure reason".to_string())
            }
            (false, None, reason) => Ok(HealingResult::NotHealed {
                failure_reason: reason.unwrap_or_else(|| "healer gave no reason".to_string()),
            }),
            (false, Some(_), _) => {
                Err("unhealed result must not carry a locator value".to_string())
            }
        }
    }
}

impl From<HealingResult> for HealingResultWire {
    fn from(result: HealingResult) -> Self {
        match result {
            HealingResult::Healed {
                locator_value,
                strategy,
            } => Self {
                healed: true,
                locator_value: Some(locator_value),
                strategy: Some(strategy),
                failure_reason: None,
            },
            HealingResult::NotHealed { failure_reason } => Self {
                healed: false,
                locator_value: None,
                strategy: None,
                failure_reason: Some(failure_reason),
            },
        }
    }
}

/// Failure category surfaced to operators; each needs a different response.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    ElementNotFound,
    HealingExhausted,
    CheckpointMismatch,
    Navigation,
    Timeout,
    Popup,
    Connection,
    Action,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ElementNotFound => "element not found",
            FailureKind::HealingExhausted => "healing exhausted",
            FailureKind::CheckpointMismatch => "checkpoint mismatch",
            FailureKind::Navigation => "navigation failed",
            FailureKind::Timeout => "timed out",
            FailureKind::Popup => "unexpected popup",
            FailureKind::Connection => "browser connection lost",
            FailureKind::Action => "action failed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one session run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackResult {
    pub success: bool,
    pub steps_completed: usize,
    pub total_steps: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
}

impl PlaybackResult {
    pub fn passed(total_steps: usize) -> Self {
        Self {
            success: true,
            steps_completed: total_steps,
            total_steps,
            failure_reason: None,
            failed_step: None,
            failure_kind: None,
        }
    }

    /// `step_index` is zero based, so it doubles as the count of completed steps.
    pub fn failed(
        step_index: usize,
        total_steps: usize,
        kind: FailureKind,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            steps_completed: step_index,
            total_steps,
            failure_reason: Some(format!("step {step_index}: {kind}: {}", reason.into())),
            failed_step: Some(step_index),
            failure_kind: Some(kind),
        }
    }
}
