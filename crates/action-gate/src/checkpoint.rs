//! Checkpoint comparison of live page values against recorded expectations.

use crate::errors::GateError;
use cdp_adapter::{ElementHandle, PageDriver};
use regex::{Regex, RegexBuilder};
use replay_core_types::{CheckpointSpec, CheckpointTarget, MatchMode};
use tracing::debug;

/// Compiled comparison for one checkpoint.
#[derive(Debug, Clone)]
pub struct CheckpointMatcher {
    mode: MatchMode,
    expected: String,
    case_sensitive: bool,
    pattern: Option<Regex>,
}

impl CheckpointMatcher {
    pub fn new(mode: MatchMode, expected: &str, case_sensitive: bool) -> Result<Self, GateError> {
        let pattern = match mode {
            MatchMode::Regex => Some(
                RegexBuilder::new(expected)
                    .case_insensitive(!case_sensitive)
                    .build()
                    .map_err(|err| GateError::InvalidPattern {
                        pattern: expected.to_string(),
                        reason: err.to_string(),
                    })?,
            ),
            _ => None,
        };
        Ok(Self {
            mode,
            expected: expected.to_string(),
            case_sensitive,
            pattern,
        })
    }

    pub fn from_spec(spec: &CheckpointSpec) -> Result<Self, GateError> {
        Self::new(spec.mode, &spec.expected, spec.case_sensitive)
    }

    pub fn matches(&self, actual: &str) -> bool {
        if let Some(pattern) = &self.pattern {
            return pattern.is_match(actual);
        }
        let (actual, expected) = if self.case_sensitive {
            (actual.to_string(), self.expected.clone())
        } else {
            (actual.to_lowercase(), self.expected.to_lowercase())
        };
        match self.mode {
            MatchMode::Equals => actual == expected,
            MatchMode::Contains => actual.contains(&expected),
            MatchMode::StartsWith => actual.starts_with(&expected),
            MatchMode::Regex => false,
        }
    }

    /// `Ok` on match, `CheckpointMismatch` carrying both values otherwise.
    pub fn check(&self, check: &str, actual: &str) -> Result<(), GateError> {
        if self.matches(actual) {
            return Ok(());
        }
        let mode = if self.case_sensitive {
            self.mode.as_str().to_string()
        } else {
            format!("{} (case-insensitive)", self.mode.as_str())
        };
        Err(GateError::CheckpointMismatch {
            check: check.to_string(),
            mode,
            expected: self.expected.clone(),
            actual: actual.to_string(),
        })
    }
}

/// Human label for the value a checkpoint reads.
pub fn describe_check(target: &CheckpointTarget) -> String {
    match target {
        CheckpointTarget::Text { .. } => "element text".to_string(),
        CheckpointTarget::Value { .. } => "element value".to_string(),
        CheckpointTarget::Attribute { name, .. } => format!("attribute '{name}'"),
        CheckpointTarget::Visible { .. } => "element visibility".to_string(),
        CheckpointTarget::Url => "page URL".to_string(),
        CheckpointTarget::Title => "page title".to_string(),
    }
}

/// Reads the live value for `spec` and compares it. Element checks need the
/// resolved `element`; page checks ignore it.
pub async fn verify_checkpoint(
    page: &dyn PageDriver,
    element: Option<&ElementHandle>,
    spec: &CheckpointSpec,
) -> Result<(), GateError> {
    let matcher = CheckpointMatcher::from_spec(spec)?;
    let check = describe_check(&spec.check);
    let actual = match (&spec.check, element) {
        (CheckpointTarget::Url, _) => page.current_url().await?,
        (CheckpointTarget::Title, _) => page.title().await?,
        (CheckpointTarget::Text { .. }, Some(el)) => page.element_text(el).await?,
        (CheckpointTarget::Value { .. }, Some(el)) => page.element_value(el).await?,
        (CheckpointTarget::Attribute { name, .. }, Some(el)) => page
            .element_attribute(el, name)
            .await?
            .unwrap_or_default(),
        (CheckpointTarget::Visible { .. }, Some(el)) => page.is_visible(el).await?.to_string(),
        (_, None) => {
            return Err(GateError::CdpError(format!(
                "{check} checkpoint needs a resolved element"
            )))
        }
    };
    debug!(target: "action-gate", %check, %actual, "checkpoint read");
    matcher.check(&check, &actual)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_compare_as_named() {
        let equals = CheckpointMatcher::new(MatchMode::Equals, "Welcome", true).unwrap();
        assert!(equals.matches("Welcome"));
        assert!(!equals.matches("Welcome back"));

        let contains = CheckpointMatcher::new(MatchMode::Contains, "back", true).unwrap();
        assert!(contains.matches("Welcome back"));

        let prefix = CheckpointMatcher::new(MatchMode::StartsWith, "Wel", true).unwrap();
        assert!(prefix.matches("Welcome"));
        assert!(!prefix.matches("A Welcome"));

        let regex = CheckpointMatcher::new(MatchMode::Regex, r"^Order #\d+$", true).unwrap();
        assert!(regex.matches("Order #1042"));
        assert!(!regex.matches("Order #abc"));
    }

    #[test]
    fn case_insensitive_applies_to_every_mode() {
        for mode in [
            MatchMode::Equals,
            MatchMode::Contains,
            MatchMode::StartsWith,
            MatchMode::Regex,
        ] {
            let matcher = CheckpointMatcher::new(mode, "welcome", false).unwrap();
            assert!(matcher.matches("WELCOME"), "{mode:?}");
            let strict = CheckpointMatcher::new(mode, "welcome", true).unwrap();
            assert!(!strict.matches("WELCOME"), "{mode:?}");
        }
    }

    #[test]
    fn mismatch_carries_both_values() {
        let matcher = CheckpointMatcher::new(MatchMode::Equals, "Welcome", true).unwrap();
        let err = matcher.check("element text", "Goodbye").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Welcome"));
        assert!(message.contains("Goodbye"));
        assert!(message.contains("equals"));
    }

    #[test]
    fn bad_regex_is_rejected_up_front() {
        assert!(matches!(
            CheckpointMatcher::new(MatchMode::Regex, "(unclosed", true),
            Err(GateError::InvalidPattern { .. })
        ));
    }
}
