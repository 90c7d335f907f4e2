//! Filters over captured records.

use regex::Regex;
use replay_core_types::{Capture, CaptureType};
use serde_json::Value;

use crate::errors::CaptureError;

pub(crate) fn compile(pattern: &str) -> Result<Regex, CaptureError> {
    Regex::new(pattern).map_err(|err| CaptureError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: err.to_string(),
    })
}

pub fn of_type(captures: &[Capture], capture_type: CaptureType) -> Vec<Capture> {
    captures
        .iter()
        .filter(|c| c.capture_type == capture_type)
        .cloned()
        .collect()
}

/// Plain substring match against source or data.
pub fn containing(captures: &[Capture], needle: &str) -> Vec<Capture> {
    captures
        .iter()
        .filter(|c| c.source.contains(needle) || c.data.contains(needle))
        .cloned()
        .collect()
}

/// Network requests and responses whose URL matches `url_pattern` (a regex,
/// unanchored). `method` compares case-insensitively.
pub fn network(
    captures: &[Capture],
    url_pattern: &str,
    method: Option<&str>,
) -> Result<Vec<Capture>, CaptureError> {
    let url = compile(url_pattern)?;
    Ok(captures
        .iter()
        .filter(|c| c.capture_type.is_network() && url.is_match(&c.source))
        .filter(|c| match method {
            Some(wanted) => c
                .method()
                .map(|m| m.eq_ignore_ascii_case(wanted))
                .unwrap_or(false),
            None => true,
        })
        .cloned()
        .collect())
}

pub fn storage(captures: &[Capture], key_pattern: &str) -> Result<Vec<Capture>, CaptureError> {
    let key = compile(key_pattern)?;
    Ok(captures
        .iter()
        .filter(|c| {
            matches!(
                c.capture_type,
                CaptureType::StorageSet | CaptureType::StorageRemove
            ) && key.is_match(&c.source)
        })
        .cloned()
        .collect())
}

/// Console output at `error` or `warn` level, uncaught errors included.
pub fn console_problems(captures: &[Capture]) -> Vec<Capture> {
    captures
        .iter()
        .filter(|c| {
            matches!(
                c.level().map(str::to_ascii_lowercase).as_deref(),
                Some("error") | Some("warn") | Some("warning")
            )
        })
        .cloned()
        .collect()
}

/// Added DOM nodes matching a simple selector (`tag`, `#id`, `.class`, or a
/// compound such as `div#toast.alert`).
pub fn dom_additions(captures: &[Capture], selector: &str) -> Result<Vec<Capture>, CaptureError> {
    let selector = SimpleSelector::parse(selector)?;
    Ok(captures
        .iter()
        .filter(|c| {
            c.capture_type == CaptureType::DomMutation
                && c.extra.get("change").and_then(Value::as_str) == Some("added")
                && selector.matches(c)
        })
        .cloned()
        .collect())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimpleSelector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

impl SimpleSelector {
    pub fn parse(raw: &str) -> Result<Self, CaptureError> {
        let invalid = |reason: &str| CaptureError::InvalidPattern {
            pattern: raw.to_string(),
            reason: reason.to_string(),
        };
        let raw_trimmed = raw.trim();
        if raw_trimmed.is_empty() {
            return Err(invalid("empty selector"));
        }
        if raw_trimmed
            .chars()
            .any(|c| c.is_whitespace() || "[]>+~:,()".contains(c))
        {
            return Err(invalid("only tag, #id and .class parts are supported"));
        }

        let mut selector = SimpleSelector::default();
        let mut current = String::new();
        let mut sigil = None;
        for c in raw_trimmed.chars().chain(std::iter::once('\0')) {
            if c == '#' || c == '.' || c == '\0' {
                match sigil {
                    None if !current.is_empty() && current != "*" => {
                        selector.tag = Some(current.to_ascii_lowercase())
                    }
                    None => {}
                    Some('#') if !current.is_empty() => selector.id = Some(current.clone()),
                    Some('.') if !current.is_empty() => selector.classes.push(current.clone()),
                    Some(_) => return Err(invalid("dangling '#' or '.'")),
                }
                current.clear();
                sigil = Some(c);
            } else {
                current.push(c);
            }
        }
        Ok(selector)
    }

    pub fn matches(&self, capture: &Capture) -> bool {
        let extra = &capture.extra;
        if let Some(tag) = &self.tag {
            let actual = extra.get("tag").and_then(Value::as_str).unwrap_or_default();
            if !actual.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if extra.get("id").and_then(Value::as_str) != Some(id.as_str()) {
                return false;
            }
        }
        let classes: Vec<&str> = extra
            .get("classes")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        self.classes
            .iter()
            .all(|wanted| classes.contains(&wanted.as_str()))
    }
}
