//! Assertions over a capture log. Each one is silent when it holds and
//! otherwise returns [`CaptureError::AssertionFailed`] listing the relevant
//! records. None of them touch the log.

use replay_core_types::{Capture, CaptureType};

use crate::errors::CaptureError;
use crate::query;

fn failure(assertion: &str, expected: impl Into<String>, seen: &[Capture]) -> CaptureError {
    CaptureError::AssertionFailed {
        assertion: assertion.to_string(),
        expected: expected.into(),
        captured: seen.iter().map(Capture::summary).collect(),
    }
}

/// Fails listing every network response with a 5xx status.
pub fn no_server_errors(captures: &[Capture]) -> Result<(), CaptureError> {
    let errors: Vec<Capture> = captures
        .iter()
        .filter(|c| c.is_server_error())
        .cloned()
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(failure(
            "assert_no_server_errors",
            "no network response with status >= 500",
            &errors,
        ))
    }
}

pub fn request_made(
    captures: &[Capture],
    url_pattern: &str,
    method: Option<&str>,
) -> Result<(), CaptureError> {
    let matching = query::network(captures, url_pattern, method)?;
    if matching
        .iter()
        .any(|c| c.capture_type == CaptureType::NetworkRequest)
    {
        return Ok(());
    }
    Err(failure(
        "assert_request_made",
        format!(
            "a {} request to /{url_pattern}/",
            method.map(str::to_ascii_uppercase).unwrap_or_else(|| "network".into())
        ),
        &query::of_type(captures, CaptureType::NetworkRequest),
    ))
}

/// At least one response for `url_pattern` carried `status`.
pub fn response_status(
    captures: &[Capture],
    url_pattern: &str,
    status: u16,
) -> Result<(), CaptureError> {
    let responses: Vec<Capture> = query::network(captures, url_pattern, None)?
        .into_iter()
        .filter(|c| c.capture_type == CaptureType::NetworkResponse)
        .collect();
    if responses.iter().any(|c| c.status == Some(status)) {
        return Ok(());
    }
    let seen = if responses.is_empty() {
        query::of_type(captures, CaptureType::NetworkResponse)
    } else {
        responses
    };
    Err(failure(
        "assert_response_status",
        format!("a response from /{url_pattern}/ with status {status}"),
        &seen,
    ))
}

pub fn no_console_errors(captures: &[Capture]) -> Result<(), CaptureError> {
    let errors: Vec<Capture> = query::console_problems(captures)
        .into_iter()
        .filter(|c| c.level().map(|l| l.eq_ignore_ascii_case("error")).unwrap_or(false))
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(failure("assert_no_console_errors", "no console errors", &errors))
    }
}

/// A storage key matching `key_pattern` was set, to `value` when given.
pub fn storage_set(
    captures: &[Capture],
    key_pattern: &str,
    value: Option<&str>,
) -> Result<(), CaptureError> {
    let writes: Vec<Capture> = query::storage(captures, key_pattern)?
        .into_iter()
        .filter(|c| c.capture_type == CaptureType::StorageSet)
        .collect();
    let held = writes
        .iter()
        .any(|c| value.map(|wanted| c.data == wanted).unwrap_or(true));
    if held {
        return Ok(());
    }
    let expected = match value {
        Some(wanted) => format!("storage key /{key_pattern}/ set to '{wanted}'"),
        None => format!("storage key /{key_pattern}/ to be set"),
    };
    let seen = if writes.is_empty() {
        query::of_type(captures, CaptureType::StorageSet)
    } else {
        writes
    };
    Err(failure("assert_storage_set", expected, &seen))
}

pub fn dom_added(captures: &[Capture], selector: &str) -> Result<(), CaptureError> {
    if !query::dom_additions(captures, selector)?.is_empty() {
        return Ok(());
    }
    let added: Vec<Capture> = query::of_type(captures, CaptureType::DomMutation)
        .into_iter()
        .filter(|c| c.extra.get("change").and_then(|v| v.as_str()) == Some("added"))
        .collect();
    Err(failure(
        "assert_dom_added",
        format!("an added element matching '{selector}'"),
        &added,
    ))
}

/// Some capture of `capture_type` mentions `needle` in its source or data.
pub fn captured(
    captures: &[Capture],
    capture_type: CaptureType,
    needle: &str,
) -> Result<(), CaptureError> {
    let of_type = query::of_type(captures, capture_type);
    if !query::containing(&of_type, needle).is_empty() {
        return Ok(());
    }
    Err(failure(
        "assert_captured",
        format!("a {capture_type} capture containing '{needle}'"),
        &of_type,
    ))
}
