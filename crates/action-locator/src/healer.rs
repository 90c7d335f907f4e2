//! Healer backends: asked once for a replacement locator when every recorded
//! strategy missed.

use crate::errors::LocatorError;
use async_trait::async_trait;
use replay_core_types::{ElementDescriptor, HealingResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Input handed to a healer.
#[derive(Debug, Clone, Copy)]
pub struct HealRequest<'a> {
    pub descriptor: &'a ElementDescriptor,
    pub markup: &'a str,
    pub url: &'a str,
}

/// Locator healer trait
#[async_trait]
pub trait LocatorHealer: Send + Sync {
    /// Propose a replacement locator. `Ok(NotHealed)` is a clean refusal;
    /// `Err` means the healer could not be consulted at all.
    async fn heal(&self, request: &HealRequest<'_>) -> Result<HealingResult, LocatorError>;

    fn name(&self) -> &str;
}

/// Healer used when no backend is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHealer;

#[async_trait]
impl LocatorHealer for NoopHealer {
    async fn heal(&self, _request: &HealRequest<'_>) -> Result<HealingResult, LocatorError> {
        Ok(HealingResult::not_healed("no healer configured"))
    }

    fn name(&self) -> &str {
        "noop"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiHealerConfig {
    pub api_base: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    /// Markup beyond this many characters is cut before sending.
    pub max_markup_chars: usize,
}

impl Default for OpenAiHealerConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            temperature: 0.0,
            request_timeout_secs: 30,
            max_markup_chars: 60_000,
        }
    }
}

const SYSTEM_PROMPT: &str = "You repair broken element locators for browser test replay. \
You receive the recorded descriptor of an element that can no longer be found and the current page markup. \
Reply with a single JSON object: {\"healed\": true, \"locatorValue\": \"<selector>\", \"strategy\": \"css\"|\"xpath\"} \
when you can identify the element, or {\"healed\": false, \"failureReason\": \"<why>\"} when you cannot.";

/// Chat-completions healer.
pub struct OpenAiHealer {
    client: Client,
    config: OpenAiHealerConfig,
}

impl OpenAiHealer {
    pub fn new(config: OpenAiHealerConfig) -> Result<Self, LocatorError> {
        if config.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            return Err(LocatorError::HealerFailed(
                "missing API key for healer".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|err| {
                LocatorError::HealerFailed(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self { client, config })
    }

    fn user_prompt(&self, request: &HealRequest<'_>) -> String {
        let descriptor = serde_json::to_string_pretty(request.descriptor)
            .unwrap_or_else(|_| request.descriptor.to_string());
        let (markup, cut) = truncate_chars(request.markup, self.config.max_markup_chars);
        let mut prompt = format!(
            "Page URL: {}\n\nRecorded element descriptor:\n{}\n\nCurrent page markup",
            request.url, descriptor
        );
        if cut {
            prompt.push_str(" (truncated)");
        }
        prompt.push_str(":\n");
        prompt.push_str(markup);
        prompt
    }
}

#[async_trait]
impl LocatorHealer for OpenAiHealer {
    async fn heal(&self, request: &HealRequest<'_>) -> Result<HealingResult, LocatorError> {
        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );
        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                r#type: "json_object".to_string(),
            },
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: self.user_prompt(request),
                },
            ],
        };

        let key = self.config.api_key.clone().unwrap_or_default();
        let response = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|err| LocatorError::HealerFailed(format!("healer request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            warn!(target: "action-locator", %status, "healer returned an error status");
            return Err(LocatorError::HealerFailed(format!(
                "healer returned {status}: {text}"
            )));
        }

        let response: ChatCompletionResponse = response.json().await.map_err(|err| {
            LocatorError::HealerFailed(format!("healer response invalid: {err}"))
        })?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LocatorError::HealerFailed("healer response missing content".into()))?;
        debug!(target: "action-locator", chars = content.len(), "healer replied");

        parse_healer_reply(&content)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Parses the healer's JSON answer, tolerating code fences and prose around it.
pub fn parse_healer_reply(content: &str) -> Result<HealingResult, LocatorError> {
    let json = json_object_slice(content)
        .ok_or_else(|| LocatorError::HealerFailed("healer reply carried no JSON object".into()))?;
    serde_json::from_str::<HealingResult>(json)
        .map_err(|err| LocatorError::HealerFailed(format!("healer reply rejected: {err}")))
}

/// First balanced `{...}` in `raw`. Braces inside string literals are skipped.
fn json_object_slice(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn truncate_chars(text: &str, max: usize) -> (&str, bool) {
    match text.char_indices().nth(max) {
        Some((cut, _)) => (&text[..cut], true),
        None => (text, false),
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    temperature: f32,
    response_format: ResponseFormat,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}
