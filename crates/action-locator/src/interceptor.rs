//! Healing interceptor: resolver first, then one healer consultation, then a
//! tag + text XPath built from the descriptor.

use crate::{
    errors::LocatorError,
    healer::{HealRequest, LocatorHealer, NoopHealer},
    resolver::{DefaultElementResolver, ElementResolver},
    types::*,
};
use cdp_adapter::{FindBy, PageDriver};
use replay_core_types::{ElementDescriptor, HealingResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Characters of visible text kept in the fallback XPath.
pub const FALLBACK_TEXT_CHARS: usize = 30;

pub const DEFAULT_HEALER_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HealingInterceptor {
    page: Arc<dyn PageDriver>,
    resolver: Arc<dyn ElementResolver>,
    healer: Arc<dyn LocatorHealer>,
    healer_timeout: Duration,
}

impl HealingInterceptor {
    pub fn new(
        page: Arc<dyn PageDriver>,
        resolver: Arc<dyn ElementResolver>,
        healer: Arc<dyn LocatorHealer>,
        healer_timeout: Duration,
    ) -> Self {
        Self {
            page,
            resolver,
            healer,
            healer_timeout,
        }
    }

    /// Default resolver over `page`, healer as given.
    pub fn with_healer(page: Arc<dyn PageDriver>, healer: Arc<dyn LocatorHealer>) -> Self {
        let resolver = Arc::new(DefaultElementResolver::new(page.clone()));
        Self::new(page, resolver, healer, DEFAULT_HEALER_TIMEOUT)
    }

    /// Resolver plus DOM fallback only.
    pub fn without_healer(page: Arc<dyn PageDriver>) -> Self {
        Self::with_healer(page, Arc::new(NoopHealer))
    }

    pub fn set_healer_timeout(&mut self, timeout: Duration) {
        self.healer_timeout = timeout;
    }

    pub fn healer_name(&self) -> &str {
        self.healer.name()
    }

    pub async fn find_element(
        &self,
        descriptor: &ElementDescriptor,
    ) -> Result<Resolution, LocatorError> {
        let mut transitions = vec![HealState::Resolving];

        if !descriptor.has_any_locator() {
            return Err(LocatorError::InvalidDescriptor(format!(
                "nothing to resolve for {descriptor}"
            )));
        }

        let resolve_error = match self.resolver.resolve(descriptor).await {
            Ok(resolution) => return Ok(resolution),
            Err(err) => err,
        };
        info!(target: "action-locator", error = %resolve_error, "recorded locators failed; healing");

        transitions.push(HealState::Healing);
        let healer_reason = match self.consult_healer(descriptor).await {
            HealOutcome::Healed { lookup } => {
                return match self.page.find(&lookup).await {
                    Ok(Some(handle)) => {
                        info!(target: "action-locator", locator = %lookup, "healed locator matched");
                        transitions.push(HealState::Success);
                        Ok(Resolution {
                            handle,
                            strategy: LocatorStrategy::Healed,
                            locator: lookup.value().to_string(),
                            transitions,
                        })
                    }
                    Ok(None) => {
                        warn!(target: "action-locator", locator = %lookup, "healed locator matched nothing");
                        Err(LocatorError::HealedLocatorNotFound {
                            strategy: lookup.kind().to_string(),
                            locator: lookup.value().to_string(),
                        })
                    }
                    Err(err) if err.is_connection() => Err(err.into()),
                    Err(err) => Err(LocatorError::HealedLocatorNotFound {
                        strategy: lookup.kind().to_string(),
                        locator: format!("{} ({err})", lookup.value()),
                    }),
                };
            }
            HealOutcome::Declined(reason) => reason,
        };

        transitions.push(HealState::DomFallback);
        let fallback_reason = match dom_fallback_xpath(descriptor) {
            None => "descriptor has no visible text".to_string(),
            Some(xpath) => {
                debug!(target: "action-locator", %xpath, "trying DOM text fallback");
                match self.page.find(&FindBy::XPath(xpath.clone())).await {
                    Ok(Some(handle)) => {
                        info!(target: "action-locator", %xpath, "DOM text fallback matched");
                        transitions.push(HealState::Success);
                        return Ok(Resolution {
                            handle,
                            strategy: LocatorStrategy::DomText,
                            locator: xpath,
                            transitions,
                        });
                    }
                    Ok(None) => format!("no element matched {xpath}"),
                    Err(err) if err.is_connection() => return Err(err.into()),
                    Err(err) => format!("lookup {xpath} failed: {err}"),
                }
            }
        };

        warn!(
            target: "action-locator",
            %descriptor,
            healer = %healer_reason,
            fallback = %fallback_reason,
            "element could not be healed"
        );
        Err(LocatorError::HealingExhausted {
            descriptor: descriptor.to_string(),
            healer_reason,
            fallback_reason,
        })
    }

    /// Exactly one healer call; every failure mode collapses into a reason.
    async fn consult_healer(&self, descriptor: &ElementDescriptor) -> HealOutcome {
        let markup = match self.page.page_markup().await {
            Ok(markup) => markup,
            Err(err) => return HealOutcome::Declined(format!("page markup unavailable: {err}")),
        };
        let url = self.page.current_url().await.unwrap_or_default();
        let request = HealRequest {
            descriptor,
            markup: &markup,
            url: &url,
        };

        let answer = tokio::time::timeout(self.healer_timeout, self.healer.heal(&request)).await;
        match answer {
            Ok(Ok(HealingResult::Healed {
                locator_value,
                strategy,
            })) => HealOutcome::Healed {
                lookup: healed_lookup(strategy, &locator_value),
            },
            Ok(Ok(HealingResult::NotHealed { failure_reason })) => {
                HealOutcome::Declined(failure_reason)
            }
            Ok(Err(err)) => {
                warn!(target: "action-locator", healer = self.healer.name(), error = %err, "healer failed");
                HealOutcome::Declined(err.to_string())
            }
            Err(_) => HealOutcome::Declined(format!(
                "healer timed out after {} ms",
                self.healer_timeout.as_millis()
            )),
        }
    }
}

enum HealOutcome {
    Healed { lookup: FindBy },
    Declined(String),
}

/// `//tag[contains(normalize-space(.), 'text')]` from the descriptor's tag
/// (or `*`) and its first 30 characters of normalized text.
pub fn dom_fallback_xpath(descriptor: &ElementDescriptor) -> Option<String> {
    let text = descriptor.text()?;
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let snippet: String = normalized.chars().take(FALLBACK_TEXT_CHARS).collect();
    let snippet = snippet.trim_end();
    if snippet.is_empty() {
        return None;
    }
    let tag = descriptor
        .tag()
        .filter(|tag| tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
        .unwrap_or("*");
    Some(format!(
        "//{tag}[contains(normalize-space(.), {})]",
        xpath_literal(snippet)
    ))
}

fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{value}'")
    } else if !value.contains('"') {
        format!("\"{value}\"")
    } else {
        let parts: Vec<String> = value
            .split('\'')
            .map(|part| format!("'{part}'"))
            .collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}
