//! Core types for the locator system

use cdp_adapter::{ElementHandle, FindBy};
use replay_core_types::HealStrategy;
use serde::{Deserialize, Serialize};

/// Locator strategy types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorStrategy {
    Id,
    Name,
    Css,
    XPath,
    /// Locator supplied by the healer
    Healed,
    /// Tag + visible text xpath built after the healer gave up
    DomText,
}

impl LocatorStrategy {
    /// Get strategy name
    pub fn name(&self) -> &'static str {
        match self {
            LocatorStrategy::Id => "id",
            LocatorStrategy::Name => "name",
            LocatorStrategy::Css => "css",
            LocatorStrategy::XPath => "xpath",
            LocatorStrategy::Healed => "healed",
            LocatorStrategy::DomText => "dom-text",
        }
    }

    /// Recorded strategies in resolution order
    pub fn fallback_chain() -> [LocatorStrategy; 4] {
        [
            LocatorStrategy::Id,
            LocatorStrategy::Name,
            LocatorStrategy::Css,
            LocatorStrategy::XPath,
        ]
    }
}

/// Interceptor states; a lookup walks these in order and stops at a terminal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealState {
    Resolving,
    Healing,
    DomFallback,
    Success,
    Fatal,
}

/// Resolved element plus how it was found
#[derive(Debug, Clone)]
pub struct Resolution {
    pub handle: ElementHandle,
    pub strategy: LocatorStrategy,
    pub locator: String,
    /// States visited, ending in `Success`
    pub transitions: Vec<HealState>,
}

impl Resolution {
    pub fn direct(handle: ElementHandle, strategy: LocatorStrategy, locator: String) -> Self {
        Self {
            handle,
            strategy,
            locator,
            transitions: vec![HealState::Resolving, HealState::Success],
        }
    }

    pub fn was_healed(&self) -> bool {
        matches!(
            self.strategy,
            LocatorStrategy::Healed | LocatorStrategy::DomText
        )
    }
}

/// Maps a healer answer onto a live lookup.
pub fn healed_lookup(strategy: HealStrategy, value: &str) -> FindBy {
    let value = value.trim().to_string();
    match strategy {
        HealStrategy::Css => FindBy::Css(value),
        HealStrategy::Xpath => FindBy::XPath(value),
        HealStrategy::Healed => {
            if value.starts_with('/') || value.starts_with('(') {
                FindBy::XPath(value)
            } else {
                FindBy::Css(value)
            }
        }
    }
}
