//! Element descriptors: the bundle of candidate locators recorded for one element.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Bounding box captured at record time (CSS pixels, viewport relative).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Candidate locator values for a single DOM element.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundingBox>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl ElementDescriptor {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_css(mut self, css: impl Into<String>) -> Self {
        self.css = Some(css.into());
        self
    }

    pub fn with_xpath(mut self, xpath: impl Into<String>) -> Self {
        self.xpath = Some(xpath.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        non_empty(&self.id)
    }

    pub fn name(&self) -> Option<&str> {
        non_empty(&self.name)
    }

    pub fn css(&self) -> Option<&str> {
        non_empty(&self.css)
    }

    pub fn xpath(&self) -> Option<&str> {
        non_empty(&self.xpath)
    }

    pub fn tag(&self) -> Option<&str> {
        non_empty(&self.tag)
    }

    pub fn text(&self) -> Option<&str> {
        non_empty(&self.text)
    }

    /// True iff at least one of id/name/css/xpath/text carries a value.
    pub fn has_any_locator(&self) -> bool {
        self.id().is_some()
            || self.name().is_some()
            || self.css().is_some()
            || self.xpath().is_some()
            || self.text().is_some()
    }
}

impl fmt::Display for ElementDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(id) = self.id() {
            parts.push(format!("id={id}"));
        }
        if let Some(name) = self.name() {
            parts.push(format!("name={name}"));
        }
        if let Some(css) = self.css() {
            parts.push(format!("css={css}"));
        }
        if let Some(xpath) = self.xpath() {
            parts.push(format!("xpath={xpath}"));
        }
        if let Some(text) = self.text() {
            parts.push(format!("text={text:?}"));
        }
        if parts.is_empty() {
            f.write_str("<no locators>")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}
