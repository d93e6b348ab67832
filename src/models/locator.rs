use serde::{Deserialize, Serialize};
use std::fmt;

/// Strategy a replay backend uses to resolve a locator value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStrategy {
    Id,
    Name,
    Css,
    Xpath,
    LinkText,
    PartialLinkText,
}

impl LocatorStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocatorStrategy::Id => "id",
            LocatorStrategy::Name => "name",
            LocatorStrategy::Css => "css",
            LocatorStrategy::Xpath => "xpath",
            LocatorStrategy::LinkText => "link_text",
            LocatorStrategy::PartialLinkText => "partial_link_text",
        }
    }
}

impl fmt::Display for LocatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (strategy, value) pair that re-finds one element.
///
/// Serialized as a two element array, `["id", "submit-btn"]`, which is the
/// shape replay backends iterate over.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(LocatorStrategy, String)", into = "(LocatorStrategy, String)")]
pub struct Locator {
    pub strategy: LocatorStrategy,
    pub value: String,
}

impl Locator {
    pub fn new(strategy: LocatorStrategy, value: impl Into<String>) -> Self {
        Self {
            strategy,
            value: value.into(),
        }
    }

    pub fn id(value: impl Into<String>) -> Self {
        Self::new(LocatorStrategy::Id, value)
    }

    pub fn name(value: impl Into<String>) -> Self {
        Self::new(LocatorStrategy::Name, value)
    }

    pub fn css(value: impl Into<String>) -> Self {
        Self::new(LocatorStrategy::Css, value)
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self::new(LocatorStrategy::Xpath, value)
    }

    /// De-duplication key, `strategy|value`
    pub fn key(&self) -> String {
        format!("{}|{}", self.strategy, self.value)
    }
}

impl From<(LocatorStrategy, String)> for Locator {
    fn from((strategy, value): (LocatorStrategy, String)) -> Self {
        Self { strategy, value }
    }
}

impl From<Locator> for (LocatorStrategy, String) {
    fn from(locator: Locator) -> Self {
        (locator.strategy, locator.value)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy, self.value)
    }
}
