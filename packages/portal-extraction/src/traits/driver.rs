//! Automation driver trait.
//!
//! The driver is the external collaborator that owns a real browser session.
//! One driver instance is one session; it is not reentrant, so every call
//! against it is issued from a single logical thread of control.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{DriverError, DriverResult};

/// How to find elements on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum Locator {
    Css(String),
    XPath(String),
    LinkText(String),
    PartialLinkText(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::XPath(expr.into())
    }

    pub fn link_text(text: impl Into<String>) -> Self {
        Locator::LinkText(text.into())
    }

    pub fn partial_link_text(text: impl Into<String>) -> Self {
        Locator::PartialLinkText(text.into())
    }

    /// Substitute `{page}` in the locator value.
    pub fn with_page(&self, page: usize) -> Self {
        let sub = |s: &String| s.replace("{page}", &page.to_string());
        match self {
            Locator::Css(s) => Locator::Css(sub(s)),
            Locator::XPath(s) => Locator::XPath(sub(s)),
            Locator::LinkText(s) => Locator::LinkText(sub(s)),
            Locator::PartialLinkText(s) => Locator::PartialLinkText(sub(s)),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css={}", s),
            Locator::XPath(s) => write!(f, "xpath={}", s),
            Locator::LinkText(s) => write!(f, "link={}", s),
            Locator::PartialLinkText(s) => write!(f, "partial_link={}", s),
        }
    }
}

/// Opaque reference to an element in the driver's current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Browser automation driver for one portal session.
///
/// Element queries return empty collections rather than failing on absence;
/// "not found" is data, not an error.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Load a URL in the main window.
    async fn navigate(&self, url: &str) -> DriverResult<()>;

    /// Find all elements on the page matching a locator.
    async fn find_elements(&self, locator: &Locator) -> DriverResult<Vec<ElementHandle>>;

    /// Find descendants of `parent` matching a locator.
    async fn find_within(
        &self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> DriverResult<Vec<ElementHandle>>;

    /// Visible text of an element.
    async fn text(&self, element: &ElementHandle) -> DriverResult<String>;

    /// Attribute value of an element, if present.
    async fn attribute(&self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>>;

    /// Click an element.
    async fn click(&self, element: &ElementHandle) -> DriverResult<()>;

    /// Type text into an input element.
    async fn type_text(&self, element: &ElementHandle, text: &str) -> DriverResult<()>;

    /// Wait until an element matching the locator is present.
    ///
    /// Returns `false` on timeout instead of failing.
    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> DriverResult<bool>;

    /// URL of the current page.
    async fn current_url(&self) -> DriverResult<String>;

    /// Raw source of the current page.
    async fn page_source(&self) -> DriverResult<String>;

    /// Run a script in the page (used for script-driven pagination).
    async fn execute_script(&self, script: &str) -> DriverResult<()>;

    /// Close every window except the main one. Returns how many were closed.
    async fn close_secondary_windows(&self) -> DriverResult<usize>;

    /// Throw away the browser session and start a fresh one.
    async fn restart(&self) -> DriverResult<()>;

    /// First element matching a locator, if any.
    async fn find_first(&self, locator: &Locator) -> DriverResult<Option<ElementHandle>> {
        Ok(self.find_elements(locator).await?.into_iter().next())
    }

    /// First descendant of `parent` matching a locator, if any.
    async fn find_first_within(
        &self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> DriverResult<Option<ElementHandle>> {
        Ok(self.find_within(parent, locator).await?.into_iter().next())
    }

    /// Text of the first element matching a locator, if any.
    async fn text_of(&self, locator: &Locator) -> DriverResult<Option<String>> {
        match self.find_first(locator).await? {
            Some(el) => Ok(Some(self.text(&el).await?)),
            None => Ok(None),
        }
    }
}

/// Treat a locator failure as an empty result unless the session died.
///
/// Element lookups on these portals fail for many harmless reasons; only a
/// dead session is worth propagating.
pub fn empty_unless_dead<T: Default>(result: DriverResult<T>) -> DriverResult<T> {
    match result {
        Ok(v) => Ok(v),
        Err(e) if e.is_session_dead() => Err(e),
        Err(e) => {
            tracing::debug!(error = %e, "Locator failure treated as empty result");
            Ok(T::default())
        }
    }
}

/// Convenience for callers that need a single required element.
pub async fn require_element(
    driver: &dyn Driver,
    locator: &Locator,
) -> DriverResult<ElementHandle> {
    driver
        .find_first(locator)
        .await?
        .ok_or_else(|| DriverError::ElementNotFound {
            locator: locator.to_string(),
        })
}
