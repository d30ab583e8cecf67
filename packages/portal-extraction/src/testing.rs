//! Testing utilities including a scripted mock driver.
//!
//! `MockDriver` serves a small in-memory DOM per URL, so pipelines can be
//! exercised end to end without a browser. Failures and session death can be
//! injected per operation, and every interaction is recorded for assertions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{DriverError, DriverResult};
use crate::traits::driver::{Driver, ElementHandle, Locator};
use crate::types::config::{PortalConfig, RowSelectors};

/// What happens when an element is clicked.
#[derive(Debug, Clone, PartialEq)]
pub enum ClickAction {
    /// Load another page
    Navigate(String),

    /// Load `success` if the value typed into `field` equals `expected`,
    /// otherwise `failure`. Models form submission.
    Check {
        field: Locator,
        expected: String,
        success: String,
        failure: String,
    },

    /// Open a popup window
    OpenWindow,
}

/// One element of a mock page.
#[derive(Debug, Clone, Default)]
pub struct MockElement {
    locators: Vec<Locator>,
    text: String,
    attributes: HashMap<String, String>,
    children: Vec<MockElement>,
    on_click: Option<ClickAction>,
    link: bool,
}

impl MockElement {
    /// An element found by `locator`.
    pub fn new(locator: Locator) -> Self {
        Self {
            locators: vec![locator],
            ..Default::default()
        }
    }

    /// An anchor. Matches `css=a` and link-text locators, navigates on click.
    pub fn link(text: impl Into<String>, href: impl Into<String>) -> Self {
        let href = href.into();
        Self {
            text: text.into(),
            attributes: HashMap::from([("href".to_string(), href.clone())]),
            on_click: Some(ClickAction::Navigate(href)),
            link: true,
            ..Default::default()
        }
    }

    /// An anchor without an href.
    pub fn dead_link(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            link: true,
            ..Default::default()
        }
    }

    /// Also match another locator.
    pub fn matching(mut self, locator: Locator) -> Self {
        self.locators.push(locator);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: MockElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = MockElement>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn on_click(mut self, action: ClickAction) -> Self {
        self.on_click = Some(action);
        self
    }

    fn matches(&self, locator: &Locator) -> bool {
        if self.locators.contains(locator) {
            return true;
        }
        if !self.link {
            return false;
        }
        match locator {
            Locator::Css(s) => s == "a",
            Locator::LinkText(t) => self.text.trim() == t,
            Locator::PartialLinkText(t) => self.text.contains(t.as_str()),
            Locator::XPath(_) => false,
        }
    }

    /// Own text followed by every descendant's text.
    fn full_text(&self) -> String {
        let mut parts = Vec::new();
        if !self.text.is_empty() {
            parts.push(self.text.clone());
        }
        for child in &self.children {
            let t = child.full_text();
            if !t.is_empty() {
                parts.push(t);
            }
        }
        parts.join(" ")
    }

    fn render(&self, out: &mut String) {
        out.push_str(if self.link { "<a>" } else { "<div>" });
        out.push_str(&self.text);
        for child in &self.children {
            child.render(out);
        }
        out.push_str(if self.link { "</a>" } else { "</div>" });
    }
}

/// A page served for one URL.
#[derive(Debug, Clone)]
pub struct MockPage {
    pub url: String,
    elements: Vec<MockElement>,
    extra_source: String,
}

impl MockPage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            elements: vec![],
            extra_source: String::new(),
        }
    }

    pub fn with_element(mut self, element: MockElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn with_elements(mut self, elements: impl IntoIterator<Item = MockElement>) -> Self {
        self.elements.extend(elements);
        self
    }

    /// Raw markup appended to the rendered source (scripts, hidden text).
    pub fn with_source(mut self, html: impl Into<String>) -> Self {
        self.extra_source.push_str(&html.into());
        self
    }

    fn source(&self) -> String {
        let mut out = String::from("<html><body>");
        for el in &self.elements {
            el.render(&mut out);
        }
        out.push_str(&self.extra_source);
        out.push_str("</body></html>");
        out
    }

    fn resolve(&self, path: &[usize]) -> Option<&MockElement> {
        let (first, rest) = path.split_first()?;
        let mut el = self.elements.get(*first)?;
        for idx in rest {
            el = el.children.get(*idx)?;
        }
        Some(el)
    }
}

fn collect_matches(
    elements: &[MockElement],
    prefix: &[usize],
    locator: &Locator,
    out: &mut Vec<Vec<usize>>,
) {
    for (i, el) in elements.iter().enumerate() {
        let mut path = prefix.to_vec();
        path.push(i);
        if el.matches(locator) {
            out.push(path.clone());
        }
        collect_matches(&el.children, &path, locator, out);
    }
}

/// Driver operations that failures can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOp {
    Navigate,
    FindElements,
    Text,
    Click,
    PageSource,
    CurrentUrl,
    ExecuteScript,
}

#[derive(Debug, Clone)]
struct Injected {
    op: MockOp,
    target: Option<String>,
    error: DriverError,
    remaining: usize,
}

/// Record of a call made to the mock driver.
#[derive(Debug, Clone, PartialEq)]
pub enum MockDriverCall {
    Navigate { url: String },
    FindElements { locator: Locator },
    Click { element: String },
    TypeText { element: String, text: String },
    ExecuteScript { script: String },
    PageSource,
    CloseSecondaryWindows,
    Restart,
}

#[derive(Debug, Default)]
struct BrowserState {
    current: Option<String>,
    generation: u64,
    typed: HashMap<String, String>,
    dead: bool,
    secondary_windows: usize,
}

/// A scripted in-memory browser.
///
/// Clones share state, so a test can keep one handle while the pipeline
/// owns another.
#[derive(Clone, Default)]
pub struct MockDriver {
    /// Pages by URL
    pages: Arc<RwLock<HashMap<String, MockPage>>>,

    /// Scripts that load a page when executed
    scripts: Arc<RwLock<HashMap<String, String>>>,

    /// Pending injected failures
    failures: Arc<RwLock<Vec<Injected>>>,

    state: Arc<RwLock<BrowserState>>,

    /// Call tracking
    calls: Arc<RwLock<Vec<MockDriverCall>>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a page.
    pub fn with_page(self, page: MockPage) -> Self {
        self.set_page(page);
        self
    }

    /// Add several pages.
    pub fn with_pages(self, pages: impl IntoIterator<Item = MockPage>) -> Self {
        for page in pages {
            self.set_page(page);
        }
        self
    }

    /// Make `script` load `url` when executed.
    pub fn with_script(self, script: impl Into<String>, url: impl Into<String>) -> Self {
        self.scripts.write().unwrap().insert(script.into(), url.into());
        self
    }

    /// Start with stray popup windows open.
    pub fn with_secondary_windows(self, count: usize) -> Self {
        self.state.write().unwrap().secondary_windows = count;
        self
    }

    /// Replace or add a page; simulates remote content changing.
    pub fn set_page(&self, page: MockPage) {
        self.pages.write().unwrap().insert(page.url.clone(), page);
    }

    /// Fail the next `times` navigations to `url`.
    ///
    /// A session-dead error also kills the session until `restart`.
    pub fn fail_navigate(&self, url: impl Into<String>, error: DriverError, times: usize) {
        self.inject(MockOp::Navigate, Some(url.into()), error, times);
    }

    /// Fail the next `times` lookups of `locator`.
    pub fn fail_find(&self, locator: &Locator, error: DriverError, times: usize) {
        self.inject(MockOp::FindElements, Some(locator.to_string()), error, times);
    }

    /// Fail the next `times` calls of `op`, whatever the target.
    pub fn fail_op(&self, op: MockOp, error: DriverError, times: usize) {
        self.inject(op, None, error, times);
    }

    /// Kill the session now.
    pub fn kill_session(&self) {
        self.state.write().unwrap().dead = true;
    }

    pub fn is_dead(&self) -> bool {
        self.state.read().unwrap().dead
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockDriverCall> {
        self.calls.read().unwrap().clone()
    }

    /// URLs navigated to, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockDriverCall::Navigate { url } => Some(url),
                _ => None,
            })
            .collect()
    }

    /// How many times `url` was navigated to.
    pub fn navigation_count(&self, url: &str) -> usize {
        self.navigations().iter().filter(|u| *u == url).count()
    }

    pub fn restart_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == MockDriverCall::Restart)
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    fn inject(&self, op: MockOp, target: Option<String>, error: DriverError, times: usize) {
        self.failures.write().unwrap().push(Injected {
            op,
            target,
            error,
            remaining: times,
        });
    }

    fn record(&self, call: MockDriverCall) {
        self.calls.write().unwrap().push(call);
    }

    fn check_alive(&self) -> DriverResult<()> {
        if self.state.read().unwrap().dead {
            return Err(DriverError::SessionDead("invalid session id".into()));
        }
        Ok(())
    }

    fn check_injected(&self, op: MockOp, target: &str) -> DriverResult<()> {
        let mut failures = self.failures.write().unwrap();
        let hit = failures.iter_mut().find(|f| {
            f.op == op && f.remaining > 0 && f.target.as_deref().map_or(true, |t| t == target)
        });
        if let Some(f) = hit {
            f.remaining -= 1;
            if f.error.is_session_dead() {
                self.state.write().unwrap().dead = true;
            }
            return Err(f.error.clone());
        }
        Ok(())
    }

    fn load(&self, url: &str) {
        let mut state = self.state.write().unwrap();
        state.current = Some(url.to_string());
        state.generation += 1;
        state.typed.clear();
    }

    fn current_page(&self) -> Option<MockPage> {
        let url = self.state.read().unwrap().current.clone()?;
        self.pages.read().unwrap().get(&url).cloned()
    }

    fn handle(&self, path: &[usize]) -> ElementHandle {
        let generation = self.state.read().unwrap().generation;
        let path: Vec<String> = path.iter().map(|i| i.to_string()).collect();
        ElementHandle::new(format!("g{}/{}", generation, path.join(".")))
    }

    fn parse_handle(&self, handle: &ElementHandle) -> DriverResult<Vec<usize>> {
        let stale = || DriverError::StaleElement {
            element: handle.id().to_string(),
        };
        let (generation, path) = handle.id().split_once('/').ok_or_else(stale)?;
        let generation: u64 = generation
            .trim_start_matches('g')
            .parse()
            .map_err(|_| stale())?;
        if generation != self.state.read().unwrap().generation {
            return Err(stale());
        }
        path.split('.')
            .map(|p| p.parse().map_err(|_| stale()))
            .collect()
    }

    fn with_element<T>(
        &self,
        handle: &ElementHandle,
        f: impl FnOnce(&MockElement) -> T,
    ) -> DriverResult<T> {
        let path = self.parse_handle(handle)?;
        let page = self.current_page().ok_or_else(|| DriverError::StaleElement {
            element: handle.id().to_string(),
        })?;
        let el = page.resolve(&path).ok_or_else(|| DriverError::StaleElement {
            element: handle.id().to_string(),
        })?;
        Ok(f(el))
    }

    fn matches_on_page(&self, locator: &Locator) -> Vec<Vec<usize>> {
        let mut out = Vec::new();
        if let Some(page) = self.current_page() {
            collect_matches(&page.elements, &[], locator, &mut out);
        }
        out
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        self.record(MockDriverCall::Navigate {
            url: url.to_string(),
        });
        self.check_alive()?;
        self.check_injected(MockOp::Navigate, url)?;
        self.load(url);
        Ok(())
    }

    async fn find_elements(&self, locator: &Locator) -> DriverResult<Vec<ElementHandle>> {
        self.record(MockDriverCall::FindElements {
            locator: locator.clone(),
        });
        self.check_alive()?;
        self.check_injected(MockOp::FindElements, &locator.to_string())?;
        Ok(self
            .matches_on_page(locator)
            .iter()
            .map(|p| self.handle(p))
            .collect())
    }

    async fn find_within(
        &self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> DriverResult<Vec<ElementHandle>> {
        self.check_alive()?;
        let prefix = self.parse_handle(parent)?;
        let paths = self.with_element(parent, |el| {
            let mut out = Vec::new();
            collect_matches(&el.children, &prefix, locator, &mut out);
            out
        })?;
        Ok(paths.iter().map(|p| self.handle(p)).collect())
    }

    async fn text(&self, element: &ElementHandle) -> DriverResult<String> {
        self.check_alive()?;
        self.check_injected(MockOp::Text, element.id())?;
        self.with_element(element, |el| el.full_text())
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>> {
        self.check_alive()?;
        self.with_element(element, |el| el.attributes.get(name).cloned())
    }

    async fn click(&self, element: &ElementHandle) -> DriverResult<()> {
        self.record(MockDriverCall::Click {
            element: element.id().to_string(),
        });
        self.check_alive()?;
        self.check_injected(MockOp::Click, element.id())?;
        let action = self.with_element(element, |el| el.on_click.clone())?;

        match action {
            Some(ClickAction::Navigate(url)) => self.load(&url),
            Some(ClickAction::Check {
                field,
                expected,
                success,
                failure,
            }) => {
                let typed = self
                    .matches_on_page(&field)
                    .first()
                    .map(|p| self.handle(p))
                    .and_then(|h| self.state.read().unwrap().typed.get(h.id()).cloned());
                let target = if typed.as_deref() == Some(expected.as_str()) {
                    success
                } else {
                    failure
                };
                self.load(&target);
            }
            Some(ClickAction::OpenWindow) => {
                self.state.write().unwrap().secondary_windows += 1;
            }
            None => {}
        }
        Ok(())
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        self.record(MockDriverCall::TypeText {
            element: element.id().to_string(),
            text: text.to_string(),
        });
        self.check_alive()?;
        self.with_element(element, |_| ())?;
        self.state
            .write()
            .unwrap()
            .typed
            .insert(element.id().to_string(), text.to_string());
        Ok(())
    }

    async fn wait_for(&self, locator: &Locator, _timeout: Duration) -> DriverResult<bool> {
        self.check_alive()?;
        Ok(!self.matches_on_page(locator).is_empty())
    }

    async fn current_url(&self) -> DriverResult<String> {
        self.check_alive()?;
        self.check_injected(MockOp::CurrentUrl, "")?;
        Ok(self
            .state
            .read()
            .unwrap()
            .current
            .clone()
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn page_source(&self) -> DriverResult<String> {
        self.record(MockDriverCall::PageSource);
        self.check_alive()?;
        self.check_injected(MockOp::PageSource, "")?;
        Ok(self
            .current_page()
            .map(|p| p.source())
            .unwrap_or_else(|| "<html></html>".to_string()))
    }

    async fn execute_script(&self, script: &str) -> DriverResult<()> {
        self.record(MockDriverCall::ExecuteScript {
            script: script.to_string(),
        });
        self.check_alive()?;
        self.check_injected(MockOp::ExecuteScript, script)?;
        let target = self.scripts.read().unwrap().get(script).cloned();
        match target {
            Some(url) => {
                self.load(&url);
                Ok(())
            }
            None => Err(DriverError::Script(format!("{} is not defined", script))),
        }
    }

    async fn close_secondary_windows(&self) -> DriverResult<usize> {
        self.record(MockDriverCall::CloseSecondaryWindows);
        self.check_alive()?;
        let mut state = self.state.write().unwrap();
        Ok(std::mem::take(&mut state.secondary_windows))
    }

    async fn restart(&self) -> DriverResult<()> {
        self.record(MockDriverCall::Restart);
        let mut state = self.state.write().unwrap();
        let generation = state.generation + 1;
        *state = BrowserState {
            generation,
            ..Default::default()
        };
        Ok(())
    }
}

// ============================================================================
// Portal page builders
// ============================================================================

/// URL of the page shown after a successful login.
pub fn home_url(portal: &PortalConfig) -> String {
    format!("{}/home", portal.base_url)
}

/// Login form, optional second-factor page, error page and home page.
pub fn login_pages(portal: &PortalConfig, password: &str, code: Option<&str>) -> Vec<MockPage> {
    let login = &portal.login;
    let login_url = portal.login_url();
    let error_url = format!("{}?error=1", login_url);
    let second_url = format!("{}/verify", login_url);
    let home = home_url(portal);

    let after_password = match (code, &login.second_factor) {
        (Some(_), Some(_)) => second_url.clone(),
        _ => home.clone(),
    };

    let form = |url: &str, with_error: bool| {
        let mut page = MockPage::new(url)
            .with_element(MockElement::new(login.username.clone()))
            .with_element(MockElement::new(login.password.clone()))
            .with_element(MockElement::new(login.submit.clone()).with_text("Log In").on_click(
                ClickAction::Check {
                    field: login.password.clone(),
                    expected: password.to_string(),
                    success: after_password.clone(),
                    failure: error_url.clone(),
                },
            ));
        if with_error {
            if let Some(marker) = &login.error_marker {
                page = page.with_element(
                    MockElement::new(marker.clone()).with_text("Invalid user ID or password"),
                );
            }
        }
        page
    };

    let mut pages = vec![form(&login_url, false), form(&error_url, true), home_page(portal)];

    if let (Some(code), Some(sf)) = (code, &login.second_factor) {
        pages.push(
            MockPage::new(&second_url)
                .with_element(MockElement::new(sf.input.clone()))
                .with_element(MockElement::new(sf.submit.clone()).with_text("Verify").on_click(
                    ClickAction::Check {
                        field: sf.input.clone(),
                        expected: code.to_string(),
                        success: home.clone(),
                        failure: error_url.clone(),
                    },
                )),
        );
    }
    pages
}

/// Landing page with the logged-in marker.
pub fn home_page(portal: &PortalConfig) -> MockPage {
    MockPage::new(home_url(portal))
        .with_element(MockElement::new(portal.login.logged_in_marker.clone()).with_text("Log Out"))
        .with_element(MockElement::new(Locator::css("h1")).with_text("Editor Center"))
}

/// Listing whose rows carry a detail anchor.
pub fn listing_page(portal: &PortalConfig, category: &str, ids: &[&str]) -> MockPage {
    let l = &portal.listing;
    let rows = ids.iter().map(|id| {
        MockElement::new(l.row.clone())
            .with_text(format!("{} Manuscript title for {}", id, id))
            .with_child(
                MockElement::new(l.detail_anchor.clone())
                    .with_attribute("href", portal.detail_url(id))
                    .on_click(ClickAction::Navigate(portal.detail_url(id))),
            )
    });
    MockPage::new(portal.listing_url(category))
        .with_element(MockElement::new(Locator::css("h2")).with_text(category))
        .with_elements(rows)
}

/// Listing without detail anchors; ids only appear as link text.
pub fn listing_page_links_only(portal: &PortalConfig, category: &str, ids: &[&str]) -> MockPage {
    let links = ids
        .iter()
        .map(|id| MockElement::link(*id, portal.detail_url(id)));
    MockPage::new(portal.listing_url(category))
        .with_element(MockElement::link("Help", format!("{}/help", portal.base_url)))
        .with_elements(links)
}

/// One person row on a detail page.
#[derive(Debug, Clone, Default)]
pub struct PersonFixture {
    pub name: String,
    pub email: Option<String>,
    pub affiliation: Option<String>,
    pub status: Option<String>,
    pub dates: Option<String>,
}

impl PersonFixture {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn affiliation(mut self, affiliation: impl Into<String>) -> Self {
        self.affiliation = Some(affiliation.into());
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn dates(mut self, dates: impl Into<String>) -> Self {
        self.dates = Some(dates.into());
        self
    }

    fn row(&self, selectors: &RowSelectors) -> MockElement {
        let mut row = MockElement::new(selectors.row.clone())
            .with_child(MockElement::new(selectors.name.clone()).with_text(&self.name));
        let optional = [
            (&selectors.affiliation, &self.affiliation),
            (&selectors.status, &self.status),
            (&selectors.dates, &self.dates),
        ];
        for (locator, value) in optional {
            if let (Some(locator), Some(value)) = (locator, value) {
                row = row.with_child(MockElement::new(locator.clone()).with_text(value));
            }
        }
        if let (Some(locator), Some(email)) = (&selectors.email_link, &self.email) {
            row = row.with_child(
                MockElement::new(locator.clone())
                    .with_text("email")
                    .with_attribute("href", format!("mailto:{}", email)),
            );
        }
        row
    }
}

/// Everything shown on one manuscript's detail and history pages.
#[derive(Debug, Clone, Default)]
pub struct ManuscriptFixture {
    pub id: String,
    pub title: String,
    pub metadata: Vec<(String, String)>,
    pub referees: Vec<PersonFixture>,
    pub authors: Vec<PersonFixture>,
    pub editors: Vec<PersonFixture>,
    /// Label and href; `None` renders an anchor without href
    pub documents: Vec<(String, Option<String>)>,
    pub versions: Vec<String>,
    /// Free text shown on the detail page
    pub notes: Vec<String>,
    /// Event rows per history page
    pub history: Vec<Vec<String>>,
}

impl ManuscriptFixture {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn metadata(mut self, label: &str, value: &str) -> Self {
        self.metadata.push((label.to_string(), value.to_string()));
        self
    }

    pub fn referee(mut self, person: PersonFixture) -> Self {
        self.referees.push(person);
        self
    }

    pub fn author(mut self, person: PersonFixture) -> Self {
        self.authors.push(person);
        self
    }

    pub fn editor(mut self, person: PersonFixture) -> Self {
        self.editors.push(person);
        self
    }

    pub fn document(mut self, label: &str, href: Option<&str>) -> Self {
        self.documents
            .push((label.to_string(), href.map(|h| h.to_string())));
        self
    }

    pub fn version(mut self, row: &str) -> Self {
        self.versions.push(row.to_string());
        self
    }

    pub fn note(mut self, text: &str) -> Self {
        self.notes.push(text.to_string());
        self
    }

    pub fn history_page(mut self, events: &[&str]) -> Self {
        self.history
            .push(events.iter().map(|e| e.to_string()).collect());
        self
    }
}

/// Detail page for a manuscript.
pub fn detail_page(portal: &PortalConfig, m: &ManuscriptFixture) -> MockPage {
    let d = &portal.detail;
    let mut page = MockPage::new(portal.detail_url(&m.id))
        .with_element(MockElement::new(d.title.clone()).with_text(&m.title));

    if let Some(marker) = &d.ready_marker {
        page = page.with_element(MockElement::new(marker.clone()));
    }

    page = page.with_elements(
        m.metadata
            .iter()
            .map(|(k, v)| MockElement::new(d.metadata_row.clone()).with_text(format!("{}: {}", k, v))),
    );
    page = page.with_elements(m.referees.iter().map(|p| p.row(&d.referees)));
    page = page.with_elements(m.authors.iter().map(|p| p.row(&d.authors)));
    page = page.with_elements(m.editors.iter().map(|p| p.row(&d.editors)));
    page = page.with_elements(m.documents.iter().map(|(label, href)| {
        let el = MockElement::new(d.document_link.clone()).with_text(label);
        match href {
            Some(href) => el.with_attribute("href", href),
            None => el,
        }
    }));
    page = page.with_elements(
        m.versions
            .iter()
            .map(|v| MockElement::new(d.version_row.clone()).with_text(v)),
    );
    page.with_elements(
        m.notes
            .iter()
            .map(|n| MockElement::new(Locator::css("div.note")).with_text(n)),
    )
}

/// URL of history page `page` (1-based).
pub fn history_page_url(portal: &PortalConfig, id: &str, page: usize) -> String {
    let first = portal.history_url(id);
    if page <= 1 {
        first
    } else {
        format!("{}?page={}", first, page)
    }
}

/// Paginated history; every page but the last links to the next with an arrow.
pub fn history_pages(portal: &PortalConfig, id: &str, pages: &[Vec<String>]) -> Vec<MockPage> {
    let h = &portal.history;
    pages
        .iter()
        .enumerate()
        .map(|(i, events)| {
            let n = i + 1;
            let mut page = MockPage::new(history_page_url(portal, id, n))
                .with_element(
                    MockElement::new(Locator::css("span.page-indicator"))
                        .with_text(format!("Page {} of {}", n, pages.len())),
                )
                .with_elements(
                    events
                        .iter()
                        .map(|e| MockElement::new(h.event_row.clone()).with_text(e)),
                );
            if n < pages.len() {
                if let Some(arrow) = &h.next_arrow {
                    page = page.with_element(
                        MockElement::new(arrow.clone())
                            .with_text("›")
                            .on_click(ClickAction::Navigate(history_page_url(portal, id, n + 1))),
                    );
                }
            }
            page
        })
        .collect()
}

/// Detail page plus history pages.
pub fn manuscript_pages(portal: &PortalConfig, m: &ManuscriptFixture) -> Vec<MockPage> {
    let mut pages = vec![detail_page(portal, m)];
    let history = if m.history.is_empty() {
        vec![vec![]]
    } else {
        m.history.clone()
    };
    pages.extend(history_pages(portal, &m.id, &history));
    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_driver_navigation_and_text() {
        let driver = MockDriver::new().with_page(
            MockPage::new("https://portal/a")
                .with_element(
                    MockElement::new(Locator::css("tr.row"))
                        .with_text("MF-2024-0001")
                        .with_child(MockElement::new(Locator::css("td.name")).with_text("Smith, John")),
                )
                .with_element(MockElement::link("Next", "https://portal/b")),
        );

        driver.navigate("https://portal/a").await.unwrap();
        let rows = driver.find_elements(&Locator::css("tr.row")).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(driver.text(&rows[0]).await.unwrap(), "MF-2024-0001 Smith, John");

        let name = driver
            .find_first_within(&rows[0], &Locator::css("td.name"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(driver.text(&name).await.unwrap(), "Smith, John");

        let next = driver
            .find_first(&Locator::partial_link_text("Next"))
            .await
            .unwrap()
            .unwrap();
        driver.click(&next).await.unwrap();
        assert_eq!(driver.current_url().await.unwrap(), "https://portal/b");

        // Handles from the previous page are stale now
        assert!(matches!(
            driver.text(&rows[0]).await,
            Err(DriverError::StaleElement { .. })
        ));
    }

    #[tokio::test]
    async fn test_mock_driver_injected_session_death() {
        let driver = MockDriver::new().with_page(MockPage::new("https://portal/a"));
        driver.fail_navigate(
            "https://portal/a",
            DriverError::SessionDead("chrome not reachable".into()),
            1,
        );

        assert!(driver.navigate("https://portal/a").await.is_err());
        assert!(driver.is_dead());
        assert!(driver.current_url().await.is_err());

        driver.restart().await.unwrap();
        driver.navigate("https://portal/a").await.unwrap();
        assert_eq!(driver.restart_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_driver_scripts() {
        let driver = MockDriver::new()
            .with_page(MockPage::new("https://portal/p2"))
            .with_script("goToPage(2)", "https://portal/p2");

        driver.execute_script("goToPage(2)").await.unwrap();
        assert_eq!(driver.current_url().await.unwrap(), "https://portal/p2");
        assert!(matches!(
            driver.execute_script("goToPage(3)").await,
            Err(DriverError::Script(_))
        ));
    }
}
