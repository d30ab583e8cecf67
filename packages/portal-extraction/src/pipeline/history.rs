//! Paginated audit-trail reader.
//!
//! No single pagination control is present on every history page, so the
//! reader tries several in order and only trusts one that actually changes
//! the page. It stops after `max_pages` or once several pages in a row
//! contributed nothing new, which also catches portals that loop back.

use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::error::{DriverError, ExtractionError, Result};
use crate::traits::driver::{empty_unless_dead, Driver};
use crate::types::audit::{sort_newest_first, AuditEvent, EventKey};
use crate::types::config::{HistoryConfig, HistorySelectors};
use crate::types::dates::{parse_date, parse_time};
use crate::types::snapshot::ContentFingerprint;

const TIME: &str = r"\d{1,2}:\d{2}(?::\d{2})?(?:\s?[AaPp][Mm])?";

/// One layout of event text: a date, an optional time, then a description.
#[derive(Debug, Clone)]
pub struct EventPattern {
    pub name: &'static str,
    regex: Regex,
}

impl EventPattern {
    /// `regex` must define the named groups `date` and `text`; `time` is optional.
    pub fn new(name: &'static str, regex: &str) -> Result<Self> {
        let regex = Regex::new(regex).map_err(|e| ExtractionError::Config {
            reason: format!("event pattern {}: {}", name, e),
        })?;
        Ok(Self { name, regex })
    }

    fn layout(name: &'static str, date: &str) -> Self {
        let regex = format!(
            r"^\s*(?P<date>{})(?:,?\s+(?P<time>{}))?\s*[-:|]?\s*(?P<text>.+?)\s*$",
            date, TIME
        );
        // The layouts are fixed literals.
        Self {
            name,
            regex: Regex::new(&regex).unwrap(),
        }
    }
}

/// Layouts seen on the supported portals, tried in order.
pub fn default_patterns() -> Vec<EventPattern> {
    vec![
        EventPattern::layout("dd-mon-yyyy", r"\d{1,2}-[A-Za-z]{3}-\d{4}"),
        EventPattern::layout("iso", r"\d{4}-\d{2}-\d{2}"),
        EventPattern::layout("us", r"\d{1,2}/\d{1,2}/\d{4}"),
        EventPattern::layout("month-day-year", r"[A-Za-z]{3,9}\.?\s\d{1,2},\s*\d{4}"),
    ]
}

/// Why reading stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Hit the page cap
    MaxPages,
    /// Too many pages in a row without new events
    Converged,
    /// No pagination strategy changed the page
    NoMorePages,
}

/// Events read from a whole audit trail.
#[derive(Debug, Clone)]
pub struct HistoryOutcome {
    /// Deduplicated, newest first
    pub events: Vec<AuditEvent>,
    pub pages_visited: usize,
    pub termination: Termination,
}

/// Parses and filters event text, remembering every key it accepted.
#[derive(Debug)]
pub struct EventFilter<'a> {
    patterns: Vec<EventPattern>,
    config: &'a HistoryConfig,
    formats: &'a [String],
    seen: HashSet<EventKey>,
}

impl<'a> EventFilter<'a> {
    pub fn new(config: &'a HistoryConfig, formats: &'a [String]) -> Self {
        Self {
            patterns: default_patterns(),
            config,
            formats,
            seen: HashSet::new(),
        }
    }

    pub fn with_patterns(mut self, patterns: Vec<EventPattern>) -> Self {
        self.patterns = patterns;
        self
    }

    /// Parse `text` with the first matching layout.
    pub fn parse(&self, text: &str) -> Option<AuditEvent> {
        self.patterns.iter().find_map(|p| {
            let caps = p.regex.captures(text)?;
            let date = parse_date(caps.name("date")?.as_str(), self.formats)?;
            let time = caps.name("time").and_then(|t| parse_time(t.as_str()));
            let body = caps.name("text")?.as_str();
            Some(AuditEvent::new(date, time, body))
        })
    }

    /// Length bounds and script-residue denylist.
    pub fn is_plausible(&self, event: &AuditEvent) -> bool {
        let len = event.raw_text.chars().count();
        if len < self.config.min_event_len || len > self.config.max_event_len {
            return false;
        }
        let lower = event.raw_text.to_lowercase();
        !self
            .config
            .denylist
            .iter()
            .any(|token| lower.contains(&token.to_lowercase()))
    }

    /// Accept an event if it parses, is plausible and has not been seen.
    pub fn accept(&mut self, text: &str) -> Option<AuditEvent> {
        let event = self.parse(text)?;
        if !self.is_plausible(&event) {
            return None;
        }
        self.seen.insert(event.key()).then_some(event)
    }
}

/// Walks the paginated audit trail of one entity.
///
/// Consumed by [`read_all`](Self::read_all); a reader cannot resume a
/// partially read trail.
pub struct PaginatedHistoryReader<'a> {
    driver: &'a dyn Driver,
    selectors: &'a HistorySelectors,
    config: &'a HistoryConfig,
    filter: EventFilter<'a>,
}

impl<'a> PaginatedHistoryReader<'a> {
    pub fn new(
        driver: &'a dyn Driver,
        selectors: &'a HistorySelectors,
        config: &'a HistoryConfig,
        date_formats: &'a [String],
    ) -> Self {
        Self {
            driver,
            selectors,
            config,
            filter: EventFilter::new(config, date_formats),
        }
    }

    pub fn with_patterns(mut self, patterns: Vec<EventPattern>) -> Self {
        self.filter = self.filter.with_patterns(patterns);
        self
    }

    /// Read every page starting at `start_url`.
    pub async fn read_all(mut self, start_url: &str) -> Result<HistoryOutcome> {
        self.driver.navigate(start_url).await?;

        let mut events = Vec::new();
        let mut pages_visited = 0;
        let mut consecutive_empty = 0;

        let termination = loop {
            pages_visited += 1;
            let new_events = self.read_page().await?;
            debug!(
                page = pages_visited,
                new = new_events.len(),
                consecutive_empty,
                "History page read"
            );

            if new_events.is_empty() {
                consecutive_empty += 1;
            } else {
                consecutive_empty = 0;
                events.extend(new_events);
            }

            if consecutive_empty >= self.config.max_consecutive_empty.max(1) {
                break Termination::Converged;
            }
            if pages_visited >= self.config.max_pages {
                break Termination::MaxPages;
            }
            if !self.advance(pages_visited + 1).await? {
                break Termination::NoMorePages;
            }
        };

        sort_newest_first(&mut events);
        info!(
            events = events.len(),
            pages = pages_visited,
            ?termination,
            "History read"
        );
        Ok(HistoryOutcome {
            events,
            pages_visited,
            termination,
        })
    }

    async fn read_page(&mut self) -> Result<Vec<AuditEvent>> {
        let rows = empty_unless_dead(self.driver.find_elements(&self.selectors.event_row).await)?;
        let mut accepted = Vec::new();
        for row in rows {
            let text = empty_unless_dead(self.driver.text(&row).await)?;
            if let Some(event) = self.filter.accept(&text) {
                accepted.push(event);
            }
        }
        Ok(accepted)
    }

    /// Move to page `next`. Returns whether any strategy changed the page.
    async fn advance(&self, next: usize) -> Result<bool> {
        let before = self.page_hash().await?;
        let s = self.selectors;

        let clickable = [
            ("next-arrow", s.next_arrow.clone()),
            ("page-number", s.page_number.as_ref().map(|l| l.with_page(next))),
            ("next-control", s.next_control.clone()),
        ];
        for (strategy, locator) in clickable {
            let Some(locator) = locator else { continue };
            let attempt = match self.driver.find_first(&locator).await {
                Ok(Some(el)) => self.driver.click(&el).await.map(|_| true),
                Ok(None) => Ok(false),
                Err(e) => Err(e),
            };
            if self.changed(strategy, attempt, &before).await? {
                return Ok(true);
            }
        }

        if let Some(script) = &s.jump_script {
            let script = script.replace("{page}", &next.to_string());
            let attempt = self.driver.execute_script(&script).await.map(|_| true);
            if self.changed("jump-script", attempt, &before).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether a strategy's attempt moved to a different page.
    async fn changed(
        &self,
        strategy: &str,
        attempt: std::result::Result<bool, DriverError>,
        before: &ContentFingerprint,
    ) -> Result<bool> {
        match attempt {
            Ok(false) => Ok(false),
            Ok(true) => {
                let changed = &self.page_hash().await? != before;
                if changed {
                    debug!(strategy, "Advanced to next history page");
                }
                Ok(changed)
            }
            Err(e) if e.is_session_dead() => Err(e.into()),
            Err(e) => {
                debug!(strategy, error = %e, "Pagination strategy failed");
                Ok(false)
            }
        }
    }

    async fn page_hash(&self) -> Result<ContentFingerprint> {
        let source = self.driver.page_source().await?;
        Ok(ContentFingerprint::of_text(&source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{history_page_url, history_pages, MockDriver, MockElement, MockPage};
    use crate::types::audit::EventType;
    use crate::types::config::PortalConfig;
    use chrono::{NaiveDate, NaiveTime};
    use proptest::prelude::*;

    const ID: &str = "MF-2024-0101";

    fn portal() -> PortalConfig {
        PortalConfig::new("MF", "https://mc.example.org/mf")
    }

    fn page_events(page: usize) -> Vec<String> {
        (0..3)
            .map(|i| {
                format!(
                    "{:02}-Mar-2024 1{}:00 Reminder sent to referee {} for page {}",
                    page, i, i, page
                )
            })
            .collect()
    }

    async fn read(
        driver: &MockDriver,
        portal: &PortalConfig,
        config: &HistoryConfig,
    ) -> HistoryOutcome {
        PaginatedHistoryReader::new(driver, &portal.history, config, &portal.date_formats)
            .read_all(&portal.history_url(ID))
            .await
            .unwrap()
    }

    #[test]
    fn test_parse_layouts() {
        let config = HistoryConfig::default();
        let portal = portal();
        let filter = EventFilter::new(&config, &portal.date_formats);

        let ev = filter
            .parse("03-Jan-2024 14:05 Reviewer invited: Smith, John")
            .unwrap();
        assert_eq!(ev.date, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        assert_eq!(ev.time, NaiveTime::from_hms_opt(14, 5, 0));
        assert_eq!(ev.raw_text, "Reviewer invited: Smith, John");
        assert_eq!(ev.event_type, EventType::ReviewerInvited);

        let ev = filter.parse("2024-02-10 - Decision letter sent").unwrap();
        assert_eq!(ev.date, NaiveDate::from_ymd_opt(2024, 2, 10).unwrap());
        assert_eq!(ev.time, None);

        let ev = filter.parse("02/10/2024 9:30 AM Review received from Lee").unwrap();
        assert_eq!(ev.time, NaiveTime::from_hms_opt(9, 30, 0));

        let ev = filter.parse("March 5, 2024: Manuscript submitted").unwrap();
        assert_eq!(ev.date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());

        assert!(filter.parse("Page 1 of 3").is_none());
    }

    #[test]
    fn test_filter_rejects_script_residue_short_text_and_repeats() {
        let config = HistoryConfig::default();
        let portal = portal();
        let mut filter = EventFilter::new(&config, &portal.date_formats);

        assert!(filter
            .accept("03-Jan-2024 function(){ document.forms[0].submit() }")
            .is_none());
        assert!(filter.accept("03-Jan-2024 ok").is_none());
        assert!(filter
            .accept("03-Jan-2024 Reminder sent to John Smith")
            .is_some());
        assert!(filter
            .accept("03-Jan-2024 Reminder sent to John Smith")
            .is_none());
    }

    #[tokio::test]
    async fn test_stops_after_repeated_pages() {
        let portal = portal();
        // Pages 6..10 repeat page 5, as portals do when the pager loops.
        let mut pages: Vec<Vec<String>> = (1..=5).map(page_events).collect();
        for _ in 6..=10 {
            pages.push(page_events(5));
        }
        let driver = MockDriver::new().with_pages(history_pages(&portal, ID, &pages));

        let outcome = read(&driver, &portal, &HistoryConfig::default()).await;

        assert_eq!(outcome.events.len(), 15);
        assert_eq!(outcome.termination, Termination::Converged);
        assert_eq!(outcome.pages_visited, 5 + 3);

        let keys: HashSet<_> = outcome.events.iter().map(|e| e.key()).collect();
        assert_eq!(keys.len(), outcome.events.len());
        assert!(outcome
            .events
            .windows(2)
            .all(|w| (w[0].date, w[0].time) >= (w[1].date, w[1].time)));
    }

    #[tokio::test]
    async fn test_last_page_without_controls() {
        let portal = portal();
        let pages: Vec<Vec<String>> = (1..=2).map(page_events).collect();
        let driver = MockDriver::new().with_pages(history_pages(&portal, ID, &pages));

        let outcome = read(&driver, &portal, &HistoryConfig::default()).await;
        assert_eq!(outcome.pages_visited, 2);
        assert_eq!(outcome.events.len(), 6);
        assert_eq!(outcome.termination, Termination::NoMorePages);
    }

    #[tokio::test]
    async fn test_max_pages() {
        let portal = portal();
        let pages: Vec<Vec<String>> = (1..=6).map(page_events).collect();
        let driver = MockDriver::new().with_pages(history_pages(&portal, ID, &pages));

        let config = HistoryConfig::default().with_max_pages(4);
        let outcome = read(&driver, &portal, &config).await;
        assert_eq!(outcome.pages_visited, 4);
        assert_eq!(outcome.events.len(), 12);
        assert_eq!(outcome.termination, Termination::MaxPages);
    }

    #[tokio::test]
    async fn test_page_number_and_script_strategies() {
        let portal = portal();
        let page = |n: usize| {
            MockPage::new(history_page_url(&portal, ID, n)).with_elements(
                page_events(n)
                    .into_iter()
                    .map(|e| MockElement::new(portal.history.event_row.clone()).with_text(e)),
            )
        };
        // Page 1 links to page 2 by number; page 2 only has a script pager.
        let driver = MockDriver::new()
            .with_page(page(1).with_element(MockElement::link("2", history_page_url(&portal, ID, 2))))
            .with_page(page(2))
            .with_page(page(3))
            .with_script("goToPage(3)", history_page_url(&portal, ID, 3));

        let outcome = read(&driver, &portal, &HistoryConfig::default()).await;
        assert_eq!(outcome.pages_visited, 3);
        assert_eq!(outcome.events.len(), 9);
    }

    #[tokio::test]
    async fn test_next_control_that_does_not_change_page_is_ignored() {
        let portal = portal();
        let driver = MockDriver::new().with_page(
            MockPage::new(history_page_url(&portal, ID, 1))
                .with_elements(
                    page_events(1)
                        .into_iter()
                        .map(|e| MockElement::new(portal.history.event_row.clone()).with_text(e)),
                )
                .with_element(MockElement::dead_link("Next page")),
        );

        let outcome = read(&driver, &portal, &HistoryConfig::default()).await;
        assert_eq!(outcome.pages_visited, 1);
        assert_eq!(outcome.termination, Termination::NoMorePages);
    }

    #[tokio::test]
    async fn test_session_death_propagates() {
        let portal = portal();
        let pages: Vec<Vec<String>> = (1..=3).map(page_events).collect();
        let driver = MockDriver::new().with_pages(history_pages(&portal, ID, &pages));
        driver.fail_navigate(
            portal.history_url(ID),
            DriverError::SessionDead("chrome not reachable".into()),
            1,
        );

        let err = PaginatedHistoryReader::new(
            &driver,
            &portal.history,
            &HistoryConfig::default(),
            &portal.date_formats,
        )
        .read_all(&portal.history_url(ID))
        .await
        .unwrap_err();
        assert!(err.is_session_fatal());
    }

    proptest! {
        #[test]
        fn prop_accepted_events_have_unique_keys(
            rows in prop::collection::vec((1u32..28, 0u32..3, "[a-z ]{12,40}"), 0..60)
        ) {
            let config = HistoryConfig::default();
            let formats = portal().date_formats;
            let mut filter = EventFilter::new(&config, &formats);
            let mut keys = HashSet::new();

            for (day, hour, text) in rows {
                let line = format!("{:02}-Jan-2024 1{}:00 Note {}", day, hour, text);
                if let Some(event) = filter.accept(&line) {
                    prop_assert!(keys.insert(event.key()));
                }
            }
        }
    }
}
