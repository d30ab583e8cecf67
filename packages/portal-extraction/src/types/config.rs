//! Configuration types for portals, retries, and the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ExtractionError, Result};
use crate::traits::driver::Locator;

/// Serialise `Duration` as whole milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Longest single backoff sleep, whatever the policy says.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(600);

/// Retry budget for one kind of operation.
///
/// Pure configuration; the executor keeps no state between calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always at least 1.
    pub max_attempts: u32,

    /// Delay after the first failed attempt.
    #[serde(with = "duration_ms")]
    pub base_delay: Duration,

    /// Growth factor applied per attempt.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::navigation()
    }
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` is clamped to at least 1.
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff_multiplier,
        }
    }

    /// Login: 3 attempts, 2s base delay.
    pub fn login() -> Self {
        Self::new(3, Duration::from_secs(2), 2.0)
    }

    /// Single-page parse: 2 attempts, 1s base delay.
    pub fn page_parse() -> Self {
        Self::new(2, Duration::from_secs(1), 2.0)
    }

    /// Navigation: 3 attempts, 1s base delay.
    pub fn navigation() -> Self {
        Self::new(3, Duration::from_secs(1), 2.0)
    }

    /// No retries at all.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    /// Sleep after failed attempt `attempt` (0-based): `base * multiplier^attempt`,
    /// capped at [`MAX_RETRY_DELAY`].
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.max(0.0).powi(exponent);
        Duration::try_from_secs_f64(self.base_delay.as_secs_f64() * factor)
            .unwrap_or(MAX_RETRY_DELAY)
            .min(MAX_RETRY_DELAY)
    }

    /// Total sleep spent when every attempt fails.
    pub fn total_backoff(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|a| self.delay_for(a))
            .sum()
    }
}

/// Selectors for one table of people (referees, authors, editors).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowSelectors {
    /// One element per person
    pub row: Locator,

    /// Name cell within the row
    pub name: Locator,

    /// `mailto:` link within the row
    #[serde(default)]
    pub email_link: Option<Locator>,

    /// Affiliation cell within the row
    #[serde(default)]
    pub affiliation: Option<Locator>,

    /// Status cell within the row
    #[serde(default)]
    pub status: Option<Locator>,

    /// Cell holding labelled dates ("Invited: 03-Jan-2024")
    #[serde(default)]
    pub dates: Option<Locator>,
}

impl RowSelectors {
    /// Rows matching `row`, names in `name`, everything else unset.
    pub fn new(row: Locator, name: Locator) -> Self {
        Self {
            row,
            name,
            email_link: None,
            affiliation: None,
            status: None,
            dates: None,
        }
    }

    pub fn with_email_link(mut self, locator: Locator) -> Self {
        self.email_link = Some(locator);
        self
    }

    pub fn with_affiliation(mut self, locator: Locator) -> Self {
        self.affiliation = Some(locator);
        self
    }

    pub fn with_status(mut self, locator: Locator) -> Self {
        self.status = Some(locator);
        self
    }

    pub fn with_dates(mut self, locator: Locator) -> Self {
        self.dates = Some(locator);
        self
    }
}

/// Second-factor challenge selectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecondFactorSelectors {
    /// Code input field; its presence after submit means a code is required
    pub input: Locator,

    /// Button that submits the code
    pub submit: Locator,

    /// Channel name passed to the code provider (e.g. "email")
    pub channel: String,

    /// How long to wait for a code to arrive
    #[serde(with = "duration_ms")]
    pub max_wait: Duration,
}

/// Selectors and URL for the login flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginSelectors {
    /// Login entry point, `{base}` is substituted
    pub url_template: String,
    pub username: Locator,
    pub password: Locator,
    pub submit: Locator,

    /// Present only when logged in
    pub logged_in_marker: Locator,

    /// Present when the portal rejected the credentials
    #[serde(default)]
    pub error_marker: Option<Locator>,

    #[serde(default)]
    pub second_factor: Option<SecondFactorSelectors>,

    /// Timeout for each wait in the login flow
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
}

impl Default for LoginSelectors {
    fn default() -> Self {
        Self {
            url_template: "{base}/login".to_string(),
            username: Locator::css("input#USERID"),
            password: Locator::css("input#PASSWORD"),
            submit: Locator::css("#logInButton"),
            logged_in_marker: Locator::link_text("Log Out"),
            error_marker: Some(Locator::css(".login-error")),
            second_factor: None,
            timeout: Duration::from_secs(15),
        }
    }
}

/// Selectors for a category listing page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingSelectors {
    /// Listing URL, `{base}` and `{category}` are substituted
    pub url_template: String,

    /// One element per listed entity
    pub row: Locator,

    /// Per-row action anchor ("open detail" icon)
    pub detail_anchor: Locator,

    /// Any link, for the fallback strategy
    pub link: Locator,

    /// Regex matching an entity id inside row or link text
    pub id_pattern: String,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            url_template: "{base}/queue/{category}".to_string(),
            row: Locator::css("table.listing tr"),
            detail_anchor: Locator::css("a.open-detail"),
            link: Locator::css("a"),
            id_pattern: r"[A-Z]{2,}-\d{4}-\d{3,5}(?:\.R\d+)?".to_string(),
        }
    }
}

/// Selectors for an entity detail page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailSelectors {
    /// Detail URL, `{base}` and `{id}` are substituted
    pub url_template: String,

    /// Present once the detail page finished rendering
    #[serde(default)]
    pub ready_marker: Option<Locator>,

    pub title: Locator,

    /// "Label: value" rows of manuscript metadata
    pub metadata_row: Locator,

    pub referees: RowSelectors,
    pub authors: RowSelectors,
    pub editors: RowSelectors,

    /// Links to attached files
    pub document_link: Locator,

    /// One element per earlier version
    pub version_row: Locator,
}

impl Default for DetailSelectors {
    fn default() -> Self {
        Self {
            url_template: "{base}/manuscript/{id}".to_string(),
            ready_marker: None,
            title: Locator::css("h1.manuscript-title"),
            metadata_row: Locator::css("table.metadata tr"),
            referees: RowSelectors::new(
                Locator::css("table.referees tr.referee"),
                Locator::css("td.name"),
            )
            .with_email_link(Locator::css("a[href^='mailto:']"))
            .with_affiliation(Locator::css("td.affiliation"))
            .with_status(Locator::css("td.status"))
            .with_dates(Locator::css("td.dates")),
            authors: RowSelectors::new(
                Locator::css("table.authors tr.author"),
                Locator::css("td.name"),
            )
            .with_email_link(Locator::css("a[href^='mailto:']"))
            .with_affiliation(Locator::css("td.affiliation")),
            editors: RowSelectors::new(
                Locator::css("table.editors tr.editor"),
                Locator::css("td.name"),
            )
            .with_email_link(Locator::css("a[href^='mailto:']"))
            .with_status(Locator::css("td.role")),
            document_link: Locator::css("div.files a"),
            version_row: Locator::css("table.versions tr.version"),
        }
    }
}

/// Selectors and strategies for the paginated audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySelectors {
    /// History URL, `{base}` and `{id}` are substituted
    pub url_template: String,

    /// Rows or containers holding one event each
    pub event_row: Locator,

    /// Next-arrow link
    #[serde(default)]
    pub next_arrow: Option<Locator>,

    /// Explicit page-number link, `{page}` is substituted
    #[serde(default)]
    pub page_number: Option<Locator>,

    /// Generic "Next" control
    #[serde(default)]
    pub next_control: Option<Locator>,

    /// Script jumping to a page, `{page}` is substituted
    #[serde(default)]
    pub jump_script: Option<String>,
}

impl Default for HistorySelectors {
    fn default() -> Self {
        Self {
            url_template: "{base}/manuscript/{id}/history".to_string(),
            event_row: Locator::css("table.history tr"),
            next_arrow: Some(Locator::css("a.next-arrow")),
            page_number: Some(Locator::link_text("{page}")),
            next_control: Some(Locator::partial_link_text("Next")),
            jump_script: Some("goToPage({page})".to_string()),
        }
    }
}

/// Label strings used to find dates in a person's date cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldLabels {
    pub invited: Vec<String>,
    pub agreed: Vec<String>,
    pub due: Vec<String>,
    pub returned: Vec<String>,
}

impl Default for FieldLabels {
    fn default() -> Self {
        let v = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            invited: v(&["invited"]),
            agreed: v(&["agreed", "accepted"]),
            due: v(&["due"]),
            returned: v(&["returned", "received", "completed"]),
        }
    }
}

/// Everything that differs between portals.
///
/// One instance replaces one journal-specific extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Short journal code (e.g. "MF")
    pub name: String,

    /// Base URL, substituted for `{base}` in every template
    pub base_url: String,

    #[serde(default)]
    pub login: LoginSelectors,

    #[serde(default)]
    pub listing: ListingSelectors,

    #[serde(default)]
    pub detail: DetailSelectors,

    #[serde(default)]
    pub history: HistorySelectors,

    #[serde(default)]
    pub labels: FieldLabels,

    /// Regexes removed from page text before fingerprinting
    #[serde(default)]
    pub volatile_patterns: Vec<String>,

    /// chrono formats tried in order when parsing dates
    #[serde(default = "default_date_formats")]
    pub date_formats: Vec<String>,
}

fn default_date_formats() -> Vec<String> {
    ["%d-%b-%Y", "%Y-%m-%d", "%m/%d/%Y", "%d %b %Y", "%d %B %Y", "%B %d, %Y", "%b %d, %Y"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl PortalConfig {
    /// Create a config with default selectors.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            login: LoginSelectors::default(),
            listing: ListingSelectors::default(),
            detail: DetailSelectors::default(),
            history: HistorySelectors::default(),
            labels: FieldLabels::default(),
            volatile_patterns: vec![],
            date_formats: default_date_formats(),
        }
    }

    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(json)?;
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ExtractionError::Config {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_json_str(&json)
    }

    /// Check regexes compile and templates carry their placeholders.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(config_err("base_url is empty"));
        }
        regex::Regex::new(&self.listing.id_pattern)
            .map_err(|e| config_err(format!("listing.id_pattern: {}", e)))?;
        for pattern in &self.volatile_patterns {
            regex::Regex::new(pattern)
                .map_err(|e| config_err(format!("volatile pattern {:?}: {}", pattern, e)))?;
        }

        let templates = [
            ("listing.url_template", &self.listing.url_template, "{category}"),
            ("detail.url_template", &self.detail.url_template, "{id}"),
            ("history.url_template", &self.history.url_template, "{id}"),
        ];
        for (field, template, placeholder) in templates {
            if !template.contains(placeholder) {
                return Err(config_err(format!("{} lacks {}", field, placeholder)));
            }
        }
        if self.date_formats.is_empty() {
            return Err(config_err("date_formats is empty"));
        }
        Ok(())
    }

    /// Set the selectors for the detail page.
    pub fn with_detail(mut self, detail: DetailSelectors) -> Self {
        self.detail = detail;
        self
    }

    /// Set the login selectors.
    pub fn with_login(mut self, login: LoginSelectors) -> Self {
        self.login = login;
        self
    }

    /// Set the listing selectors.
    pub fn with_listing(mut self, listing: ListingSelectors) -> Self {
        self.listing = listing;
        self
    }

    /// Set the history selectors.
    pub fn with_history(mut self, history: HistorySelectors) -> Self {
        self.history = history;
        self
    }

    /// Add a volatile-text pattern.
    pub fn with_volatile_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.volatile_patterns.push(pattern.into());
        self
    }

    pub fn login_url(&self) -> String {
        self.fill(&self.login.url_template, &[])
    }

    pub fn listing_url(&self, category: &str) -> String {
        self.fill(&self.listing.url_template, &[("category", category)])
    }

    pub fn detail_url(&self, id: &str) -> String {
        self.fill(&self.detail.url_template, &[("id", id)])
    }

    pub fn history_url(&self, id: &str) -> String {
        self.fill(&self.history.url_template, &[("id", id)])
    }

    fn fill(&self, template: &str, vars: &[(&str, &str)]) -> String {
        let mut out = template.replace("{base}", &self.base_url);
        for (key, value) in vars {
            out = out.replace(&format!("{{{}}}", key), value);
        }
        out
    }
}

fn config_err(reason: impl Into<String>) -> ExtractionError {
    ExtractionError::Config {
        reason: reason.into(),
    }
}

/// Bounds for the paginated history reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Hard cap on pages visited
    pub max_pages: usize,

    /// Pages in a row without new events before giving up
    pub max_consecutive_empty: usize,

    /// Shortest event text accepted
    pub min_event_len: usize,

    /// Longest event text accepted
    pub max_event_len: usize,

    /// Tokens that mark a match as script residue, not an event
    pub denylist: Vec<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_pages: 50,
            max_consecutive_empty: 3,
            min_event_len: 10,
            max_event_len: 1000,
            denylist: [
                "function(",
                "function (",
                "javascript:",
                "document.",
                "window.",
                "<script",
                "var ",
                "});",
                "onclick",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl HistoryConfig {
    pub fn with_max_pages(mut self, max: usize) -> Self {
        self.max_pages = max;
        self
    }

    pub fn with_max_consecutive_empty(mut self, max: usize) -> Self {
        self.max_consecutive_empty = max;
        self
    }
}

/// Scores and thresholds for email-to-person resolution.
///
/// The defaults are empirical starting points, not derived values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Last name (long enough) appears in the address
    pub last_name_score: u32,

    /// First name appears in the address
    pub first_name_score: u32,

    /// Address local part is initial+surname or surname+initial
    pub initials_score: u32,

    /// A token of the affiliation matches the address domain
    pub affiliation_score: u32,

    /// Address domain equals a previously known domain for the person
    pub domain_hint_score: u32,

    /// Shortest last name allowed to match as a bare substring
    pub min_last_name_len: usize,

    /// Minimum score for addresses found on the entity's own pages
    pub page_threshold: u32,

    /// Minimum score for addresses from communication history
    pub history_threshold: u32,

    /// Minimum score for addresses from audit events
    pub audit_threshold: u32,

    /// Confidence at or above which an email is never replaced
    pub high_confidence: f32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            last_name_score: 10,
            first_name_score: 5,
            initials_score: 8,
            affiliation_score: 8,
            domain_hint_score: 15,
            min_last_name_len: 4,
            page_threshold: 3,
            history_threshold: 5,
            audit_threshold: 8,
            high_confidence: 0.8,
        }
    }
}

/// Configuration for the extraction pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Wall-clock budget per entity; remaining passes are skipped after it.
    ///
    /// Default: 300s.
    #[serde(with = "duration_ms")]
    pub entity_budget: Duration,

    /// Ignore the cache and re-extract everything.
    pub force_refresh: bool,

    /// Retry budget for navigation.
    pub navigation_retry: RetryPolicy,

    /// Retry budget for each pass.
    pub pass_retry: RetryPolicy,

    /// Retry budget for login during recovery.
    pub login_retry: RetryPolicy,

    /// Consecutive transient failures before the session counts as degraded.
    pub degraded_after: u32,

    /// Recoveries allowed per journal before giving up.
    pub max_recoveries: u32,

    /// Timeout for element waits.
    #[serde(with = "duration_ms")]
    pub wait_timeout: Duration,

    pub history: HistoryConfig,

    pub resolver: ResolverConfig,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            entity_budget: Duration::from_secs(300),
            force_refresh: false,
            navigation_retry: RetryPolicy::navigation(),
            pass_retry: RetryPolicy::page_parse(),
            login_retry: RetryPolicy::login(),
            degraded_after: 3,
            max_recoveries: 5,
            wait_timeout: Duration::from_secs(10),
            history: HistoryConfig::default(),
            resolver: ResolverConfig::default(),
        }
    }
}

impl ExtractionConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-entity budget.
    pub fn with_entity_budget(mut self, budget: Duration) -> Self {
        self.entity_budget = budget;
        self
    }

    /// Force re-extraction regardless of cached fingerprints.
    pub fn with_force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    /// Set the retry policy used for each pass.
    pub fn with_pass_retry(mut self, policy: RetryPolicy) -> Self {
        self.pass_retry = policy;
        self
    }

    /// Set the retry policy used for navigation.
    pub fn with_navigation_retry(mut self, policy: RetryPolicy) -> Self {
        self.navigation_retry = policy;
        self
    }

    /// Set the retry policy used for login.
    pub fn with_login_retry(mut self, policy: RetryPolicy) -> Self {
        self.login_retry = policy;
        self
    }

    /// Set history reader bounds.
    pub fn with_history(mut self, history: HistoryConfig) -> Self {
        self.history = history;
        self
    }

    /// Set resolver scoring.
    pub fn with_resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }

    /// Set the element wait timeout.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Set how many consecutive transient failures mark the session degraded.
    pub fn with_degraded_after(mut self, failures: u32) -> Self {
        self.degraded_after = failures;
        self
    }

    /// Set the recovery cap per journal.
    pub fn with_max_recoveries(mut self, max: u32) -> Self {
        self.max_recoveries = max;
        self
    }
}

/// Configuration for a multi-journal run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Browser sessions allowed at once. Default: 2.
    pub max_concurrent_sessions: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 2,
        }
    }
}

impl RunConfig {
    pub fn with_max_concurrent_sessions(mut self, max: usize) -> Self {
        self.max_concurrent_sessions = max.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_delays() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), 2.0);
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.total_backoff(), Duration::from_secs(3));
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let policy = RetryPolicy::new(80, Duration::from_secs(1), 2.0);
        assert_eq!(policy.delay_for(9), Duration::from_secs(512));
        assert_eq!(policy.delay_for(10), MAX_RETRY_DELAY);
        assert_eq!(policy.delay_for(70), MAX_RETRY_DELAY);
        assert_eq!(policy.delay_for(u32::MAX), MAX_RETRY_DELAY);

        let weird = RetryPolicy::new(3, Duration::from_secs(1), f64::NAN);
        assert!(weird.delay_for(2) <= MAX_RETRY_DELAY);
        assert_eq!(policy.total_backoff(), Duration::from_secs(1023 + 600 * 69));
    }

    #[test]
    fn test_retry_policy_clamps_attempts() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10), 2.0);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.total_backoff(), Duration::ZERO);
    }

    #[test]
    fn test_presets() {
        assert_eq!(RetryPolicy::login().max_attempts, 3);
        assert_eq!(RetryPolicy::login().base_delay, Duration::from_secs(2));
        assert_eq!(RetryPolicy::page_parse().max_attempts, 2);
        assert_eq!(RetryPolicy::page_parse().base_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_portal_urls() {
        let portal = PortalConfig::new("MF", "https://mc.example.com/mf/");
        assert_eq!(portal.login_url(), "https://mc.example.com/mf/login");
        assert_eq!(
            portal.listing_url("awaiting-reviewer-scores"),
            "https://mc.example.com/mf/queue/awaiting-reviewer-scores"
        );
        assert_eq!(
            portal.detail_url("MF-2024-0101"),
            "https://mc.example.com/mf/manuscript/MF-2024-0101"
        );
        assert_eq!(
            portal.history_url("MF-2024-0101"),
            "https://mc.example.com/mf/manuscript/MF-2024-0101/history"
        );
    }

    #[test]
    fn test_portal_from_json_uses_defaults() {
        let portal = PortalConfig::from_json_str(
            r#"{"name": "SICON", "base_url": "https://sicon.example.org/"}"#,
        )
        .unwrap();
        assert_eq!(portal.base_url, "https://sicon.example.org");
        assert_eq!(portal.listing.url_template, "{base}/queue/{category}");
        assert!(!portal.date_formats.is_empty());
    }

    #[test]
    fn test_portal_validation_rejects_bad_regex() {
        let portal = PortalConfig::new("MF", "https://x.example").with_volatile_pattern("([");
        assert!(matches!(
            portal.validate(),
            Err(ExtractionError::Config { .. })
        ));
    }

    #[test]
    fn test_portal_validation_requires_placeholders() {
        let mut portal = PortalConfig::new("MF", "https://x.example");
        portal.detail.url_template = "{base}/manuscript".to_string();
        assert!(portal.validate().is_err());
    }

    #[test]
    fn test_retry_policy_serialises_millis() {
        let json = serde_json::to_value(RetryPolicy::login()).unwrap();
        assert_eq!(json["base_delay"], 2000);
    }
}
