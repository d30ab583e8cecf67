//! The per-entity extraction passes.
//!
//! Every pass reads one kind of sub-record and returns it as [`PassData`];
//! the orchestrator folds the data into the record. Passes never write to the
//! record directly, so a failed pass leaves no half-applied state behind.

use chrono::NaiveDate;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

use crate::error::{ExtractionError, Result};
use crate::pipeline::history::PaginatedHistoryReader;
use crate::pipeline::normalize::clean;
use crate::pipeline::resolver::Candidate;
use crate::traits::driver::{empty_unless_dead, Driver, ElementHandle, Locator};
use crate::types::audit::{AuditEvent, EventType};
use crate::types::config::{ExtractionConfig, PortalConfig, RowSelectors};
use crate::types::dates::{all_dates, labelled_date, strip_dates};
use crate::types::entity::EntityId;
use crate::types::person::{PersonDates, PersonRecord, PersonRole};
use crate::types::record::{
    DocumentKind, DocumentLink, Documents, ManuscriptRecord, StatusDetails, VersionEntry,
};
use crate::types::snapshot::PassKind;
use crate::types::text::email_from_mailto;

/// Everything a pass needs to read one entity.
#[derive(Clone, Copy)]
pub struct PassContext<'a> {
    pub driver: &'a dyn Driver,
    pub portal: &'a PortalConfig,
    pub config: &'a ExtractionConfig,
    pub id: &'a EntityId,
    pub id_pattern: &'a Regex,
    pub today: NaiveDate,
}

/// Output of one pass.
#[derive(Debug, Clone)]
pub enum PassData {
    People {
        referees: Vec<PersonRecord>,
        editors: Vec<PersonRecord>,
    },
    Metadata {
        title: Option<String>,
        metadata: BTreeMap<String, String>,
        authors: Vec<PersonRecord>,
    },
    Documents(Documents),
    VersionHistory(Vec<VersionEntry>),
    AuditTrail(Vec<AuditEvent>),
    DerivedStatus(StatusDetails),
}

impl PassData {
    /// Fold this pass's data into `record`, adding any addresses it carries
    /// to the resolver's candidate pool.
    pub fn apply(self, record: &mut ManuscriptRecord, candidates: &mut Vec<Candidate>) {
        match self {
            PassData::People { referees, editors } => {
                record.referees = referees;
                record.editors = editors;
            }
            PassData::Metadata {
                title,
                metadata,
                authors,
            } => {
                record.title = title;
                record.metadata = metadata;
                record.authors = authors;
            }
            PassData::Documents(documents) => record.documents = documents,
            PassData::VersionHistory(versions) => record.version_history = versions,
            PassData::AuditTrail(events) => {
                candidates.extend(events.iter().flat_map(Candidate::from_event));
                record.audit_trail = events;
            }
            PassData::DerivedStatus(status) => record.status_details = status,
        }
    }
}

/// Run one pass. `record` is the record built so far; only the derived
/// status pass reads it.
pub async fn run_pass(
    kind: PassKind,
    ctx: PassContext<'_>,
    record: &ManuscriptRecord,
) -> Result<PassData> {
    match kind {
        PassKind::People => {
            open_detail(ctx).await?;
            let d = &ctx.portal.detail;
            Ok(PassData::People {
                referees: read_people(ctx, &d.referees, PersonRole::Referee).await?,
                editors: read_people(ctx, &d.editors, PersonRole::Editor).await?,
            })
        }
        PassKind::Metadata => {
            open_detail(ctx).await?;
            read_metadata(ctx).await
        }
        PassKind::Documents => {
            open_detail(ctx).await?;
            read_documents(ctx).await.map(PassData::Documents)
        }
        PassKind::VersionHistory => {
            open_detail(ctx).await?;
            read_versions(ctx).await.map(PassData::VersionHistory)
        }
        PassKind::AuditTrail => {
            let outcome = PaginatedHistoryReader::new(
                ctx.driver,
                &ctx.portal.history,
                &ctx.config.history,
                &ctx.portal.date_formats,
            )
            .read_all(&ctx.portal.history_url(ctx.id.as_str()))
            .await?;
            Ok(PassData::AuditTrail(outcome.events))
        }
        PassKind::DerivedStatus => Ok(PassData::DerivedStatus(derive_status(record, ctx.today))),
    }
}

/// Make sure the detail page is loaded; later passes may have left it.
async fn open_detail(ctx: PassContext<'_>) -> Result<()> {
    let url = ctx.portal.detail_url(ctx.id.as_str());
    if ctx.driver.current_url().await? != url {
        ctx.driver.navigate(&url).await?;
    }
    if let Some(marker) = &ctx.portal.detail.ready_marker {
        if !ctx.driver.wait_for(marker, ctx.config.wait_timeout).await? {
            return Err(crate::error::DriverError::Timeout {
                operation: format!("waiting for {}", marker),
            }
            .into());
        }
    }
    Ok(())
}

/// Trimmed text of the first `locator` match inside `parent`.
async fn cell_text(
    driver: &dyn Driver,
    parent: &ElementHandle,
    locator: &Locator,
) -> Result<Option<String>> {
    let Some(cell) = empty_unless_dead(driver.find_first_within(parent, locator).await)? else {
        return Ok(None);
    };
    let text = empty_unless_dead(driver.text(&cell).await)?;
    Ok(clean(Some(text)))
}

async fn optional_cell(
    driver: &dyn Driver,
    parent: &ElementHandle,
    locator: &Option<Locator>,
) -> Result<Option<String>> {
    match locator {
        Some(locator) => cell_text(driver, parent, locator).await,
        None => Ok(None),
    }
}

async fn read_people(
    ctx: PassContext<'_>,
    selectors: &RowSelectors,
    role: PersonRole,
) -> Result<Vec<PersonRecord>> {
    let driver = ctx.driver;
    let labels = &ctx.portal.labels;
    let formats = &ctx.portal.date_formats;
    let rows = empty_unless_dead(driver.find_elements(&selectors.row).await)?;
    let mut people = Vec::with_capacity(rows.len());

    for row in &rows {
        let Some(name) = cell_text(driver, row, &selectors.name).await? else {
            continue;
        };
        let mut person = PersonRecord::new(name, role);

        if let Some(link) = &selectors.email_link {
            if let Some(anchor) = empty_unless_dead(driver.find_first_within(row, link).await)? {
                let href = empty_unless_dead(driver.attribute(&anchor, "href").await)?;
                if let Some(email) = href.as_deref().and_then(email_from_mailto) {
                    person = person.with_email(email);
                }
            }
        }
        person.affiliation = optional_cell(driver, row, &selectors.affiliation).await?;
        person.status = optional_cell(driver, row, &selectors.status).await?;
        if let Some(text) = optional_cell(driver, row, &selectors.dates).await? {
            person.dates = PersonDates {
                invited: labelled_date(&text, &labels.invited, formats),
                agreed: labelled_date(&text, &labels.agreed, formats),
                due: labelled_date(&text, &labels.due, formats),
                returned: labelled_date(&text, &labels.returned, formats),
            };
        }
        people.push(person);
    }

    if !rows.is_empty() && people.is_empty() {
        return Err(ExtractionError::malformed(
            format!("{} rows", role),
            format!("{} rows without a readable name", rows.len()),
        ));
    }
    debug!(entity = %ctx.id, %role, count = people.len(), "People read");
    Ok(people)
}

async fn read_metadata(ctx: PassContext<'_>) -> Result<PassData> {
    let driver = ctx.driver;
    let d = &ctx.portal.detail;

    let title = clean(empty_unless_dead(driver.text_of(&d.title).await)?);
    let mut metadata = BTreeMap::new();
    for row in empty_unless_dead(driver.find_elements(&d.metadata_row).await)? {
        let text = empty_unless_dead(driver.text(&row).await)?;
        if let Some((label, value)) = text.split_once(':') {
            let label = label.trim();
            if !label.is_empty() {
                metadata.insert(label.to_string(), value.trim().to_string());
            }
        }
    }
    let authors = read_people(ctx, &d.authors, PersonRole::Author).await?;

    Ok(PassData::Metadata {
        title,
        metadata,
        authors,
    })
}

async fn read_documents(ctx: PassContext<'_>) -> Result<Documents> {
    let driver = ctx.driver;
    let base = driver.current_url().await?;
    let base = Url::parse(&base).ok();
    let mut files = Vec::new();

    for link in empty_unless_dead(driver.find_elements(&ctx.portal.detail.document_link).await)? {
        let label = empty_unless_dead(driver.text(&link).await)?.trim().to_string();
        let href = empty_unless_dead(driver.attribute(&link, "href").await)?
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                ExtractionError::malformed("documents", format!("link {:?} has no href", label))
            })?;

        let url = match base.as_ref().and_then(|b| b.join(&href).ok()) {
            Some(url) => url.to_string(),
            None => href,
        };
        files.push(DocumentLink {
            kind: DocumentKind::classify(&label),
            label,
            url,
        });
    }
    Ok(Documents { files })
}

async fn read_versions(ctx: PassContext<'_>) -> Result<Vec<VersionEntry>> {
    let driver = ctx.driver;
    let formats = &ctx.portal.date_formats;
    let mut versions: Vec<VersionEntry> = Vec::new();

    for row in empty_unless_dead(driver.find_elements(&ctx.portal.detail.version_row).await)? {
        let text = empty_unless_dead(driver.text(&row).await)?;
        let Some(m) = ctx.id_pattern.find(&text) else {
            continue;
        };
        let id = EntityId::new(m.as_str());
        let rest = strip_dates(&text.replace(m.as_str(), " "));
        versions.push(VersionEntry {
            revision: id.revision(),
            date: all_dates(&text, formats).into_iter().next(),
            decision: clean(Some(rest)),
            id,
        });
    }

    for id in ctx.id.earlier_versions() {
        if !versions.iter().any(|v| v.id == id) {
            versions.push(VersionEntry {
                revision: id.revision(),
                id,
                date: None,
                decision: None,
            });
        }
    }
    versions.sort_by_key(|v| v.revision);
    Ok(versions)
}

/// Referee counts, reminders and a stage label, from what was extracted.
pub fn derive_status(record: &ManuscriptRecord, today: NaiveDate) -> StatusDetails {
    let mut s = StatusDetails {
        referees_invited: record.referees.len(),
        ..Default::default()
    };

    for referee in &record.referees {
        let status = referee.status.as_deref().unwrap_or_default().to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| status.contains(w));

        if has(&["declin", "unavailable", "terminated"]) {
            s.referees_declined += 1;
            continue;
        }
        let returned = referee.dates.returned.is_some()
            || has(&["returned", "complete", "received", "submitted"]);
        let agreed = returned || referee.dates.agreed.is_some() || has(&["agreed", "accepted"]);

        if agreed {
            s.referees_agreed += 1;
        }
        if returned {
            s.reports_returned += 1;
        } else if agreed {
            s.reports_pending += 1;
            if referee.dates.due.is_some_and(|due| due < today) {
                s.reports_overdue += 1;
            }
        }
    }

    s.reminders_sent = record
        .audit_trail
        .iter()
        .filter(|e| e.event_type == EventType::Reminder)
        .count();
    s.last_activity = record.audit_trail.iter().map(|e| e.date).max();

    let explicit = record
        .metadata
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("status") || k.eq_ignore_ascii_case("stage"))
        .map(|(_, v)| v.clone());
    s.stage = Some(explicit.unwrap_or_else(|| inferred_stage(&s).to_string()));
    s
}

fn inferred_stage(s: &StatusDetails) -> &'static str {
    let responding = s.referees_invited - s.referees_declined - s.referees_agreed;
    if s.reports_pending > 0 {
        "Under review"
    } else if responding > 0 {
        "Awaiting reviewer response"
    } else if s.reports_returned > 0 {
        "Awaiting decision"
    } else {
        "Awaiting reviewer invitation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{detail_page, manuscript_pages, ManuscriptFixture, MockDriver, PersonFixture};

    const ID: &str = "MF-2024-0101.R1";

    struct Fixture {
        portal: PortalConfig,
        config: ExtractionConfig,
        id: EntityId,
        id_pattern: Regex,
    }

    impl Fixture {
        fn new() -> Self {
            let portal = PortalConfig::new("MF", "https://mc.example.org/mf");
            let id_pattern = Regex::new(&portal.listing.id_pattern).unwrap();
            Self {
                portal,
                config: ExtractionConfig::default(),
                id: EntityId::new(ID),
                id_pattern,
            }
        }

        fn ctx<'a>(&'a self, driver: &'a MockDriver) -> PassContext<'a> {
            PassContext {
                driver,
                portal: &self.portal,
                config: &self.config,
                id: &self.id,
                id_pattern: &self.id_pattern,
                today: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            }
        }
    }

    fn manuscript() -> ManuscriptFixture {
        ManuscriptFixture::new(ID, "Stochastic control of queues")
            .metadata("Manuscript Type", "Original Article")
            .metadata("Keywords", "N/A")
            .referee(
                PersonFixture::new("Smith, John")
                    .email("jsmith@mit.edu")
                    .affiliation("MIT")
                    .status("Agreed")
                    .dates("Invited: 03-Jan-2024; Agreed: 05-Jan-2024; Due: 01-Feb-2024"),
            )
            .referee(PersonFixture::new("Lee, Anna").status("Report returned").dates("Returned: 20-Feb-2024"))
            .referee(PersonFixture::new("Brown, Tom").status("Declined"))
            .author(PersonFixture::new("Garcia, Maria").email("mgarcia@uni.edu"))
            .editor(PersonFixture::new("Doe, Jane").status("Associate Editor"))
            .document("Main Document", Some("/files/1.pdf"))
            .document("Cover Letter", Some("https://cdn.example.org/2.pdf"))
            .version("MF-2024-0101 12-Dec-2023 Major revision")
            .history_page(&["03-Jan-2024 10:00 Reviewer invited: Smith, John"])
    }

    #[tokio::test]
    async fn test_people_pass() {
        let fx = Fixture::new();
        let driver = MockDriver::new().with_pages(manuscript_pages(&fx.portal, &manuscript()));
        let record = ManuscriptRecord::new(fx.id.clone());

        let PassData::People { referees, editors } =
            run_pass(PassKind::People, fx.ctx(&driver), &record).await.unwrap()
        else {
            panic!("wrong pass data");
        };

        assert_eq!(referees.len(), 3);
        let smith = &referees[0];
        assert_eq!(smith.email.as_deref(), Some("jsmith@mit.edu"));
        assert_eq!(smith.affiliation.as_deref(), Some("MIT"));
        assert_eq!(smith.dates.agreed, NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(smith.dates.due, NaiveDate::from_ymd_opt(2024, 2, 1));
        assert_eq!(referees[1].dates.returned, NaiveDate::from_ymd_opt(2024, 2, 20));
        assert_eq!(editors[0].status.as_deref(), Some("Associate Editor"));
        assert_eq!(driver.navigation_count(&fx.portal.detail_url(ID)), 1);
    }

    #[tokio::test]
    async fn test_metadata_documents_and_versions() {
        let fx = Fixture::new();
        let driver = MockDriver::new().with_pages(manuscript_pages(&fx.portal, &manuscript()));
        let record = ManuscriptRecord::new(fx.id.clone());
        let ctx = fx.ctx(&driver);

        let PassData::Metadata { title, metadata, authors } =
            run_pass(PassKind::Metadata, ctx, &record).await.unwrap()
        else {
            panic!("wrong pass data");
        };
        assert_eq!(title.as_deref(), Some("Stochastic control of queues"));
        assert_eq!(metadata.get("Manuscript Type").map(String::as_str), Some("Original Article"));
        assert_eq!(authors[0].email.as_deref(), Some("mgarcia@uni.edu"));

        let PassData::Documents(docs) = run_pass(PassKind::Documents, ctx, &record).await.unwrap() else {
            panic!("wrong pass data");
        };
        assert_eq!(docs.files[0].url, "https://mc.example.org/files/1.pdf");
        assert_eq!(docs.files[0].kind, DocumentKind::Manuscript);
        assert!(docs.has(DocumentKind::CoverLetter));

        let PassData::VersionHistory(versions) =
            run_pass(PassKind::VersionHistory, ctx, &record).await.unwrap()
        else {
            panic!("wrong pass data");
        };
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].id, EntityId::new("MF-2024-0101"));
        assert_eq!(versions[0].date, NaiveDate::from_ymd_opt(2023, 12, 12));
        assert_eq!(versions[0].decision.as_deref(), Some("Major revision"));
    }

    #[tokio::test]
    async fn test_document_without_href_is_malformed() {
        let fx = Fixture::new();
        let m = manuscript().document("Supplementary Material", None);
        let driver = MockDriver::new().with_page(detail_page(&fx.portal, &m));
        let record = ManuscriptRecord::new(fx.id.clone());

        let err = run_pass(PassKind::Documents, fx.ctx(&driver), &record)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedPage { .. }));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_audit_trail_pass_feeds_candidates() {
        let fx = Fixture::new();
        let m = manuscript().history_page(&["04-Jan-2024 09:00 Reminder sent to alee@stanford.edu"]);
        let driver = MockDriver::new().with_pages(manuscript_pages(&fx.portal, &m));
        let mut record = ManuscriptRecord::new(fx.id.clone());

        let data = run_pass(PassKind::AuditTrail, fx.ctx(&driver), &record)
            .await
            .unwrap();
        let mut candidates = Vec::new();
        data.apply(&mut record, &mut candidates);

        assert_eq!(record.audit_trail.len(), 2);
        assert_eq!(candidates, vec![Candidate::from("alee@stanford.edu")]);
    }

    #[test]
    fn test_derive_status() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut record = ManuscriptRecord::new(EntityId::new(ID));
        let mut smith = PersonRecord::new("Smith, John", PersonRole::Referee).with_status("Agreed");
        smith.dates.due = NaiveDate::from_ymd_opt(2024, 2, 1);
        let lee = PersonRecord::new("Lee, Anna", PersonRole::Referee).with_status("Report returned");
        let brown = PersonRecord::new("Brown, Tom", PersonRole::Referee).with_status("Declined");
        let new = PersonRecord::new("White, Ed", PersonRole::Referee).with_status("Invited");
        record.referees = vec![smith, lee, brown, new];
        let day = NaiveDate::from_ymd_opt(2024, 2, 15).unwrap();
        record.audit_trail = vec![
            AuditEvent::new(day, None, "Reminder sent to Smith"),
            AuditEvent::new(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(), None, "Reviewer invited"),
        ];

        let s = derive_status(&record, today);
        assert_eq!(s.referees_invited, 4);
        assert_eq!(s.referees_agreed, 2);
        assert_eq!(s.referees_declined, 1);
        assert_eq!(s.reports_returned, 1);
        assert_eq!(s.reports_pending, 1);
        assert_eq!(s.reports_overdue, 1);
        assert_eq!(s.reminders_sent, 1);
        assert_eq!(s.last_activity, Some(day));
        assert_eq!(s.stage.as_deref(), Some("Under review"));

        record.metadata.insert("Status".into(), "Awaiting AE recommendation".into());
        let s = derive_status(&record, today);
        assert_eq!(s.stage.as_deref(), Some("Awaiting AE recommendation"));
    }
}
