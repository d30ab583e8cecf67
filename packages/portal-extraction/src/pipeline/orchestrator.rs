//! Per-entity multi-pass extraction, and the category and journal loops
//! around it.
//!
//! # Failure handling
//!
//! - Transient errors are retried inside each pass.
//! - A data-fatal error fails only its own pass; the entity continues and is
//!   stored as incomplete.
//! - A dead session is recovered and the interrupted step re-run. If recovery
//!   fails the entity is dropped and the category abandoned.
//! - An authentication-fatal error aborts the journal.
//! - Running out of the entity budget skips the remaining passes; the partial
//!   record is returned but never cached.

use chrono::{NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ErrorSeverity, ExtractionError, Result};
use crate::pipeline::cache::{ChangeAwareCache, Freshness};
use crate::pipeline::listing::{ListCollector, Listing};
use crate::pipeline::normalize::normalize_record;
use crate::pipeline::passes::{run_pass, PassContext, PassData};
use crate::pipeline::resolver::{carry_forward_emails, Candidate, EntityResolver};
use crate::pipeline::retry::RetryExecutor;
use crate::pipeline::session::SessionMonitor;
use crate::traits::driver::Driver;
use crate::traits::store::SnapshotStore;
use crate::types::config::{ExtractionConfig, PortalConfig};
use crate::types::entity::EntityId;
use crate::types::record::ManuscriptRecord;
use crate::types::snapshot::{
    ContentFingerprint, ExtractionReport, ExtractionSnapshot, PassKind, PassOutcome, PassStatus,
};
use crate::types::text::html_to_text;

/// Result of [`ExtractionOrchestrator::extract`].
#[derive(Debug, Clone)]
pub struct EntityExtraction {
    pub snapshot: ExtractionSnapshot,
    /// Served from the cache without running any pass
    pub cache_hit: bool,
    /// Written to the cache by this call
    pub persisted: bool,
}

/// Problem with one entity, as shown in reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityError {
    pub entity: EntityId,
    pub message: String,
}

/// Outcome of one category listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryReport {
    pub category: String,
    pub ids_found: usize,
    pub extracted: usize,
    pub cache_hits: usize,
    /// Extracted with at least one failed or skipped pass
    pub incomplete: usize,
    pub errors: Vec<EntityError>,
    /// Why the rest of the category was given up, if it was
    pub abandoned: Option<String>,
    pub cancelled: bool,
}

impl CategoryReport {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            ..Default::default()
        }
    }
}

/// Outcome of all categories of one journal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalReport {
    pub journal: String,
    pub categories: Vec<CategoryReport>,
    /// Set when authentication failed and the journal was aborted
    pub aborted: Option<String>,
    pub cancelled: bool,
    pub recoveries: u32,
    pub cache: crate::pipeline::cache::CacheStats,
}

impl JournalReport {
    pub fn new(journal: impl Into<String>) -> Self {
        Self {
            journal: journal.into(),
            ..Default::default()
        }
    }

    /// Every error line, prefixed with its category.
    pub fn errors(&self) -> Vec<String> {
        let mut out: Vec<String> = self.aborted.iter().map(|a| format!("aborted: {}", a)).collect();
        for c in &self.categories {
            if let Some(reason) = &c.abandoned {
                out.push(format!("{}: abandoned: {}", c.category, reason));
            }
            out.extend(
                c.errors
                    .iter()
                    .map(|e| format!("{}: {}: {}", c.category, e.entity, e.message)),
            );
        }
        out
    }

    pub fn extracted(&self) -> usize {
        self.categories.iter().map(|c| c.extracted).sum()
    }
}

/// Runs the ordered passes for entities of one portal, over one session.
pub struct ExtractionOrchestrator<D: Driver, S: SnapshotStore> {
    portal: PortalConfig,
    config: ExtractionConfig,
    monitor: SessionMonitor<D>,
    cache: ChangeAwareCache<S>,
    id_pattern: Regex,
    volatile: Vec<Regex>,
    cancel: CancellationToken,
}

impl<D: Driver, S: SnapshotStore> ExtractionOrchestrator<D, S> {
    /// Fails with a config error if the portal's patterns do not compile.
    pub fn new(
        portal: PortalConfig,
        config: ExtractionConfig,
        monitor: SessionMonitor<D>,
        cache: ChangeAwareCache<S>,
    ) -> Result<Self> {
        portal.validate()?;
        let compile = |p: &str| {
            Regex::new(p).map_err(|e| ExtractionError::Config {
                reason: format!("pattern {:?}: {}", p, e),
            })
        };
        let id_pattern = compile(&portal.listing.id_pattern)?;
        let volatile = portal
            .volatile_patterns
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            monitor: monitor.with_config(&config),
            portal,
            config,
            cache,
            id_pattern,
            volatile,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn portal(&self) -> &PortalConfig {
        &self.portal
    }

    pub fn monitor(&self) -> &SessionMonitor<D> {
        &self.monitor
    }

    pub fn cache(&self) -> &ChangeAwareCache<S> {
        &self.cache
    }

    /// Log in. Must succeed before anything else.
    pub async fn start(&mut self) -> Result<()> {
        self.monitor.start().await
    }

    /// Recover first if the session is known to be dead.
    async fn ensure_alive(&mut self) -> Result<()> {
        if !self.monitor.is_alive() {
            self.monitor.try_recover().await?;
        }
        Ok(())
    }

    /// Record a session-fatal error and recover. Fails if recovery does.
    async fn recover_from(&mut self, err: &ExtractionError) -> Result<()> {
        self.monitor.classify(err);
        warn!(error = %err, "Session failure, recovering");
        self.monitor.try_recover().await
    }

    /// Collect the entity ids listed under `category`.
    pub async fn collect_ids(&mut self, category: &str) -> Result<Listing> {
        let url = self.portal.listing_url(category);
        self.monitor.set_context(url.clone());

        loop {
            self.ensure_alive().await?;
            let result = {
                let collector = ListCollector::new(self.monitor.driver(), &self.portal.listing)?;
                let collector = &collector;
                let url = url.as_str();
                RetryExecutor::new("collect-ids")
                    .execute(&self.config.navigation_retry, move || async move {
                        collector.collect(url).await
                    })
                    .await
            };
            match result {
                Err(e) if e.is_session_fatal() => self.recover_from(&e).await?,
                Err(e) => {
                    self.monitor.classify(&e);
                    return Err(e);
                }
                Ok(listing) => {
                    self.monitor.record_success();
                    return Ok(listing);
                }
            }
        }
    }

    async fn read_detail_source(&self, id: &EntityId) -> Result<String> {
        let driver = self.monitor.driver();
        let url = self.portal.detail_url(id.as_str());
        let url = url.as_str();
        RetryExecutor::new("open-detail")
            .execute(&self.config.navigation_retry, move || async move {
                match driver.navigate(url).await {
                    Ok(()) => driver.page_source().await.map_err(ExtractionError::from),
                    Err(e) => Err(e.into()),
                }
            })
            .await
    }

    /// Load the detail page, recovering the session if it dies on the way.
    async fn detail_source(&mut self, id: &EntityId) -> Result<String> {
        loop {
            self.ensure_alive().await?;
            match self.read_detail_source(id).await {
                Err(e) if e.is_session_fatal() => self.recover_from(&e).await?,
                other => return other,
            }
        }
    }

    /// One pass under its retry policy, cut off at `deadline`.
    async fn attempt_pass(
        &self,
        kind: PassKind,
        id: &EntityId,
        record: &ManuscriptRecord,
        today: NaiveDate,
        started: Instant,
        deadline: Instant,
    ) -> (Result<PassData>, u32) {
        let ctx = PassContext {
            driver: self.monitor.driver(),
            portal: &self.portal,
            config: &self.config,
            id,
            id_pattern: &self.id_pattern,
            today,
        };
        let retry = RetryExecutor::new(kind.as_str());
        let run = retry.run(&self.config.pass_retry, move || async move {
            run_pass(kind, ctx, record).await
        });

        match tokio::time::timeout_at(deadline, run).await {
            Ok(outcome) => (outcome.result, outcome.attempts),
            Err(_) => (Err(budget_exceeded(started)), 1),
        }
    }

    /// Extract one entity, or return its cached snapshot if unchanged.
    ///
    /// Errors only when the session could not be kept alive, when the
    /// detail page could not be loaded at all, or when the cache fails.
    pub async fn extract(&mut self, id: &EntityId) -> Result<EntityExtraction> {
        let started = Instant::now();
        let deadline = started + self.config.entity_budget;
        let recoveries_before = self.monitor.recoveries();

        let source = match tokio::time::timeout_at(deadline, self.detail_source(id)).await {
            Ok(source) => source?,
            Err(_) => return Err(budget_exceeded(started)),
        };
        let fingerprint = ContentFingerprint::compute(&source, &self.volatile);

        let previous = match self
            .cache
            .check(id, &fingerprint, self.config.force_refresh)
            .await?
        {
            Freshness::Fresh(snapshot) => {
                return Ok(EntityExtraction {
                    snapshot: *snapshot,
                    cache_hit: true,
                    persisted: false,
                })
            }
            Freshness::Stale { previous, .. } => previous,
        };

        info!(entity = %id, "Extracting");
        let today = Utc::now().date_naive();
        let mut record = ManuscriptRecord::new(id.clone());
        let mut report = ExtractionReport::default();
        let mut candidates = Candidate::from_page_text(&html_to_text(&source));

        for (i, kind) in PassKind::ORDER.into_iter().enumerate() {
            if Instant::now() >= deadline {
                skip_remaining(&mut report, &PassKind::ORDER[i..], started);
                break;
            }
            match tokio::time::timeout_at(deadline, self.ensure_alive()).await {
                Ok(alive) => alive?,
                Err(_) => {
                    skip_remaining(&mut report, &PassKind::ORDER[i..], started);
                    break;
                }
            }

            let pass_started = Instant::now();
            let (mut result, mut attempts) = self
                .attempt_pass(kind, id, &record, today, started, deadline)
                .await;
            while let Err(e) = &result {
                if !e.is_session_fatal() {
                    break;
                }
                match tokio::time::timeout_at(deadline, self.recover_from(e)).await {
                    Ok(recovered) => recovered?,
                    Err(_) => {
                        result = Err(budget_exceeded(started));
                        break;
                    }
                }
                let (retried, more) = self
                    .attempt_pass(kind, id, &record, today, started, deadline)
                    .await;
                result = retried;
                attempts += more;
            }
            let duration_ms = pass_started.elapsed().as_millis() as u64;

            match result {
                Ok(data) => {
                    self.monitor.record_success();
                    data.apply(&mut record, &mut candidates);
                    debug!(entity = %id, pass = %kind, attempts, "Pass completed");
                    report.record(PassOutcome {
                        pass: kind,
                        status: PassStatus::Completed,
                        attempts,
                        duration_ms,
                    });
                }
                Err(ExtractionError::BudgetExceeded { .. }) => {
                    skip_remaining(&mut report, &PassKind::ORDER[i..], started);
                    break;
                }
                Err(e) => {
                    warn!(entity = %id, pass = %kind, attempts, error = %e, "Pass failed");
                    self.monitor.classify(&e);
                    report.record(PassOutcome {
                        pass: kind,
                        status: PassStatus::Failed {
                            error: e.to_string(),
                        },
                        attempts,
                        duration_ms,
                    });
                    self.monitor.probe().await;
                }
            }
        }
        report.recoveries = self.monitor.recoveries() - recoveries_before;

        if let Some(previous) = &previous {
            carry_forward_emails(&previous.record, &mut record);
        }
        normalize_record(&mut record);
        let mut resolver = EntityResolver::new(self.config.resolver.clone());
        if let Some(previous) = &previous {
            resolver = resolver.with_hints_from(&previous.record);
        }
        let resolved = resolver.resolve_record(&mut record, &candidates);
        normalize_record(&mut record);
        debug!(entity = %id, resolved, candidates = candidates.len(), "Emails resolved");

        let snapshot = ExtractionSnapshot::new(record, fingerprint, report);
        if snapshot.report.budget_exhausted {
            warn!(
                entity = %id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Entity budget exhausted, snapshot not cached"
            );
            return Ok(EntityExtraction {
                snapshot,
                cache_hit: false,
                persisted: false,
            });
        }

        self.cache.put(&snapshot).await?;
        if snapshot.is_complete() {
            info!(entity = %id, "Entity extracted");
        } else {
            warn!(entity = %id, errors = ?snapshot.report.errors(), "Entity extracted with failed passes");
        }
        Ok(EntityExtraction {
            snapshot,
            cache_hit: false,
            persisted: true,
        })
    }

    /// Extract every entity listed under `category`.
    ///
    /// Only an authentication-fatal error is returned; everything else is
    /// recorded in the report.
    pub async fn run_category(&mut self, category: &str) -> Result<CategoryReport> {
        let mut report = CategoryReport::new(category);
        info!(journal = %self.portal.name, category, "Category started");

        let listing = match self.collect_ids(category).await {
            Ok(listing) => listing,
            Err(e) if e.severity() == ErrorSeverity::AuthFatal => return Err(e),
            Err(e) => {
                error!(category, error = %e, "Listing failed, category abandoned");
                report.abandoned = Some(e.to_string());
                return Ok(report);
            }
        };
        report.ids_found = listing.len();

        for id in &listing.ids {
            if self.cancel.is_cancelled() {
                info!(category, "Cancelled");
                report.cancelled = true;
                break;
            }
            match self.extract(id).await {
                Ok(extraction) => {
                    if extraction.cache_hit {
                        report.cache_hits += 1;
                    } else {
                        report.extracted += 1;
                        if !extraction.snapshot.is_complete() {
                            report.incomplete += 1;
                            report.errors.extend(
                                extraction
                                    .snapshot
                                    .report
                                    .errors()
                                    .into_iter()
                                    .map(|message| EntityError {
                                        entity: id.clone(),
                                        message,
                                    }),
                            );
                        }
                    }
                }
                Err(e) => {
                    report.errors.push(EntityError {
                        entity: id.clone(),
                        message: e.to_string(),
                    });
                    match e.severity() {
                        ErrorSeverity::AuthFatal => return Err(e),
                        ErrorSeverity::SessionFatal => {
                            error!(category, entity = %id, error = %e, "Session lost, category abandoned");
                            report.abandoned = Some(e.to_string());
                            break;
                        }
                        _ => warn!(entity = %id, error = %e, "Entity failed"),
                    }
                }
            }
        }

        info!(
            category,
            found = report.ids_found,
            extracted = report.extracted,
            cache_hits = report.cache_hits,
            errors = report.errors.len(),
            "Category finished"
        );
        Ok(report)
    }

    /// Log in and run every category in order.
    pub async fn run_journal(&mut self, categories: &[String]) -> JournalReport {
        let mut report = JournalReport::new(&self.portal.name);

        if let Err(e) = self.start().await {
            error!(journal = %self.portal.name, error = %e, "Login failed, journal aborted");
            report.aborted = Some(e.to_string());
            return report;
        }

        for category in categories {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            match self.run_category(category).await {
                Ok(c) => {
                    report.cancelled |= c.cancelled;
                    report.categories.push(c);
                }
                Err(e) => {
                    error!(
                        journal = %self.portal.name,
                        category = %category,
                        error = %e,
                        "Authentication failed, journal aborted"
                    );
                    report.aborted = Some(e.to_string());
                    break;
                }
            }
        }

        report.recoveries = self.monitor.recoveries();
        report.cache = self.cache.stats();
        report
    }
}

fn budget_exceeded(started: Instant) -> ExtractionError {
    ExtractionError::BudgetExceeded {
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

fn skip_remaining(report: &mut ExtractionReport, kinds: &[PassKind], started: Instant) {
    report.budget_exhausted = true;
    let reason = format!(
        "entity budget exhausted after {}ms",
        started.elapsed().as_millis()
    );
    for kind in kinds {
        report.record(PassOutcome {
            pass: *kind,
            status: PassStatus::Skipped {
                reason: reason.clone(),
            },
            attempts: 0,
            duration_ms: 0,
        });
    }
}
