//! Runs several journals side by side, one browser session each.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::pipeline::orchestrator::{ExtractionOrchestrator, JournalReport};
use crate::traits::driver::Driver;
use crate::traits::store::SnapshotStore;
use crate::types::config::RunConfig;

/// One journal to run: its orchestrator and the categories to walk.
pub struct JournalJob<D: Driver, S: SnapshotStore> {
    pub categories: Vec<String>,
    pub orchestrator: ExtractionOrchestrator<D, S>,
}

impl<D: Driver, S: SnapshotStore> JournalJob<D, S> {
    pub fn new(orchestrator: ExtractionOrchestrator<D, S>, categories: Vec<String>) -> Self {
        Self {
            categories,
            orchestrator,
        }
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub journals: Vec<JournalReport>,
    pub cancelled: bool,
}

impl RunReport {
    /// Every error line, prefixed with its journal.
    pub fn errors(&self) -> Vec<String> {
        self.journals
            .iter()
            .flat_map(|j| j.errors().into_iter().map(move |e| format!("{}: {}", j.journal, e)))
            .collect()
    }

    pub fn extracted(&self) -> usize {
        self.journals.iter().map(|j| j.extracted()).sum()
    }
}

/// Runs journals with at most `max_concurrent_sessions` browsers at once.
pub struct Runner {
    config: RunConfig,
    cancel: CancellationToken,
}

impl Runner {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the run between entities when cancelled.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run<D: Driver, S: SnapshotStore>(&self, jobs: Vec<JournalJob<D, S>>) -> RunReport {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_sessions.max(1)));
        info!(journals = jobs.len(), sessions = self.config.max_concurrent_sessions, "Run started");

        let futures = jobs.into_iter().map(|job| {
            let semaphore = semaphore.clone();
            let cancel = self.cancel.child_token();
            async move {
                let _permit = semaphore.acquire().await.unwrap();
                let JournalJob {
                    categories,
                    orchestrator,
                } = job;
                let mut orchestrator = orchestrator.with_cancellation(cancel.clone());
                if cancel.is_cancelled() {
                    let mut report = JournalReport::new(&orchestrator.portal().name);
                    report.cancelled = true;
                    return report;
                }
                orchestrator.run_journal(&categories).await
            }
        });
        let journals = join_all(futures).await;

        let report = RunReport {
            cancelled: self.cancel.is_cancelled(),
            journals,
        };
        info!(
            extracted = report.extracted(),
            errors = report.errors().len(),
            cancelled = report.cancelled,
            "Run finished"
        );
        report
    }
}
