//! Session health and recovery.
//!
//! Browser-session death is asynchronous relative to the error that reveals
//! it, so callers re-check [`SessionMonitor::is_alive`] (or [`probe`]) before
//! touching the DOM after a suspected failure.
//!
//! [`probe`]: SessionMonitor::probe

use tracing::{debug, error, info, warn};

use crate::error::{ErrorSeverity, ExtractionError, Result};
use crate::pipeline::retry::RetryExecutor;
use crate::traits::auth::Authenticator;
use crate::traits::driver::Driver;
use crate::types::config::{ExtractionConfig, RetryPolicy};

/// Health of the automation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Working normally
    Alive,
    /// Still usable, but transient failures keep piling up
    Degraded,
    /// Unusable until recovered
    Dead,
}

/// Owns the driver session and its lifecycle.
///
/// `Dead` only goes back to `Alive` through a successful [`recover`]; a
/// failed recovery leaves the session `Dead`.
///
/// [`recover`]: SessionMonitor::recover
pub struct SessionMonitor<D: Driver> {
    driver: D,
    authenticator: Box<dyn Authenticator>,
    state: SessionState,
    login_retry: RetryPolicy,
    navigation_retry: RetryPolicy,
    consecutive_failures: u32,
    degraded_after: u32,
    recoveries: u32,
    max_recoveries: u32,
    last_context: Option<String>,
}

impl<D: Driver> SessionMonitor<D> {
    /// Create a monitor. The session counts as dead until [`start`](Self::start).
    pub fn new(driver: D, authenticator: Box<dyn Authenticator>) -> Self {
        let defaults = ExtractionConfig::default();
        Self {
            driver,
            authenticator,
            state: SessionState::Dead,
            login_retry: defaults.login_retry,
            navigation_retry: defaults.navigation_retry,
            consecutive_failures: 0,
            degraded_after: defaults.degraded_after,
            recoveries: 0,
            max_recoveries: defaults.max_recoveries,
            last_context: None,
        }
    }

    /// Take retry budgets and thresholds from an extraction config.
    pub fn with_config(mut self, config: &ExtractionConfig) -> Self {
        self.login_retry = config.login_retry.clone();
        self.navigation_retry = config.navigation_retry.clone();
        self.degraded_after = config.degraded_after.max(1);
        self.max_recoveries = config.max_recoveries;
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// `Alive` or `Degraded`.
    pub fn is_alive(&self) -> bool {
        self.state != SessionState::Dead
    }

    /// Successful recoveries and attempts so far.
    pub fn recoveries(&self) -> u32 {
        self.recoveries
    }

    /// URL to return to after recovery (usually the current listing).
    pub fn set_context(&mut self, url: impl Into<String>) {
        self.last_context = Some(url.into());
    }

    pub fn context(&self) -> Option<&str> {
        self.last_context.as_deref()
    }

    /// Log in for the first time.
    pub async fn start(&mut self) -> Result<()> {
        self.login().await.inspect_err(|e| {
            error!(error = %e, "Initial login failed");
        })?;
        self.state = SessionState::Alive;
        self.consecutive_failures = 0;
        info!(url = %self.authenticator.login_url(), "Session started");
        Ok(())
    }

    /// Fold an error into the session state and return the new state.
    ///
    /// Session-fatal signatures mark the session dead; transient errors
    /// count towards `Degraded`; anything else leaves the state unchanged.
    pub fn classify(&mut self, err: &ExtractionError) -> SessionState {
        match err.severity() {
            ErrorSeverity::SessionFatal => {
                if self.state != SessionState::Dead {
                    error!(error = %err, "Session dead");
                }
                self.state = SessionState::Dead;
            }
            ErrorSeverity::Transient => self.record_failure(),
            ErrorSeverity::DataFatal | ErrorSeverity::AuthFatal => {}
        }
        self.state
    }

    /// A driver operation succeeded.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        if self.state == SessionState::Degraded {
            debug!("Session healthy again");
            self.state = SessionState::Alive;
        }
    }

    /// A driver operation failed transiently.
    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        if self.state == SessionState::Alive && self.consecutive_failures >= self.degraded_after {
            warn!(failures = self.consecutive_failures, "Session degraded");
            self.state = SessionState::Degraded;
        }
    }

    /// Ask the driver whether the session still answers.
    pub async fn probe(&mut self) -> bool {
        if self.state == SessionState::Dead {
            return false;
        }
        match self.driver.current_url().await {
            Ok(_) => true,
            Err(e) if e.is_session_dead() => {
                error!(error = %e, "Probe found dead session");
                self.state = SessionState::Dead;
                false
            }
            Err(e) => {
                debug!(error = %e, "Probe failed, session still considered alive");
                true
            }
        }
    }

    /// Recover the session. Returns whether it is alive again.
    pub async fn recover(&mut self) -> bool {
        self.try_recover().await.is_ok()
    }

    /// Recover the session, reporting why recovery failed.
    ///
    /// Closes stray windows (restarting the browser if that reveals a dead
    /// session), logs in again and returns to the last known context.
    /// Authentication-fatal errors are returned as-is; anything else becomes
    /// [`ExtractionError::SessionLost`].
    pub async fn try_recover(&mut self) -> Result<()> {
        if self.recoveries >= self.max_recoveries {
            self.state = SessionState::Dead;
            return Err(ExtractionError::SessionLost {
                reason: format!("recovery limit of {} reached", self.max_recoveries),
            });
        }
        self.recoveries += 1;
        info!(attempt = self.recoveries, "Recovering session");

        match self.restore().await {
            Ok(()) => {
                self.state = SessionState::Alive;
                self.consecutive_failures = 0;
                info!(attempt = self.recoveries, "Session recovered");
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Dead;
                error!(error = %e, "Session recovery failed");
                if e.severity() == ErrorSeverity::AuthFatal {
                    Err(e)
                } else {
                    Err(ExtractionError::SessionLost {
                        reason: e.to_string(),
                    })
                }
            }
        }
    }

    async fn restore(&mut self) -> Result<()> {
        match self.driver.close_secondary_windows().await {
            Ok(0) => {}
            Ok(n) => debug!(closed = n, "Closed stray windows"),
            Err(e) if e.is_session_dead() => {
                warn!(error = %e, "Browser gone, restarting");
                self.driver.restart().await?;
            }
            Err(e) => warn!(error = %e, "Could not close stray windows"),
        }

        if let Err(e) = self.login().await {
            if !e.is_session_fatal() {
                return Err(e);
            }
            warn!(error = %e, "Session died during login, restarting");
            self.driver.restart().await?;
            self.login().await?;
        }

        if let Some(url) = self.last_context.clone() {
            let driver = &self.driver;
            let url = url.as_str();
            RetryExecutor::new("restore-context")
                .execute(&self.navigation_retry, move || async move {
                    driver.navigate(url).await.map_err(ExtractionError::from)
                })
                .await?;
        }
        Ok(())
    }

    async fn login(&self) -> Result<()> {
        let driver: &dyn Driver = &self.driver;
        let authenticator = self.authenticator.as_ref();
        RetryExecutor::new("login")
            .execute(&self.login_retry, move || async move {
                authenticator
                    .authenticate(driver)
                    .await
                    .map_err(ExtractionError::from)
            })
            .await
    }
}
