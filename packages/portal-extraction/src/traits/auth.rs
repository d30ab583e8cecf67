//! Authentication against a portal.
//!
//! The second-factor code provider is an external collaborator (a mailbox
//! poller in practice). Authentication is only ever run from inside the
//! session monitor, at start and during recovery.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AuthError, AuthResult};
use crate::security::credentials::PortalCredentials;
use crate::traits::driver::{require_element, Driver};
use crate::types::config::LoginSelectors;

/// Source of short-lived second-factor codes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecondFactorProvider: Send + Sync {
    /// Wait up to `max_wait` for a code sent on `channel` after `after`.
    ///
    /// Codes issued before `after` belong to earlier logins and must be ignored.
    async fn fetch_code(
        &self,
        channel: &str,
        after: DateTime<Utc>,
        max_wait: Duration,
    ) -> Option<String>;
}

/// Provider for portals without a second factor.
pub struct NoSecondFactor;

#[async_trait]
impl SecondFactorProvider for NoSecondFactor {
    async fn fetch_code(&self, _: &str, _: DateTime<Utc>, _: Duration) -> Option<String> {
        None
    }
}

/// Logs a driver session into a portal.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Run the full login flow. Success means the portal shows a logged-in page.
    async fn authenticate(&self, driver: &dyn Driver) -> AuthResult<()>;

    /// URL the login flow starts from.
    fn login_url(&self) -> &str;
}

/// Username/password form login with an optional second-factor step.
pub struct FormAuthenticator {
    login_url: String,
    selectors: LoginSelectors,
    credentials: PortalCredentials,
    codes: Arc<dyn SecondFactorProvider>,
}

impl FormAuthenticator {
    pub fn new(
        login_url: impl Into<String>,
        selectors: LoginSelectors,
        credentials: PortalCredentials,
    ) -> Self {
        Self {
            login_url: login_url.into(),
            selectors,
            credentials,
            codes: Arc::new(NoSecondFactor),
        }
    }

    /// Use a code provider for the second-factor challenge.
    pub fn with_code_provider(mut self, codes: Arc<dyn SecondFactorProvider>) -> Self {
        self.codes = codes;
        self
    }

    async fn second_factor(&self, driver: &dyn Driver, after: DateTime<Utc>) -> AuthResult<()> {
        let Some(sf) = &self.selectors.second_factor else {
            return Ok(());
        };
        let Some(input) = driver.find_first(&sf.input).await? else {
            return Ok(());
        };

        tracing::info!(channel = %sf.channel, "Second factor requested");
        let code = self
            .codes
            .fetch_code(&sf.channel, after, sf.max_wait)
            .await
            .ok_or_else(|| AuthError::MissingSecondFactor {
                channel: sf.channel.clone(),
            })?;

        driver.type_text(&input, code.trim()).await?;
        let submit = require_element(driver, &sf.submit).await?;
        driver.click(&submit).await?;
        Ok(())
    }

    async fn rejected(&self, driver: &dyn Driver) -> AuthResult<bool> {
        match &self.selectors.error_marker {
            Some(marker) => Ok(driver.find_first(marker).await?.is_some()),
            None => Ok(false),
        }
    }
}

#[async_trait]
impl Authenticator for FormAuthenticator {
    async fn authenticate(&self, driver: &dyn Driver) -> AuthResult<()> {
        let s = &self.selectors;
        driver.navigate(&self.login_url).await?;

        if driver.find_first(&s.logged_in_marker).await?.is_some() {
            tracing::debug!("Already logged in");
            return Ok(());
        }

        if !driver.wait_for(&s.username, s.timeout).await? {
            return Err(AuthError::LoginFailed {
                reason: format!("login form not found at {}", self.login_url),
            });
        }

        let username = require_element(driver, &s.username).await?;
        driver.type_text(&username, self.credentials.username()).await?;
        let password = require_element(driver, &s.password).await?;
        driver
            .type_text(&password, self.credentials.password())
            .await?;

        let submitted_at = Utc::now();
        let submit = require_element(driver, &s.submit).await?;
        driver.click(&submit).await?;

        if self.rejected(driver).await? {
            return Err(AuthError::InvalidCredentials);
        }

        self.second_factor(driver, submitted_at).await?;

        if self.rejected(driver).await? {
            return Err(AuthError::InvalidCredentials);
        }
        if !driver.wait_for(&s.logged_in_marker, s.timeout).await? {
            return Err(AuthError::LoginFailed {
                reason: "logged-in marker never appeared".to_string(),
            });
        }

        tracing::info!(user = %self.credentials.username(), "Logged in");
        Ok(())
    }

    fn login_url(&self) -> &str {
        &self.login_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{login_pages, MockDriver, MockDriverCall};
    use crate::traits::driver::Locator;
    use crate::types::config::{PortalConfig, SecondFactorSelectors};

    fn portal() -> PortalConfig {
        PortalConfig::new("MF", "https://mc.example.org/mf")
    }

    fn authenticator(portal: &PortalConfig, password: &str) -> FormAuthenticator {
        FormAuthenticator::new(
            portal.login_url(),
            portal.login.clone(),
            PortalCredentials::new("editor", password),
        )
    }

    #[tokio::test]
    async fn test_login_success() {
        let portal = portal();
        let driver = MockDriver::new().with_pages(login_pages(&portal, "secret", None));

        authenticator(&portal, "secret")
            .authenticate(&driver)
            .await
            .unwrap();

        let typed: Vec<_> = driver
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                MockDriverCall::TypeText { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(typed, vec!["editor".to_string(), "secret".to_string()]);
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let portal = portal();
        let driver = MockDriver::new().with_pages(login_pages(&portal, "secret", None));

        let err = authenticator(&portal, "wrong")
            .authenticate(&driver)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_second_factor_code_is_typed() {
        let mut portal = portal();
        portal.login.second_factor = Some(SecondFactorSelectors {
            input: Locator::css("input#TOKEN_VALUE"),
            submit: Locator::css("#VERIFY_BTN"),
            channel: "email".into(),
            max_wait: Duration::from_secs(60),
        });
        let driver = MockDriver::new().with_pages(login_pages(&portal, "secret", Some("483920")));

        let mut codes = MockSecondFactorProvider::new();
        codes
            .expect_fetch_code()
            .withf(|channel, _, max_wait| {
                channel == "email" && *max_wait == Duration::from_secs(60)
            })
            .times(1)
            .returning(|_, _, _| Some("483920".to_string()));

        authenticator(&portal, "secret")
            .with_code_provider(Arc::new(codes))
            .authenticate(&driver)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_second_factor_is_fatal() {
        let mut portal = portal();
        portal.login.second_factor = Some(SecondFactorSelectors {
            input: Locator::css("input#TOKEN_VALUE"),
            submit: Locator::css("#VERIFY_BTN"),
            channel: "email".into(),
            max_wait: Duration::from_secs(60),
        });
        let driver = MockDriver::new().with_pages(login_pages(&portal, "secret", Some("483920")));

        let mut codes = MockSecondFactorProvider::new();
        codes.expect_fetch_code().returning(|_, _, _| None);

        let err = authenticator(&portal, "secret")
            .with_code_provider(Arc::new(codes))
            .authenticate(&driver)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingSecondFactor { ref channel } if channel == "email"));
    }
}
