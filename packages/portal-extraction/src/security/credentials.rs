//! Portal login credentials.
//!
//! The password lives in a `secrecy` box and is only exposed to the
//! authenticator at the moment it is typed into the login form.

use secrecy::{ExposeSecret, SecretBox};
use std::fmt;

/// Login for one portal.
pub struct PortalCredentials {
    username: String,
    password: SecretBox<str>,
}

impl PortalCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretBox::new(password.into().into_boxed_str()),
        }
    }

    /// Read `<PREFIX>_USERNAME` and `<PREFIX>_PASSWORD` from the environment.
    ///
    /// Returns `None` when either is missing or empty.
    pub fn from_env(prefix: &str) -> Option<Self> {
        let prefix = env_prefix(prefix);
        let read = |suffix: &str| {
            std::env::var(format!("{}_{}", prefix, suffix))
                .ok()
                .filter(|v| !v.trim().is_empty())
        };
        Some(Self::new(read("USERNAME")?, read("PASSWORD")?))
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Only the authenticator should call this, right before typing.
    pub(crate) fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

/// Portal name as an environment variable prefix: `"Manuscript Flow"` becomes
/// `MANUSCRIPT_FLOW`.
pub fn env_prefix(portal: &str) -> String {
    portal
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_ascii_uppercase())
        .collect::<Vec<_>>()
        .join("_")
}

impl Clone for PortalCredentials {
    fn clone(&self) -> Self {
        Self::new(self.username.clone(), self.password())
    }
}

impl fmt::Debug for PortalCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}
