//! Credential handling for portal logins.

pub mod credentials;

pub use credentials::{env_prefix, PortalCredentials};
