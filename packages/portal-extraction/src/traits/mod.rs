//! Core trait abstractions for the extraction library.
//!
//! These traits define the interfaces that applications implement
//! to provide browser automation, authentication, and snapshot storage.

pub mod auth;
pub mod driver;
pub mod store;
