//! Data types for portal extraction.

pub mod audit;
pub mod config;
pub mod dates;
pub mod entity;
pub mod person;
pub mod record;
pub mod snapshot;
pub mod text;
