//! Core data models for the AtomPub gateway.
//!
//! Addresses and credentials are derived per request and never stored.
//! Collections map to database rows via `sqlx::FromRow`; entries serialize
//! as JSON via `serde` when handed to the backend.

pub mod address;
pub mod collection;
pub mod credentials;
pub mod entry;
