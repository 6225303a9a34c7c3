//! Seams between the request pipeline and the backend that owns the objects.
//!
//! The pipeline only ever asks three things of a backend: does a collection
//! exist, are these credentials good, and (once everything checked out)
//! create this entry. Implementations must be safe to call concurrently.

use crate::models::{
    credentials::Credentials,
    entry::{CreateIntent, ResourceRef},
};
use async_trait::async_trait;
use thiserror::Error;

/// Infrastructure failure talking to the backend. Never a client error.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend call timed out after {0}s")]
    Timeout(u64),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type BackendResult<T> = Result<T, BackendError>;

#[async_trait]
pub trait CollectionRegistry: Send + Sync {
    /// Whether `name` is a known collection of `database`.
    async fn exists(&self, database: &str, name: &str) -> BackendResult<bool>;
}

#[async_trait]
pub trait CredentialValidator: Send + Sync {
    /// Check `credentials` against `database`. `Ok(false)` covers both an
    /// unknown user and a wrong password.
    async fn authenticate(&self, database: &str, credentials: &Credentials)
    -> BackendResult<bool>;
}

#[async_trait]
pub trait ResourceCreator: Send + Sync {
    async fn create(&self, intent: &CreateIntent) -> BackendResult<ResourceRef>;
}
