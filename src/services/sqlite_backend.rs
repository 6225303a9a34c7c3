//! src/services/sqlite_backend.rs
//!
//! SqliteBackend: a self-contained backend that keeps users, collections and
//! created resources in SQLite. It implements every collaborator trait the
//! dispatcher needs, so the gateway runs end to end without a remote object
//! server.

use crate::{
    models::{
        collection::Collection,
        credentials::Credentials,
        entry::{CreateIntent, ResourceRef},
    },
    services::backend::{
        BackendError, BackendResult, CollectionRegistry, CredentialValidator, ResourceCreator,
    },
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

const INIT_SQL: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Clone)]
pub struct SqliteBackend {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl SqliteBackend {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Readiness check: `SELECT 1` against the pool.
    pub async fn ping(&self) -> BackendResult<()> {
        let v = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if v != 1 {
            return Err(BackendError::Unavailable(format!(
                "unexpected ping result: {}",
                v
            )));
        }
        Ok(())
    }

    /// Register `database/name`. Registering an existing collection is a no-op.
    pub async fn register_collection(&self, database: &str, name: &str) -> BackendResult<bool> {
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO collections (db_name, name, created_at) VALUES (?, ?, ?)",
        )
        .bind(database)
        .bind(name)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?
        .rows_affected();
        Ok(inserted > 0)
    }

    /// Create the user in `database`, replacing the password of an existing one.
    pub async fn add_user(&self, database: &str, credentials: &Credentials) -> BackendResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO users (db_name, username, password_md5) VALUES (?, ?, ?)",
        )
        .bind(database)
        .bind(&credentials.username)
        .bind(password_digest(&credentials.username, &credentials.password))
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    async fn fetch_collection(&self, database: &str, name: &str) -> BackendResult<Option<Collection>> {
        let collection = sqlx::query_as::<_, Collection>(
            "SELECT id, db_name, name, created_at FROM collections
             WHERE db_name = ? AND name = ?",
        )
        .bind(database)
        .bind(name)
        .fetch_optional(&*self.db)
        .await?;
        Ok(collection)
    }
}

/// Hex MD5 of `user:password`, the form stored in `users.password_md5`.
pub fn password_digest(username: &str, password: &str) -> String {
    format!("{:x}", md5::compute(format!("{}:{}", username, password)))
}

#[async_trait]
impl CollectionRegistry for SqliteBackend {
    async fn exists(&self, database: &str, name: &str) -> BackendResult<bool> {
        let found = self.fetch_collection(database, name).await?;
        if let Some(collection) = &found {
            debug!("collection {}/{} has id {}", database, name, collection.id);
        }
        Ok(found.is_some())
    }
}

#[async_trait]
impl CredentialValidator for SqliteBackend {
    async fn authenticate(
        &self,
        database: &str,
        credentials: &Credentials,
    ) -> BackendResult<bool> {
        let matches = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users
             WHERE db_name = ? AND username = ? AND password_md5 = ?",
        )
        .bind(database)
        .bind(&credentials.username)
        .bind(password_digest(&credentials.username, &credentials.password))
        .fetch_one(&*self.db)
        .await?;
        Ok(matches > 0)
    }
}

#[async_trait]
impl ResourceCreator for SqliteBackend {
    /// Insert the entry with a single statement; the collection is resolved
    /// inside the same `INSERT ... SELECT`.
    async fn create(&self, intent: &CreateIntent) -> BackendResult<ResourceRef> {
        let entry = &intent.entry;
        let fields = serde_json::to_string(&entry.fields)
            .map_err(|err| BackendError::Unavailable(format!("encoding fields: {}", err)))?;
        let payload = serde_json::to_vec(entry)
            .map_err(|err| BackendError::Unavailable(format!("encoding entry: {}", err)))?;
        let etag = format!("{:x}", md5::compute(payload));

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO resources (
                collection_id, title, summary, author, content_type, fields, etag, created_at
            )
            SELECT id, ?, ?, ?, ?, ?, ?, ?
            FROM collections WHERE db_name = ? AND name = ?
            RETURNING id
            "#,
        )
        .bind(&entry.title)
        .bind(&entry.summary)
        .bind(&entry.author)
        .bind(&entry.content_type)
        .bind(&fields)
        .bind(&etag)
        .bind(Utc::now())
        .bind(&intent.database)
        .bind(&intent.collection)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| {
            BackendError::Unavailable(format!(
                "collection {}/{} disappeared before create",
                intent.database, intent.collection
            ))
        })?;

        debug!(
            "created resource {} in {}/{}",
            id, intent.database, intent.collection
        );

        Ok(ResourceRef {
            id,
            location: format!("/{}/{}/{}", intent.database, intent.collection, id),
            etag,
        })
    }
}

/// Apply the embedded schema. Every statement is `IF NOT EXISTS`, so this
/// runs on each startup.
pub async fn run_migrations(db: &SqlitePool) -> BackendResult<()> {
    let mut applied = 0;
    for statement in INIT_SQL.split(';').filter(|s| !s.trim().is_empty()) {
        sqlx::query(statement).execute(db).await?;
        applied += 1;
    }
    debug!("schema ready, {} statements applied", applied);
    Ok(())
}
