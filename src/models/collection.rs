//! A named collection of resources inside a backend database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One backend object type exposed as an AtomPub collection.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Collection {
    /// Row id, referenced by `resources.collection_id`.
    pub id: i64,

    /// Database the collection lives in.
    pub db_name: String,

    /// Collection name as it appears in the path (e.g. `res.partner`).
    pub name: String,

    /// When this collection was registered.
    pub created_at: DateTime<Utc>,
}
