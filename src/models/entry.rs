//! Atom entries accepted for creation and the references returned for them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The parts of an `atom:entry` document the backend stores.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedEntry {
    /// Text of the mandatory `atom:title`.
    pub title: String,

    /// Text of `atom:summary`, if given.
    pub summary: Option<String>,

    /// `atom:author/atom:name`, if given.
    pub author: Option<String>,

    /// The `type` attribute of `atom:content`.
    pub content_type: Option<String>,

    /// Field values carried inside `atom:content`, keyed by element name.
    pub fields: BTreeMap<String, String>,
}

/// A fully validated request to create `entry` inside a collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateIntent {
    pub database: String,
    pub collection: String,
    pub entry: ParsedEntry,
}

/// Reference to a resource the backend has just created.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ResourceRef {
    pub id: i64,

    /// Address of the new resource, e.g. `/erptest/res.partner/42`.
    pub location: String,

    /// MD5 of the stored payload.
    pub etag: String,
}
