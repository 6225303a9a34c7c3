//! Structured form of a request path.

/// Shape of an address, counted on the segments after the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Root,
    Collection,
    Resource,
    Child,
}

/// A request path split into its AtomPub parts.
///
/// The first path segment selects the backend database and belongs to the
/// base of the address; `kind` only counts what follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub kind: AddressKind,

    /// Backend database (e.g. `erptest`), if the path named one.
    pub database: Option<String>,

    /// Collection name (e.g. `res.partner`).
    pub collection: Option<String>,

    /// Resource id segment, kept verbatim. Never parsed as a number.
    pub resource_id: Option<String>,

    /// Everything past the resource id, joined with `/`.
    pub child: Option<String>,
}

impl Address {
    pub fn root(database: Option<String>) -> Self {
        Self {
            kind: AddressKind::Root,
            database,
            collection: None,
            resource_id: None,
            child: None,
        }
    }

    /// Database and collection, when the address reaches that far.
    pub fn collection_path(&self) -> Option<(&str, &str)> {
        match (self.database.as_deref(), self.collection.as_deref()) {
            (Some(db), Some(collection)) => Some((db, collection)),
            _ => None,
        }
    }
}
