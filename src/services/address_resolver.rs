//! Turns a request path into an [`Address`]. Pure, never fails.

use crate::models::address::{Address, AddressKind};

/// Resolve `path` into a structured address.
///
/// Empty segments (doubled or trailing slashes) are skipped, so
/// `/erptest/res.partner/` and `/erptest/res.partner` resolve alike. Segment
/// content is not judged here.
pub fn resolve(path: &str) -> Address {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let mut segments = path.split('/').filter(|s| !s.is_empty());

    let database = segments.next().map(str::to_string);
    let Some(collection) = segments.next() else {
        return Address::root(database);
    };
    let resource_id = segments.next().map(str::to_string);
    let rest: Vec<&str> = segments.collect();
    let child = (!rest.is_empty()).then(|| rest.join("/"));

    let kind = match (&resource_id, &child) {
        (None, _) => AddressKind::Collection,
        (Some(_), None) => AddressKind::Resource,
        (Some(_), Some(_)) => AddressKind::Child,
    };

    Address {
        kind,
        database,
        collection: Some(collection.to_string()),
        resource_id,
        child,
    }
}
