//! Validation of POSTed Atom entry documents.
//!
//! Parsing is strict: any XML well-formedness error is reported as
//! [`BodyError::MalformedXml`], whose `Display` starts with `malformed XML`.
//! Clients match on that prefix. A well-formed document that is not a usable
//! `atom:entry` is reported as [`BodyError::SchemaInvalid`].

use crate::models::entry::ParsedEntry;
use std::collections::BTreeMap;
use thiserror::Error;
use xmltree::{Element, ParseError, XMLNode};

pub const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BodyError {
    #[error("malformed XML: {0}")]
    MalformedXml(String),
    #[error("invalid entry: {0}")]
    SchemaInvalid(String),
}

/// Parse `body` and extract the entry it describes.
pub fn validate(body: &[u8]) -> Result<ParsedEntry, BodyError> {
    let root = Element::parse(body).map_err(|err| BodyError::MalformedXml(describe(err)))?;

    if root.name != "entry" || !is_atom(&root) {
        return Err(invalid(format!(
            "root element must be atom:entry, found `{}`",
            root.name
        )));
    }

    let title = single(&root, "title")?
        .ok_or_else(|| invalid("missing atom:title"))
        .map(text_of)?;
    if title.is_empty() {
        return Err(invalid("atom:title must not be empty"));
    }

    let summary = single(&root, "summary")?.map(text_of);

    let author = match atom_children(&root, "author").next() {
        Some(author) => Some(
            single(author, "name")?
                .map(text_of)
                .ok_or_else(|| invalid("atom:author requires atom:name"))?,
        ),
        None => None,
    };

    let (content_type, fields) = match single(&root, "content")? {
        Some(content) => (content.attributes.get("type").cloned(), fields_of(content)?),
        None => (None, BTreeMap::new()),
    };

    Ok(ParsedEntry {
        title,
        summary,
        author,
        content_type,
        fields,
    })
}

fn describe(err: ParseError) -> String {
    match err {
        ParseError::MalformedXml(inner) => inner.to_string(),
        other => other.to_string(),
    }
}

fn invalid(msg: impl Into<String>) -> BodyError {
    BodyError::SchemaInvalid(msg.into())
}

fn is_atom(el: &Element) -> bool {
    match el.namespace.as_deref() {
        None => true,
        Some(ns) => ns == ATOM_NS,
    }
}

fn atom_children<'a>(parent: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> {
    child_elements(parent).filter(move |el| el.name == name && is_atom(el))
}

fn child_elements(parent: &Element) -> impl Iterator<Item = &Element> {
    parent.children.iter().filter_map(|node| match node {
        XMLNode::Element(el) => Some(el),
        _ => None,
    })
}

/// At most one `atom:{name}` child of `parent`.
fn single<'a>(parent: &'a Element, name: &'a str) -> Result<Option<&'a Element>, BodyError> {
    let mut matches = atom_children(parent, name);
    let first = matches.next();
    if matches.next().is_some() {
        return Err(invalid(format!(
            "atom:{} must not appear more than once in atom:{}",
            name, parent.name
        )));
    }
    Ok(first)
}

fn text_of(el: &Element) -> String {
    el.get_text()
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
}

/// Child elements of `atom:content` become named fields; bare text content is
/// kept under the `content` key.
fn fields_of(content: &Element) -> Result<BTreeMap<String, String>, BodyError> {
    let mut fields = BTreeMap::new();
    let mut saw_element = false;
    for el in child_elements(content) {
        saw_element = true;
        if fields.insert(el.name.clone(), text_of(el)).is_some() {
            return Err(invalid(format!("duplicate field `{}` in atom:content", el.name)));
        }
    }

    if !saw_element {
        let text = text_of(content);
        if !text.is_empty() {
            fields.insert("content".to_string(), text);
        }
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARTNER: &str = r#"<?xml version="1.0" encoding="utf-8"?>
        <entry xmlns="http://www.w3.org/2005/Atom">
          <title>Agrolait</title>
          <summary>A customer</summary>
          <author><name>admin</name></author>
          <content type="application/xml">
            <name>Agrolait</name>
            <city>Wavre</city>
          </content>
        </entry>"#;

    #[test]
    fn mismatched_tags_are_malformed() {
        let err = validate(b"<entry></content>").unwrap_err();
        assert!(matches!(err, BodyError::MalformedXml(_)));
        assert!(err.to_string().starts_with("malformed XML"));
    }

    #[test]
    fn empty_body_is_malformed() {
        let err = validate(b"").unwrap_err();
        assert!(err.to_string().starts_with("malformed XML"));
    }

    #[test]
    fn parses_full_entry() {
        let entry = validate(PARTNER.as_bytes()).unwrap();
        assert_eq!(entry.title, "Agrolait");
        assert_eq!(entry.summary.as_deref(), Some("A customer"));
        assert_eq!(entry.author.as_deref(), Some("admin"));
        assert_eq!(entry.content_type.as_deref(), Some("application/xml"));
        assert_eq!(entry.fields.get("city").map(String::as_str), Some("Wavre"));
        assert_eq!(entry.fields.len(), 2);
    }

    #[test]
    fn namespace_may_be_omitted() {
        let entry = validate(b"<entry><title>x</title><content>plain</content></entry>").unwrap();
        assert_eq!(entry.title, "x");
        assert_eq!(entry.fields.get("content").map(String::as_str), Some("plain"));
    }

    #[test]
    fn shape_violations_are_schema_errors() {
        let cases: &[&[u8]] = &[
            b"<feed xmlns=\"http://www.w3.org/2005/Atom\"/>",
            b"<entry xmlns=\"urn:other\"><title>x</title></entry>",
            b"<entry/>",
            b"<entry><title>  </title></entry>",
            b"<entry><title>a</title><title>b</title></entry>",
            b"<entry><title>a</title><author/></entry>",
            b"<entry><title>a</title><content><n>1</n><n>2</n></content></entry>",
        ];
        for body in cases {
            let err = validate(body).unwrap_err();
            assert!(
                err.to_string().starts_with("invalid entry"),
                "{:?} -> {}",
                String::from_utf8_lossy(body),
                err
            );
        }
    }
}
