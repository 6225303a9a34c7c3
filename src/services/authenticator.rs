//! Extraction of HTTP Basic credentials.

use crate::models::credentials::Credentials;
use axum::http::{HeaderMap, header};
use base64::{Engine as _, engine::general_purpose};

/// Pull Basic credentials out of `headers`.
///
/// Returns `None` when the header is missing and also when it is present but
/// unusable (other scheme, bad base64, non UTF-8, no `:`): both count as no
/// authentication attempt downstream.
pub fn extract(headers: &HeaderMap) -> Option<Credentials> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = general_purpose::STANDARD.decode(token.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some(Credentials::new(username, password))
}

/// Build the header value a client sends for `username:password`.
#[cfg(test)]
pub fn basic_header(username: &str, password: &str) -> String {
    format!(
        "Basic {}",
        general_purpose::STANDARD.encode(format!("{}:{}", username, password))
    )
}
