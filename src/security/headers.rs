//! Header manipulation for both hops of the auth subrequest.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers (fixed set plus whatever `Connection` lists)
//! - Add X-Forwarded-For, X-Forwarded-Proto to the subrequest
//!
//! # Design Decisions
//! - Sanitizing is copy-on-write: the input map is only cloned when at least
//!   one field has to go
//! - The same hop set is used for request → backend and backend → client

use std::borrow::Cow;
use std::net::IpAddr;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

pub const PROXY_CONNECTION: HeaderName = HeaderName::from_static("proxy-connection");
pub const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Headers that only make sense for a single transport hop.
pub static HOP_HEADERS: [HeaderName; 9] = [
    header::CONNECTION,
    PROXY_CONNECTION,
    KEEP_ALIVE,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Field names listed in the message's own `Connection` header(s).
///
/// Tokens are comma separated and trimmed; empty tokens and tokens that are
/// not valid header names are skipped.
pub fn connection_fields(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .filter_map(|field| HeaderName::from_bytes(field.as_bytes()).ok())
        .collect()
}

/// Remove every field in `hop` and `declared` from `headers`.
///
/// Returns the input untouched when none of those fields are present.
pub fn sanitize<'a>(
    headers: &'a HeaderMap,
    hop: &[HeaderName],
    declared: &[HeaderName],
) -> Cow<'a, HeaderMap> {
    let needs_removal = hop
        .iter()
        .chain(declared)
        .any(|name| headers.contains_key(name));
    if !needs_removal {
        return Cow::Borrowed(headers);
    }

    let mut sanitized = headers.clone();
    for name in hop.iter().chain(declared) {
        sanitized.remove(name);
    }
    Cow::Owned(sanitized)
}

/// [`sanitize`] with [`HOP_HEADERS`] and the map's own `Connection` list.
pub fn strip_hop_headers(headers: &HeaderMap) -> Cow<'_, HeaderMap> {
    let declared = connection_fields(headers);
    sanitize(headers, &HOP_HEADERS, &declared)
}

/// Append `client_ip` to the X-Forwarded-For chain.
///
/// Prior values (possibly spread over several header lines) are folded into
/// a single `", "`-separated value ending with the new address.
pub fn append_forwarded_for(headers: &mut HeaderMap, client_ip: IpAddr) {
    let ip = client_ip.to_string();
    let mut chain: Vec<u8> = Vec::new();
    for prior in headers.get_all(&X_FORWARDED_FOR) {
        chain.extend_from_slice(prior.as_bytes());
        chain.extend_from_slice(b", ");
    }
    chain.extend_from_slice(ip.as_bytes());

    match HeaderValue::from_bytes(&chain) {
        Ok(value) => {
            headers.insert(X_FORWARDED_FOR, value);
        }
        Err(_) => tracing::debug!(client_ip = %ip, "Unrepresentable X-Forwarded-For chain, left as is"),
    }
}

/// Set X-Forwarded-Proto from the inbound transport.
pub fn set_forwarded_proto(headers: &mut HeaderMap, secure: bool) {
    let proto = if secure { "https" } else { "http" };
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static(proto));
}
