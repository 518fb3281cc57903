//! Request fingerprinting.
//!
//! Key format: SHA-256 hex of
//! `METHOD|scheme://host/path|k1=v1&k1=v2&k2=v1|SHA256(body_bytes)`
//! with query keys sorted ascending and values sorted ascending within a
//! key. The fingerprint is therefore invariant under query-parameter
//! reordering, and an empty body yields a different key than a present one.

use http::Method;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use url::Url;

fn hex(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Canonical sorted query string: `k1=v1&k1=v2&k2=v1`.
fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    let mut out = String::new();
    for (i, (key, value)) in pairs.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        out.push_str(key);
        out.push('=');
        out.push_str(value);
    }
    out
}

/// Computes the coalescing fingerprint for one request.
pub fn fingerprint(method: &Method, url: &Url, body: &[u8]) -> String {
    let body_digest = hex(&Sha256::digest(body));
    let host = url.host_str().unwrap_or("");
    let port = match url.port() {
        Some(port) => format!(":{port}"),
        None => String::new(),
    };

    let canonical = format!(
        "{}|{}://{}{}{}|{}|{}",
        method,
        url.scheme(),
        host,
        port,
        url.path(),
        canonical_query(url),
        body_digest,
    );
    hex(&Sha256::digest(canonical.as_bytes()))
}
